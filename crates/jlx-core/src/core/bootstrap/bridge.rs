//! Self-check and build of the julia package that calls back into the host.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::runtime::effects::{
    Bridge, BridgeStatus, BuildReason, GuestRuntime, GuestSession, HostBinding, PackageManager,
};
use crate::runtime::process::RunOutput;

const MARKER: &str = "jlx-bridge:";

const PYCALL_CHECK: &str = r#"pkg = Base.find_package("PyCall")
if pkg === nothing
    println("jlx-bridge: not-installed")
else
    deps = joinpath(dirname(dirname(pkg)), "deps", "deps.jl")
    if isfile(deps)
        m = Module()
        Base.include(m, deps)
        println("jlx-bridge: built ", m.libpython)
    else
        println("jlx-bridge: not-built")
    end
end"#;

const PYTHONCALL_CHECK: &str = r#"if Base.find_package("PythonCall") === nothing
    println("jlx-bridge: not-installed")
else
    println("jlx-bridge: built")
end"#;

/// The report line printed by a check script, without the marker.
fn report(output: &RunOutput) -> Option<&str> {
    output
        .stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(MARKER))
        .map(str::trim)
}

fn run_check(guest: &dyn GuestRuntime, session: &GuestSession, code: &str) -> Result<Result<String, BridgeStatus>> {
    let output = guest.eval(session, code)?;
    if !output.success() {
        return Ok(Err(BridgeStatus::Unsatisfiable {
            detail: output.failure_summary(),
        }));
    }
    match report(&output) {
        Some(line) => Ok(Ok(line.to_string())),
        None => Ok(Err(BridgeStatus::Unsatisfiable {
            detail: "bridge check printed no report".to_string(),
        })),
    }
}

fn same_library(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

pub(crate) struct PyCallBridge {
    guest: Arc<dyn GuestRuntime>,
    packages: Arc<dyn PackageManager>,
}

impl PyCallBridge {
    pub(crate) fn new(guest: Arc<dyn GuestRuntime>, packages: Arc<dyn PackageManager>) -> Self {
        Self { guest, packages }
    }
}

impl Bridge for PyCallBridge {
    fn check(&self, session: &GuestSession, host: &HostBinding) -> Result<BridgeStatus> {
        let line = match run_check(self.guest.as_ref(), session, PYCALL_CHECK)? {
            Ok(line) => line,
            Err(status) => return Ok(status),
        };
        let status = match line.split_once(' ').map_or((line.as_str(), ""), |(head, rest)| (head, rest.trim())) {
            ("not-installed", _) => BridgeStatus::NeedsBuild {
                reason: BuildReason::NotInstalled,
            },
            ("not-built", _) => BridgeStatus::NeedsBuild {
                reason: BuildReason::NotBuilt,
            },
            ("built", built_against) => match &host.library {
                Some(library) if !same_library(library, Path::new(built_against)) => {
                    BridgeStatus::NeedsBuild {
                        reason: BuildReason::IncompatibleHost {
                            built_against: built_against.to_string(),
                        },
                    }
                }
                _ => BridgeStatus::Ok,
            },
            _ => BridgeStatus::Unsatisfiable {
                detail: format!("unexpected bridge report `{line}`"),
            },
        };
        tracing::debug!(status = ?status, "PyCall check");
        Ok(status)
    }

    fn build(
        &self,
        session: &GuestSession,
        host: &HostBinding,
        reason: &BuildReason,
    ) -> Result<RunOutput> {
        if matches!(reason, BuildReason::NotInstalled) {
            let added = self.packages.add(session, "PyCall")?;
            if !added.success() {
                return Ok(added);
            }
        }
        let envs: Vec<(String, String)> = host
            .executable
            .iter()
            .map(|python| ("PYTHON".to_string(), python.display().to_string()))
            .collect();
        self.packages.build(session, "PyCall", &envs)
    }
}

pub(crate) struct PythonCallBridge {
    guest: Arc<dyn GuestRuntime>,
    packages: Arc<dyn PackageManager>,
}

impl PythonCallBridge {
    pub(crate) fn new(guest: Arc<dyn GuestRuntime>, packages: Arc<dyn PackageManager>) -> Self {
        Self { guest, packages }
    }
}

impl Bridge for PythonCallBridge {
    fn check(&self, session: &GuestSession, _host: &HostBinding) -> Result<BridgeStatus> {
        let line = match run_check(self.guest.as_ref(), session, PYTHONCALL_CHECK)? {
            Ok(line) => line,
            Err(status) => return Ok(status),
        };
        Ok(match line.as_str() {
            "built" => BridgeStatus::Ok,
            "not-installed" => BridgeStatus::NeedsBuild {
                reason: BuildReason::NotInstalled,
            },
            other => BridgeStatus::Unsatisfiable {
                detail: format!("unexpected bridge report `{other}`"),
            },
        })
    }

    fn build(
        &self,
        session: &GuestSession,
        _host: &HostBinding,
        _reason: &BuildReason,
    ) -> Result<RunOutput> {
        self.packages.add(session, "PythonCall")
    }
}
