//! In-memory effects for bootstrap tests; every call is recorded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use jlx_domain::{canonical_image_name, BridgeKind};

use crate::runtime::effects::{
    Bridge, BridgeStatus, BuildReason, Effects, GuestRuntime, GuestSession, HostBinding,
    InstallRequest, InstalledRuntime, PackageManager, VersionManager,
};
use crate::runtime::process::RunOutput;

/// Creates an executable stub named `name` in `dir`.
pub(crate) fn fake_executable(dir: &Path, name: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    probes: HashMap<PathBuf, String>,
    installed: Vec<InstalledRuntime>,
    pending_install: Option<(String, PathBuf, String)>,
    bridge: VecDeque<BridgeStatus>,
    failing: HashSet<&'static str>,
    no_manifest: bool,
}

pub(crate) struct FakeEffects {
    shared_depot: PathBuf,
    state: Mutex<State>,
}

fn ok() -> RunOutput {
    RunOutput::default()
}

fn failed(stderr: &str) -> RunOutput {
    RunOutput {
        code: 1,
        stdout: String::new(),
        stderr: format!("{stderr}\n"),
    }
}

impl FakeEffects {
    /// Package operations without a private depot write to `<temp>/shared-depot`.
    pub(crate) fn new(temp: &Path) -> Self {
        Self {
            shared_depot: temp.join("shared-depot"),
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn shared_depot(&self) -> &Path {
        &self.shared_depot
    }

    pub(crate) fn probe(&self, executable: &Path, version: &str) {
        self.state
            .lock()
            .unwrap()
            .probes
            .insert(executable.to_path_buf(), version.to_string());
    }

    pub(crate) fn set_installed(&self, runtimes: &[(&str, &Path)]) {
        self.state.lock().unwrap().installed = runtimes
            .iter()
            .map(|(key, executable)| InstalledRuntime {
                key: (*key).to_string(),
                executable: executable.to_path_buf(),
            })
            .collect();
    }

    /// The next install creates `executable` reporting `version`.
    pub(crate) fn on_install(&self, key: &str, executable: &Path, version: &str) {
        self.state.lock().unwrap().pending_install = Some((
            key.to_string(),
            executable.to_path_buf(),
            version.to_string(),
        ));
    }

    pub(crate) fn queue_bridge(&self, status: BridgeStatus) {
        self.state.lock().unwrap().bridge.push_back(status);
    }

    /// Makes every later call of `op` fail.
    pub(crate) fn fail(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub(crate) fn recover(&self, op: &'static str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    /// Resolution still succeeds but leaves no manifest behind.
    pub(crate) fn drop_manifests(&self) {
        self.state.lock().unwrap().no_manifest = true;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn invocations(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub(crate) fn count(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.as_str() == op)
            .count()
    }

    fn record(&self, op: &'static str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op.to_string());
        !state.failing.contains(op)
    }

    /// Records `<op> <detail>`; failures still match on `op`.
    fn record_with(&self, op: &'static str, detail: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{op} {detail}"));
        !state.failing.contains(op)
    }

    fn depot(&self, session: &GuestSession) -> PathBuf {
        session
            .depot
            .clone()
            .unwrap_or_else(|| self.shared_depot.clone())
    }

    fn populate(&self, session: &GuestSession) {
        let depot = self.depot(session);
        for marker in ["registries/General", "packages", "compiled"] {
            fs::create_dir_all(depot.join(marker)).unwrap();
        }
        if !self.state.lock().unwrap().no_manifest {
            fs::write(session.project.join("Manifest.toml"), "# resolved\n").unwrap();
        }
    }
}

impl GuestRuntime for FakeEffects {
    fn probe_version(&self, executable: &Path) -> Result<String> {
        self.record("probe");
        self.state
            .lock()
            .unwrap()
            .probes
            .get(executable)
            .cloned()
            .ok_or_else(|| anyhow!("{} is not a julia", executable.display()))
    }

    fn eval(&self, _session: &GuestSession, _code: &str) -> Result<RunOutput> {
        self.record("eval");
        Ok(ok())
    }

    fn run_script(&self, _session: &GuestSession, script: &Path, cwd: &Path) -> Result<RunOutput> {
        if !self.record("script") {
            fs::write(cwd.join(canonical_image_name()), "partial").unwrap();
            return Ok(failed("ERROR: build script failed"));
        }
        assert!(script.is_file(), "missing build script {}", script.display());
        fs::write(cwd.join(canonical_image_name()), "image").unwrap();
        Ok(ok())
    }
}

impl PackageManager for FakeEffects {
    fn add_registry(&self, session: &GuestSession, name: &str, _url: Option<&str>) -> Result<RunOutput> {
        if !self.record("add-registry") {
            return Ok(failed("ERROR: registry unreachable"));
        }
        fs::create_dir_all(self.depot(session).join("registries").join(name))?;
        Ok(ok())
    }

    fn instantiate(&self, session: &GuestSession, _pre: Option<&str>) -> Result<RunOutput> {
        if !self.record("instantiate") {
            return Ok(failed("ERROR: Unsatisfiable requirements"));
        }
        self.populate(session);
        Ok(ok())
    }

    fn resolve(&self, session: &GuestSession) -> Result<RunOutput> {
        if !self.record("resolve") {
            return Ok(failed("ERROR: resolve failed"));
        }
        self.populate(session);
        Ok(ok())
    }

    fn update(&self, session: &GuestSession) -> Result<RunOutput> {
        if !self.record("update") {
            return Ok(failed("ERROR: update failed"));
        }
        self.populate(session);
        Ok(ok())
    }

    fn add(&self, _session: &GuestSession, package: &str) -> Result<RunOutput> {
        if !self.record_with("add", package) {
            return Ok(failed("ERROR: package not found"));
        }
        Ok(ok())
    }

    fn remove(&self, _session: &GuestSession, package: &str) -> Result<RunOutput> {
        self.record_with("remove", package);
        Ok(ok())
    }

    fn build(&self, _session: &GuestSession, _package: &str, _envs: &[(String, String)]) -> Result<RunOutput> {
        if !self.record("build") {
            return Ok(failed("ERROR: build failed"));
        }
        Ok(ok())
    }
}

impl VersionManager for FakeEffects {
    fn installed(&self) -> Result<Vec<InstalledRuntime>> {
        Ok(self.state.lock().unwrap().installed.clone())
    }

    fn install(&self, _request: &InstallRequest) -> Result<PathBuf> {
        self.record("install");
        let Some((key, executable, version)) = self.state.lock().unwrap().pending_install.take()
        else {
            bail!("no julia release available");
        };
        fake_executable(executable.parent().unwrap(), "julia");
        let mut state = self.state.lock().unwrap();
        state.probes.insert(executable.clone(), version);
        state.installed.push(InstalledRuntime {
            key,
            executable: executable.clone(),
        });
        Ok(executable)
    }
}

impl Bridge for FakeEffects {
    fn check(&self, _session: &GuestSession, _host: &HostBinding) -> Result<BridgeStatus> {
        self.record("bridge-check");
        Ok(self
            .state
            .lock()
            .unwrap()
            .bridge
            .pop_front()
            .unwrap_or(BridgeStatus::Ok))
    }

    fn build(&self, _session: &GuestSession, _host: &HostBinding, _reason: &BuildReason) -> Result<RunOutput> {
        if !self.record("bridge-build") {
            return Ok(failed("ERROR: libpython not found"));
        }
        Ok(ok())
    }
}

impl Effects for FakeEffects {
    fn guest(&self) -> &dyn GuestRuntime {
        self
    }

    fn packages(&self) -> &dyn PackageManager {
        self
    }

    fn versions(&self) -> &dyn VersionManager {
        self
    }

    fn bridge(&self, _kind: BridgeKind) -> &dyn Bridge {
        self
    }
}
