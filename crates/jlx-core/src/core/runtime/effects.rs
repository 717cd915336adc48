use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use jlx_domain::{BridgeKind, VersionConstraint};
use serde::Serialize;

use super::guest::{JuliaPkg, SystemGuest};
use super::process::RunOutput;
use super::version_manager::SystemVersionManager;
use crate::bootstrap::bridge::{PyCallBridge, PythonCallBridge};

/// Everything a guest subprocess needs to see the right project and depot.
///
/// The environment is passed to each child; the host process environment is
/// never modified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuestSession {
    pub executable: PathBuf,
    pub project: PathBuf,
    pub depot: Option<PathBuf>,
}

impl GuestSession {
    #[must_use]
    pub fn new(executable: PathBuf, project: PathBuf, depot: Option<PathBuf>) -> Self {
        Self {
            executable,
            project,
            depot,
        }
    }

    /// Same runtime and depot, another project directory.
    #[must_use]
    pub fn with_project(&self, project: &Path) -> Self {
        Self {
            project: project.to_path_buf(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn envs(&self) -> Vec<(String, String)> {
        let mut envs = vec![(
            "JULIA_PROJECT".to_string(),
            self.project.display().to_string(),
        )];
        if let Some(depot) = &self.depot {
            envs.push(("JULIA_DEPOT_PATH".to_string(), depot.display().to_string()));
        }
        envs
    }
}

/// Host-side details the bridge must be built against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostBinding {
    pub library: Option<PathBuf>,
    pub executable: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BridgeStatus {
    Ok,
    NeedsBuild { reason: BuildReason },
    Unsatisfiable { detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildReason {
    NotInstalled,
    NotBuilt,
    IncompatibleHost { built_against: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstalledRuntime {
    /// Version-manager key such as `1.9` or `latest`.
    pub key: String,
    pub executable: PathBuf,
}

#[derive(Clone, Debug)]
pub struct InstallRequest {
    pub preferred: Vec<String>,
    pub constraint: VersionConstraint,
}

pub trait GuestRuntime: Send + Sync {
    /// Reports the version printed by `julia --version`.
    fn probe_version(&self, executable: &Path) -> Result<String>;
    fn eval(&self, session: &GuestSession, code: &str) -> Result<RunOutput>;
    fn run_script(&self, session: &GuestSession, script: &Path, cwd: &Path) -> Result<RunOutput>;
}

pub trait PackageManager: Send + Sync {
    fn add_registry(&self, session: &GuestSession, name: &str, url: Option<&str>)
        -> Result<RunOutput>;
    fn instantiate(&self, session: &GuestSession, pre: Option<&str>) -> Result<RunOutput>;
    fn resolve(&self, session: &GuestSession) -> Result<RunOutput>;
    fn update(&self, session: &GuestSession) -> Result<RunOutput>;
    fn add(&self, session: &GuestSession, package: &str) -> Result<RunOutput>;
    fn remove(&self, session: &GuestSession, package: &str) -> Result<RunOutput>;
    fn build(
        &self,
        session: &GuestSession,
        package: &str,
        envs: &[(String, String)],
    ) -> Result<RunOutput>;
}

pub trait VersionManager: Send + Sync {
    fn installed(&self) -> Result<Vec<InstalledRuntime>>;
    /// Installs a runtime and returns its executable.
    fn install(&self, request: &InstallRequest) -> Result<PathBuf>;
}

pub trait Bridge: Send + Sync {
    fn check(&self, session: &GuestSession, host: &HostBinding) -> Result<BridgeStatus>;
    fn build(
        &self,
        session: &GuestSession,
        host: &HostBinding,
        reason: &BuildReason,
    ) -> Result<RunOutput>;
}

pub trait Effects: Send + Sync {
    fn guest(&self) -> &dyn GuestRuntime;
    fn packages(&self) -> &dyn PackageManager;
    fn versions(&self) -> &dyn VersionManager;
    fn bridge(&self, kind: BridgeKind) -> &dyn Bridge;
}

pub struct SystemEffects {
    guest: Arc<SystemGuest>,
    packages: Arc<JuliaPkg>,
    versions: Arc<SystemVersionManager>,
    pycall: Arc<PyCallBridge>,
    pythoncall: Arc<PythonCallBridge>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        let guest = Arc::new(SystemGuest);
        let packages = Arc::new(JuliaPkg::new(guest.clone()));
        Self {
            pycall: Arc::new(PyCallBridge::new(guest.clone(), packages.clone())),
            pythoncall: Arc::new(PythonCallBridge::new(guest.clone(), packages.clone())),
            versions: Arc::new(SystemVersionManager::from_env()),
            guest,
            packages,
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn guest(&self) -> &dyn GuestRuntime {
        self.guest.as_ref()
    }

    fn packages(&self) -> &dyn PackageManager {
        self.packages.as_ref()
    }

    fn versions(&self) -> &dyn VersionManager {
        self.versions.as_ref()
    }

    fn bridge(&self, kind: BridgeKind) -> &dyn Bridge {
        match kind {
            BridgeKind::PyCall => self.pycall.as_ref(),
            BridgeKind::PythonCall => self.pythoncall.as_ref(),
        }
    }
}

pub type SharedEffects = Arc<dyn Effects>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_envs_only_name_private_depots() {
        let shared = GuestSession::new("/bin/julia".into(), "/work".into(), None);
        assert_eq!(
            shared.envs(),
            vec![("JULIA_PROJECT".to_string(), "/work".to_string())]
        );
        let private = GuestSession::new("/bin/julia".into(), "/work".into(), Some("/work/depot".into()))
            .with_project(Path::new("/work/sys_image"));
        assert_eq!(private.project, PathBuf::from("/work/sys_image"));
        assert_eq!(
            private.envs()[1],
            ("JULIA_DEPOT_PATH".to_string(), "/work/depot".to_string())
        );
    }
}
