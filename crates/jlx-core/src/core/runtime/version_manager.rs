use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::effects::{InstallRequest, InstalledRuntime, VersionManager};
use super::julia_build::{default_install_root, install_julia, julia_binary};

const INSTALL_PREFIX: &str = "julia-";

/// Runtimes kept in `julia-<key>` directories under one install root.
pub(crate) struct SystemVersionManager {
    root: Option<PathBuf>,
}

impl SystemVersionManager {
    /// Uses `JILL_INSTALL_DIR` or the platform default at call time.
    pub(crate) fn from_env() -> Self {
        Self { root: None }
    }

    #[cfg(test)]
    pub(crate) fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => default_install_root(),
        }
    }
}

/// Executable inside one install directory, if present.
fn executable_in(dir: &Path) -> Option<PathBuf> {
    [
        julia_binary(dir),
        julia_binary(&dir.join("Contents").join("Resources").join("julia")),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

impl VersionManager for SystemVersionManager {
    fn installed(&self) -> Result<Vec<InstalledRuntime>> {
        let root = self.root()?;
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "no version-manager install root");
            return Ok(Vec::new());
        }
        let mut runtimes = Vec::new();
        for entry in
            fs::read_dir(&root).with_context(|| format!("reading {}", root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(INSTALL_PREFIX))
                .map(|key| key.trim_end_matches(".app").to_string())
            else {
                continue;
            };
            match executable_in(&path) {
                Some(executable) => runtimes.push(InstalledRuntime { key, executable }),
                None => tracing::warn!(dir = %path.display(), "install directory has no julia binary"),
            }
        }
        runtimes.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(runtimes)
    }

    fn install(&self, request: &InstallRequest) -> Result<PathBuf> {
        install_julia(&self.root()?, request)
    }
}
