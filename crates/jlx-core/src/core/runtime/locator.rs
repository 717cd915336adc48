//! Finds a julia executable that satisfies the project's constraint.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jlx_domain::{CandidateSource, ProjectConfig, RuntimeCandidate};

use super::effects::{Effects, InstallRequest, InstalledRuntime};
use crate::config::EnvSnapshot;
use crate::tooling::errors::{BootstrapError, BootstrapResult};

const JULIA_BIN: &str = if cfg!(windows) { "julia.exe" } else { "julia" };

/// Walks the sources in priority order and returns the first satisfying
/// runtime. `confirm_install` is consulted only when every other source is
/// exhausted.
///
/// # Errors
/// An explicit override that is unusable is a configuration error. When no
/// source yields a satisfying runtime the error is
/// [`BootstrapError::ConstraintUnsatisfied`] if candidates were seen and
/// [`BootstrapError::RuntimeNotFound`] otherwise.
pub fn locate(
    config: &ProjectConfig,
    env: &EnvSnapshot,
    effects: &dyn Effects,
    confirm_install: impl FnOnce() -> BootstrapResult<bool>,
) -> BootstrapResult<RuntimeCandidate> {
    let mut search = Search::new(config, effects);

    if let Some((origin, path)) = explicit_override(config, env) {
        return search.explicit(&origin, &path);
    }

    search.searched.push(CandidateSource::Bundled.to_string());
    if let Some(found) = search.bundled() {
        return Ok(found);
    }

    search
        .searched
        .push(CandidateSource::VersionManager.to_string());
    if let Some(found) = search.version_manager(CandidateSource::VersionManager) {
        return Ok(found);
    }

    search.searched.push(CandidateSource::Path.to_string());
    if let Some(found) = search.search_path(env) {
        return Ok(found);
    }

    if confirm_install()? {
        let request = InstallRequest {
            preferred: config.preferred_versions().to_vec(),
            constraint: config.constraint().clone(),
        };
        tracing::info!(constraint = %config.constraint(), "installing julia");
        let executable = effects
            .versions()
            .install(&request)
            .map_err(BootstrapError::Other)?;
        tracing::info!(path = %executable.display(), "julia installed");
        search.forget(&executable);
        if let Some(found) = search.version_manager(CandidateSource::FreshlyInstalled) {
            return Ok(found);
        }
    } else {
        tracing::info!("julia installation declined");
        search.searched.push("install declined".to_string());
    }

    Err(search.exhausted())
}

fn explicit_override(config: &ProjectConfig, env: &EnvSnapshot) -> Option<(String, PathBuf)> {
    if let Some(path) = config.runtime_path() {
        return Some(("configured julia path".to_string(), path.to_path_buf()));
    }
    let name = config.env().julia_path();
    env.non_empty(&name)
        .map(|value| (name.clone(), PathBuf::from(value)))
}

struct Search<'a> {
    config: &'a ProjectConfig,
    effects: &'a dyn Effects,
    searched: Vec<String>,
    found: Vec<String>,
    seen: HashSet<PathBuf>,
}

impl<'a> Search<'a> {
    fn new(config: &'a ProjectConfig, effects: &'a dyn Effects) -> Self {
        Self {
            config,
            effects,
            searched: Vec::new(),
            found: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn explicit(&mut self, origin: &str, path: &Path) -> BootstrapResult<RuntimeCandidate> {
        if !path.is_file() {
            return Err(BootstrapError::configuration(format!(
                "{origin} points at {}, which does not exist",
                path.display()
            )));
        }
        let version = self
            .effects
            .guest()
            .probe_version(path)
            .map_err(|err| {
                BootstrapError::configuration(format!(
                    "{origin} points at {}, which could not be run: {err:#}",
                    path.display()
                ))
            })?;
        if !self.config.constraint().satisfies(&version) {
            return Err(BootstrapError::configuration(format!(
                "{origin} points at julia {version}, which does not satisfy `{}`",
                self.config.constraint().spec()
            )));
        }
        tracing::info!(path = %path.display(), %version, source = "explicit-override", "julia selected");
        Ok(RuntimeCandidate::new(
            path.to_path_buf(),
            version,
            CandidateSource::ExplicitOverride,
        ))
    }

    fn bundled(&mut self) -> Option<RuntimeCandidate> {
        let dir = self.config.package_root().join("julia");
        let executable = dir.join("bin").join(JULIA_BIN);
        if executable.is_file() {
            return self.consider(&executable, CandidateSource::Bundled);
        }
        if dir.exists() {
            tracing::warn!(dir = %dir.display(), "bundled julia directory has no bin/julia");
        }
        None
    }

    fn version_manager(&mut self, source: CandidateSource) -> Option<RuntimeCandidate> {
        let installed = match self.effects.versions().installed() {
            Ok(installed) => installed,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "listing installed julia versions failed");
                return None;
            }
        };
        order_installed(installed, self.config.preferred_versions())
            .into_iter()
            .find_map(|runtime| self.consider(&runtime.executable, source))
    }

    fn search_path(&mut self, env: &EnvSnapshot) -> Option<RuntimeCandidate> {
        let paths = env.var("PATH")?;
        let hits = match which::which_in_all(JULIA_BIN, Some(paths), self.config.package_root()) {
            Ok(hits) => hits.collect::<Vec<_>>(),
            Err(err) => {
                tracing::debug!(error = %err, "julia not on PATH");
                return None;
            }
        };
        for executable in hits {
            if let Some(found) = self.consider(&executable, CandidateSource::Path) {
                return Some(found);
            }
        }
        None
    }

    /// An install may replace a runtime already probed at the same path.
    fn forget(&mut self, executable: &Path) {
        self.seen.remove(&seen_key(executable));
    }

    /// Probes one executable; rejections are logged and recorded.
    fn consider(&mut self, executable: &Path, source: CandidateSource) -> Option<RuntimeCandidate> {
        if !self.seen.insert(seen_key(executable)) {
            return None;
        }
        let version = match self.effects.guest().probe_version(executable) {
            Ok(version) => version,
            Err(err) => {
                tracing::info!(
                    path = %executable.display(),
                    %source,
                    error = %format!("{err:#}"),
                    "julia candidate skipped: could not probe version"
                );
                return None;
            }
        };
        if !self.config.constraint().satisfies(&version) {
            tracing::info!(
                path = %executable.display(),
                %version,
                %source,
                constraint = %self.config.constraint(),
                "julia candidate skipped: constraint not satisfied"
            );
            let rejected = format!("{version} at {}", executable.display());
            if !self.found.contains(&rejected) {
                self.found.push(rejected);
            }
            return None;
        }
        tracing::info!(path = %executable.display(), %version, %source, "julia selected");
        Some(RuntimeCandidate::new(
            executable.to_path_buf(),
            version,
            source,
        ))
    }

    fn exhausted(self) -> BootstrapError {
        if self.found.is_empty() {
            BootstrapError::RuntimeNotFound {
                searched: self.searched,
            }
        } else {
            BootstrapError::ConstraintUnsatisfied {
                constraint: self.config.constraint().spec().to_string(),
                found: self.found,
            }
        }
    }
}

fn seen_key(executable: &Path) -> PathBuf {
    executable
        .canonicalize()
        .unwrap_or_else(|_| executable.to_path_buf())
}

/// Preferred keys in their listed order, then the rest newest first with
/// `latest` ahead of numbered releases.
fn order_installed(installed: Vec<InstalledRuntime>, preferred: &[String]) -> Vec<InstalledRuntime> {
    let mut remaining = installed;
    let mut ordered = Vec::with_capacity(remaining.len());
    for key in preferred {
        if let Some(index) = remaining.iter().position(|runtime| &runtime.key == key) {
            ordered.push(remaining.remove(index));
        }
    }
    remaining.sort_by(|left, right| key_rank(&right.key).cmp(&key_rank(&left.key)));
    ordered.extend(remaining);
    ordered
}

fn key_rank(key: &str) -> (bool, u64, u64) {
    if key == "latest" {
        return (true, 0, 0);
    }
    let mut parts = key.split('.').map(|part| part.parse::<u64>().unwrap_or(0));
    (
        false,
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}
