//! On-disk layout of working projects, depots and resolution caches.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dirs_next::home_dir;

use crate::config::{ConfigError, ProjectConfig, MANIFEST_FILES, PROJECT_FILES};
use crate::version::parse_runtime_version;

pub const DATA_DIR_NAME: &str = "julia_project";
pub const PRIVATE_DEPOT_DIR: &str = "depot";
pub const DEPOT_PATH_ENV: &str = "JULIA_DEPOT_PATH";
const ENV_PREFIX_VARS: [&str; 3] = ["VIRTUAL_ENV", "CONDA_PREFIX", "MAMBA_PREFIX"];
const DEPOT_MARKERS: [&str; 3] = ["registries", "packages", "compiled"];

/// The default depot: first entry of `JULIA_DEPOT_PATH`, else `~/.julia`.
pub fn shared_depot(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(raw) = lookup(DEPOT_PATH_ENV) {
        let separator = if cfg!(windows) { ';' } else { ':' };
        if let Some(first) = raw.split(separator).find(|entry| !entry.trim().is_empty()) {
            return Some(PathBuf::from(first.trim()));
        }
    }
    home_dir().map(|home| home.join(".julia"))
}

/// Directory holding every working project of every host package.
///
/// # Errors
/// Returns [`ConfigError::InvalidValue`] when more than one environment
/// prefix is active, or when no home directory can be found.
pub fn resolve_data_root(
    config: &ProjectConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, ConfigError> {
    if let Some(root) = config.data_root() {
        return Ok(root.to_path_buf());
    }
    let active: Vec<(&str, String)> = ENV_PREFIX_VARS
        .iter()
        .filter_map(|key| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (*key, value))
        })
        .collect();
    match active.as_slice() {
        [] => shared_depot(&lookup)
            .map(|depot| depot.join(DATA_DIR_NAME))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: DEPOT_PATH_ENV.into(),
                value: "<unset>".into(),
            }),
        [(_, prefix)] => Ok(PathBuf::from(prefix).join(DATA_DIR_NAME)),
        many => Err(ConfigError::InvalidValue {
            key: many
                .iter()
                .map(|(key, _)| *key)
                .collect::<Vec<_>>()
                .join(", "),
            value: "more than one environment is active".into(),
        }),
    }
}

/// Per-runtime-version copy of the host package's project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingProject {
    root: PathBuf,
}

impl WorkingProject {
    #[must_use]
    pub fn new(data_root: &Path, name: &str, runtime_version: &str) -> Self {
        Self {
            root: data_root.join(format!("{name}-{runtime_version}")),
        }
    }

    /// A working project at an already known directory.
    #[must_use]
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn private_depot(&self) -> PathBuf {
        self.root.join(PRIVATE_DEPOT_DIR)
    }

    #[must_use]
    pub fn image_dir(&self, config: &ProjectConfig) -> PathBuf {
        self.root.join(config.image_dir_name())
    }

    #[must_use]
    pub fn manifest_files(&self) -> Vec<PathBuf> {
        MANIFEST_FILES.iter().map(|file| self.root.join(file)).collect()
    }

    /// Every working project of `name` under `data_root`, any runtime version.
    #[must_use]
    pub fn list_all(data_root: &Path, name: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(data_root) else {
            return Vec::new();
        };
        let prefix = format!("{name}-");
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|file| file.strip_prefix(&prefix))
                    .is_some_and(|version| parse_runtime_version(version).is_some())
            })
            .map(|entry| entry.path())
            .collect();
        dirs.sort();
        dirs
    }
}

/// Copies `src` to `dest` when `dest` is missing or older. Directories are
/// copied file by file.
///
/// # Errors
/// Propagates I/O failures.
pub fn update_copy(src: &Path, dest: &Path) -> io::Result<usize> {
    if src.is_dir() {
        fs::create_dir_all(dest)?;
        let mut copied = 0;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copied += update_copy(&entry.path(), &dest.join(entry.file_name()))?;
        }
        return Ok(copied);
    }
    let stale = match (modified(dest), modified(src)) {
        (None, _) => true,
        (Some(dest_time), Some(src_time)) => dest_time < src_time,
        (Some(_), None) => false,
    };
    if !stale {
        return Ok(0);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    Ok(1)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// A registry is present when its directory or packed `<name>.toml` exists.
#[must_use]
pub fn registry_present(depot: &Path, name: &str) -> bool {
    let registries = depot.join("registries");
    registries.join(name).is_dir() || registries.join(format!("{name}.toml")).is_file()
}

/// The existing manifest of a project directory, `JuliaManifest.toml` first.
#[must_use]
pub fn existing_manifest(project_dir: &Path) -> Option<PathBuf> {
    MANIFEST_FILES
        .iter()
        .map(|file| project_dir.join(file))
        .find(|path| path.is_file())
}

#[must_use]
pub fn existing_project_file(project_dir: &Path) -> Option<PathBuf> {
    PROJECT_FILES
        .iter()
        .map(|file| project_dir.join(file))
        .find(|path| path.is_file())
}

/// Whether `project_dir` must be resolved and instantiated against `depot`.
#[must_use]
pub fn needs_resolve(project_dir: &Path, depot: &Path) -> bool {
    if DEPOT_MARKERS
        .iter()
        .any(|marker| !depot.join(marker).is_dir())
    {
        return true;
    }
    let Some(manifest) = existing_manifest(project_dir) else {
        return true;
    };
    let Some(project) = existing_project_file(project_dir) else {
        return false;
    };
    match (modified(&project), modified(&manifest)) {
        (Some(project_time), Some(manifest_time)) => project_time > manifest_time,
        _ => true,
    }
}
