//! Project configuration supplied by the host package.

mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::env::{EnvVars, DEFAULT_ENV_PREFIX};
use crate::version::{ConstraintError, VersionConstraint};

pub use file::{declared_deps, discover_project_root, load_project_config, CONFIG_FILENAME};

pub const DEFAULT_VERSION_SPEC: &str = "^1";
pub const DEFAULT_IMAGE_DIR: &str = "sys_image";
pub const DEFAULT_BUILD_SCRIPT: &str = "compile_julia_project.jl";
pub const DEFAULT_PREFERRED_VERSIONS: [&str; 4] = ["1.10", "1.9", "1.8", "latest"];
pub const PROJECT_FILES: [&str; 2] = ["JuliaProject.toml", "Project.toml"];
pub const MANIFEST_FILES: [&str; 2] = ["JuliaManifest.toml", "Manifest.toml"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid project name `{0}`")]
    InvalidName(String),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error("registry `{name}` has an invalid url `{url}`: {reason}")]
    InvalidRegistryUrl {
        name: String,
        url: String,
        reason: String,
    },
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("{path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Dependency-store isolation requested by the host package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreMode {
    Shared,
    Private,
    #[default]
    Ask,
}

impl FromStr for StoreMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "shared" => Ok(Self::Shared),
            "private" => Ok(Self::Private),
            "ask" => Ok(Self::Ask),
            other => Err(ConfigError::InvalidValue {
                key: "depot".into(),
                value: other.into(),
            }),
        }
    }
}

/// Julia-side bridge package used to call back into the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    #[default]
    PyCall,
    PythonCall,
}

impl BridgeKind {
    #[must_use]
    pub fn package_name(self) -> &'static str {
        match self {
            Self::PyCall => "PyCall",
            Self::PythonCall => "PythonCall",
        }
    }

    /// PyCall is built against one libpython, so a shared depot can hold a
    /// build that is wrong for this host.
    #[must_use]
    pub fn can_conflict(self) -> bool {
        matches!(self, Self::PyCall)
    }
}

impl FromStr for BridgeKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pycall" => Ok(Self::PyCall),
            "pythoncall" => Ok(Self::PythonCall),
            other => Err(ConfigError::InvalidValue {
                key: "bridge".into(),
                value: other.into(),
            }),
        }
    }
}

pub type HookFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;

/// Work run once right before the runtime is reported ready.
#[derive(Clone)]
pub enum PostInitHook {
    Callback(Arc<HookFn>),
    Command(Vec<String>),
}

impl fmt::Debug for PostInitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("PostInitHook::Callback"),
            Self::Command(argv) => f.debug_tuple("PostInitHook::Command").field(argv).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProjectConfig {
    name: String,
    package_root: PathBuf,
    registries: IndexMap<String, String>,
    image_dir: String,
    image_file_base: String,
    build_script: String,
    store_mode: StoreMode,
    env: EnvVars,
    bridge: BridgeKind,
    constraint: VersionConstraint,
    preferred_versions: Vec<String>,
    runtime_path: Option<PathBuf>,
    data_root: Option<PathBuf>,
    host_library: Option<PathBuf>,
    host_executable: Option<PathBuf>,
    use_image: bool,
    compile: Option<bool>,
    install_runtime: Option<bool>,
    pre_instantiate: Option<String>,
    post_init: Option<PostInitHook>,
    enabled: bool,
}

impl ProjectConfig {
    #[must_use]
    pub fn builder(name: impl Into<String>, package_root: impl Into<PathBuf>) -> ProjectConfigBuilder {
        ProjectConfigBuilder::new(name, package_root)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Project files present in the package root, `JuliaProject.toml` first.
    #[must_use]
    pub fn project_files(&self) -> Vec<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|file| self.package_root.join(file))
            .filter(|path| path.is_file())
            .collect()
    }

    #[must_use]
    pub fn registries(&self) -> &IndexMap<String, String> {
        &self.registries
    }

    #[must_use]
    pub fn image_dir_name(&self) -> &str {
        &self.image_dir
    }

    #[must_use]
    pub fn image_file_base(&self) -> &str {
        &self.image_file_base
    }

    #[must_use]
    pub fn build_script(&self) -> &str {
        &self.build_script
    }

    #[must_use]
    pub fn store_mode(&self) -> StoreMode {
        self.store_mode
    }

    #[must_use]
    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    #[must_use]
    pub fn bridge(&self) -> BridgeKind {
        self.bridge
    }

    #[must_use]
    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    #[must_use]
    pub fn preferred_versions(&self) -> &[String] {
        &self.preferred_versions
    }

    #[must_use]
    pub fn runtime_path(&self) -> Option<&Path> {
        self.runtime_path.as_deref()
    }

    #[must_use]
    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    #[must_use]
    pub fn host_library(&self) -> Option<&Path> {
        self.host_library.as_deref()
    }

    #[must_use]
    pub fn host_executable(&self) -> Option<&Path> {
        self.host_executable.as_deref()
    }

    #[must_use]
    pub fn use_image(&self) -> bool {
        self.use_image
    }

    #[must_use]
    pub fn compile_answer(&self) -> Option<bool> {
        self.compile
    }

    #[must_use]
    pub fn install_answer(&self) -> Option<bool> {
        self.install_runtime
    }

    #[must_use]
    pub fn pre_instantiate(&self) -> Option<&str> {
        self.pre_instantiate.as_deref()
    }

    #[must_use]
    pub fn post_init(&self) -> Option<&PostInitHook> {
        self.post_init.as_ref()
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[derive(Clone, Debug)]
pub struct ProjectConfigBuilder {
    name: String,
    package_root: PathBuf,
    registries: IndexMap<String, String>,
    image_dir: Option<String>,
    image_file_base: Option<String>,
    build_script: Option<String>,
    store_mode: StoreMode,
    env_prefix: Option<String>,
    bridge: BridgeKind,
    version_spec: Option<String>,
    strict: bool,
    preferred_versions: Option<Vec<String>>,
    runtime_path: Option<PathBuf>,
    data_root: Option<PathBuf>,
    host_library: Option<PathBuf>,
    host_executable: Option<PathBuf>,
    use_image: bool,
    compile: Option<bool>,
    install_runtime: Option<bool>,
    pre_instantiate: Option<String>,
    post_init: Option<PostInitHook>,
}

impl ProjectConfigBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, package_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            package_root: package_root.into(),
            registries: IndexMap::new(),
            image_dir: None,
            image_file_base: None,
            build_script: None,
            store_mode: StoreMode::Ask,
            env_prefix: None,
            bridge: BridgeKind::default(),
            version_spec: None,
            strict: true,
            preferred_versions: None,
            runtime_path: None,
            data_root: None,
            host_library: None,
            host_executable: None,
            use_image: true,
            compile: None,
            install_runtime: None,
            pre_instantiate: None,
            post_init: None,
        }
    }

    #[must_use]
    pub fn registry(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.registries.insert(name.into(), url.into());
        self
    }

    #[must_use]
    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn image_file_base(mut self, base: impl Into<String>) -> Self {
        self.image_file_base = Some(base.into());
        self
    }

    #[must_use]
    pub fn build_script(mut self, script: impl Into<String>) -> Self {
        self.build_script = Some(script.into());
        self
    }

    #[must_use]
    pub fn store_mode(mut self, mode: StoreMode) -> Self {
        self.store_mode = mode;
        self
    }

    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn bridge(mut self, bridge: BridgeKind) -> Self {
        self.bridge = bridge;
        self
    }

    #[must_use]
    pub fn version_spec(mut self, spec: impl Into<String>) -> Self {
        self.version_spec = Some(spec.into());
        self
    }

    #[must_use]
    pub fn strict_version(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn preferred_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_versions = Some(versions.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn runtime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_root = Some(path.into());
        self
    }

    #[must_use]
    pub fn host_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_library = Some(path.into());
        self
    }

    #[must_use]
    pub fn host_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn use_image(mut self, enabled: bool) -> Self {
        self.use_image = enabled;
        self
    }

    #[must_use]
    pub fn compile(mut self, answer: Option<bool>) -> Self {
        self.compile = answer;
        self
    }

    #[must_use]
    pub fn install_runtime(mut self, answer: Option<bool>) -> Self {
        self.install_runtime = answer;
        self
    }

    #[must_use]
    pub fn pre_instantiate(mut self, code: impl Into<String>) -> Self {
        self.pre_instantiate = Some(code.into());
        self
    }

    #[must_use]
    pub fn post_init_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_init = Some(PostInitHook::Callback(Arc::new(hook)));
        self
    }

    #[must_use]
    pub fn post_init_command(mut self, argv: Vec<String>) -> Self {
        self.post_init = (!argv.is_empty()).then_some(PostInitHook::Command(argv));
        self
    }

    /// Validates the collected settings.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an unusable name, a malformed version
    /// specification, or a registry URL that does not parse.
    pub fn build(self) -> Result<ProjectConfig, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ConfigError::InvalidName(self.name));
        }
        for (registry, url) in &self.registries {
            url::Url::parse(url).map_err(|err| ConfigError::InvalidRegistryUrl {
                name: registry.clone(),
                url: url.clone(),
                reason: err.to_string(),
            })?;
        }
        let constraint = VersionConstraint::parse(
            self.version_spec.as_deref().unwrap_or(DEFAULT_VERSION_SPEC),
            self.strict,
        )?;
        let image_file_base = self
            .image_file_base
            .unwrap_or_else(|| format!("sys_{name}"));
        Ok(ProjectConfig {
            registries: self.registries,
            image_dir: self
                .image_dir
                .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string()),
            image_file_base,
            build_script: self
                .build_script
                .unwrap_or_else(|| DEFAULT_BUILD_SCRIPT.to_string()),
            store_mode: self.store_mode,
            env: EnvVars::new(
                self.env_prefix
                    .unwrap_or_else(|| DEFAULT_ENV_PREFIX.to_string()),
            ),
            bridge: self.bridge,
            constraint,
            preferred_versions: self.preferred_versions.unwrap_or_else(|| {
                DEFAULT_PREFERRED_VERSIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            runtime_path: self.runtime_path,
            data_root: self.data_root,
            host_library: self.host_library,
            host_executable: self.host_executable,
            use_image: self.use_image,
            compile: self.compile,
            install_runtime: self.install_runtime,
            pre_instantiate: self.pre_instantiate,
            post_init: self.post_init,
            package_root: self.package_root,
            name,
            enabled: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_project_name() {
        let config = ProjectConfig::builder("mymod", "/pkg").build().expect("config");
        assert_eq!(config.image_file_base(), "sys_mymod");
        assert_eq!(config.image_dir_name(), "sys_image");
        assert_eq!(config.env().prefix(), "JULIA_PROJECT_");
        assert_eq!(config.constraint().spec(), "^1");
        assert!(config.constraint().strict());
        assert_eq!(config.store_mode(), StoreMode::Ask);
        assert_eq!(config.preferred_versions().last().map(String::as_str), Some("latest"));
        assert!(config.enabled());
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(
            ProjectConfig::builder("", "/pkg").build(),
            Err(ConfigError::InvalidName(_))
        ));
        assert!(matches!(
            ProjectConfig::builder("a/b", "/pkg").build(),
            Err(ConfigError::InvalidName(_))
        ));
        assert!(matches!(
            ProjectConfig::builder("mymod", "/pkg").version_spec("^x").build(),
            Err(ConfigError::Constraint(_))
        ));
        assert!(matches!(
            ProjectConfig::builder("mymod", "/pkg")
                .registry("Local", "not a url")
                .build(),
            Err(ConfigError::InvalidRegistryUrl { name, .. }) if name == "Local"
        ));
    }

    #[test]
    fn registries_keep_declaration_order() {
        let config = ProjectConfig::builder("mymod", "/pkg")
            .registry("Zeta", "https://example.com/zeta")
            .registry("Alpha", "https://example.com/alpha")
            .build()
            .expect("config");
        let names: Vec<_> = config.registries().keys().cloned().collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn parses_modes_and_bridges() {
        assert_eq!("private".parse::<StoreMode>().unwrap(), StoreMode::Private);
        assert!("maybe".parse::<StoreMode>().is_err());
        assert_eq!("PythonCall".parse::<BridgeKind>().unwrap(), BridgeKind::PythonCall);
        assert_eq!(BridgeKind::PyCall.package_name(), "PyCall");
    }
}
