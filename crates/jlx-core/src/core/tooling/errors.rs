use jlx_domain::{ConfigError, YesNoError};

/// Failures surfaced by the bootstrap sequence.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no julia executable was found (searched: {})", searched.join(", "))]
    RuntimeNotFound { searched: Vec<String> },
    #[error("no julia satisfies `{constraint}` (found {})", found.join(", "))]
    ConstraintUnsatisfied {
        constraint: String,
        found: Vec<String>,
    },
    #[error("{package} could not be built: {reason}")]
    BridgeBuildFailed { package: String, reason: String },
    #[error("package resolution failed for {context}: {reason}")]
    PackageResolutionFailed { context: String, reason: String },
    #[error("system image compilation failed: {reason}")]
    CompilationFailed { reason: String },
    #[error("post-init hook failed: {0:#}")]
    HookFailed(anyhow::Error),
    #[error("julia initialization is disabled")]
    Disabled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

impl BootstrapError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable machine-readable code for JSON output.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::RuntimeNotFound { .. } => "runtime_not_found",
            Self::ConstraintUnsatisfied { .. } => "constraint_unsatisfied",
            Self::BridgeBuildFailed { .. } => "bridge_build_failed",
            Self::PackageResolutionFailed { .. } => "package_resolution_failed",
            Self::CompilationFailed { .. } => "compilation_failed",
            Self::HookFailed(_) => "hook_failed",
            Self::Disabled => "disabled",
            Self::Other(_) => "internal",
        }
    }

    /// Errors the user can fix by changing input or environment.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::RuntimeNotFound { .. }
                | Self::ConstraintUnsatisfied { .. }
                | Self::Disabled
        )
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound { .. } | Self::ConstraintUnsatisfied { .. } => Some(
                "install julia, point <PREFIX>JULIA_PATH at it, or rerun with --install",
            ),
            Self::PackageResolutionFailed { .. } => {
                Some("check network access to the registries and rerun the same command")
            }
            Self::BridgeBuildFailed { .. } => {
                Some("rerun with --depot private to build the bridge in an isolated depot")
            }
            Self::CompilationFailed { .. } => {
                Some("the previous system image, if any, is still in place")
            }
            Self::Disabled => Some("re-enable initialization before running this command"),
            _ => None,
        }
    }
}

impl From<ConfigError> for BootstrapError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<YesNoError> for BootstrapError {
    fn from(err: YesNoError) -> Self {
        Self::Configuration(err.to_string())
    }
}
