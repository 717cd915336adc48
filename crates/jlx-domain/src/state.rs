use std::fmt;

use serde::Serialize;

/// Progress of the bootstrap sequence for one project in this process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Disabled,
    Locating,
    ConstraintFailed,
    Provisioning,
    ValidatingBridge,
    Installing,
    LoadingImage,
    Ready,
    Failed,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Disabled => "disabled",
            Self::Locating => "locating",
            Self::ConstraintFailed => "constraint-failed",
            Self::Provisioning => "provisioning",
            Self::ValidatingBridge => "validating-bridge",
            Self::Installing => "installing",
            Self::LoadingImage => "loading-image",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// States a new `ensure_init` may start from.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(
            self,
            Self::Uninitialized | Self::Failed | Self::ConstraintFailed
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
