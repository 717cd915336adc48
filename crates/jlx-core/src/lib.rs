#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

mod core;

pub(crate) use crate::core::{bootstrap, config, runtime, tooling};

pub(crate) const JLX_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::bootstrap::lifecycle::{CleanReport, InitStatus, Lifecycle, ReadyReport};
pub use crate::core::bootstrap::questions::{NonInteractive, Prompt, Question, QuestionKey};
pub use crate::core::bootstrap::store::DependencyStore;
pub use crate::core::config::context::{CommandContext, CommandInfo};
pub use crate::core::config::{EnvSnapshot, GlobalOptions};
pub use crate::core::project::{
    project_clean, project_clean_all, project_compile, project_init, project_update,
    runtime_locate, BootstrapRequest,
};
pub use crate::core::runtime::effects::{
    Bridge, BridgeStatus, BuildReason, Effects, GuestRuntime, GuestSession, HostBinding,
    InstallRequest, InstalledRuntime, PackageManager, SharedEffects, SystemEffects,
    VersionManager,
};
pub use crate::core::runtime::locator::locate;
pub use crate::core::runtime::process::{run_command, RunOutput};
pub use crate::core::tooling::errors::{BootstrapError, BootstrapResult};
pub use crate::core::tooling::logging::{default_log_path, init_logging, LogOptions};
pub use crate::core::tooling::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};
