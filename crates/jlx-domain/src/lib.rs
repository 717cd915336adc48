#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod candidate;
pub mod config;
pub mod env;
pub mod image;
pub mod layout;
pub mod state;
pub mod version;

pub use candidate::{CandidateSource, RuntimeCandidate};
pub use config::{
    declared_deps, discover_project_root, load_project_config, BridgeKind, ConfigError, PostInitHook, ProjectConfig,
    ProjectConfigBuilder, StoreMode, CONFIG_FILENAME, MANIFEST_FILES, PROJECT_FILES,
};
pub use env::{parse_yes_no, EnvVars, YesNoError, DEFAULT_ENV_PREFIX};
pub use image::{
    canonical_image_name, format_image_name, parse_image_name, shlib_suffix, CompiledImage,
    ParsedImageName, CANONICAL_IMAGE_STEM,
};
pub use layout::{
    existing_manifest, existing_project_file, needs_resolve, registry_present, resolve_data_root,
    shared_depot, update_copy, WorkingProject,
};
pub use state::LifecycleState;
pub use version::{parse_runtime_version, ConstraintError, VersionConstraint};
