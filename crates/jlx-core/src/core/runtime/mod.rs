//! Guest subprocesses, runtime discovery, and runtime installation.

pub mod effects;
pub(crate) mod guest;
pub(crate) mod julia_build;
pub mod locator;
pub(crate) mod net;
pub mod process;
pub(crate) mod version_manager;
