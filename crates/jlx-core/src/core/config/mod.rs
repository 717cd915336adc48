//! Settings, environment snapshots, and per-command context assembly.

pub mod context;
pub mod settings;

pub use settings::*;
