//! CLI-facing outcome shaping, error taxonomy, and the decision log.

pub mod errors;
pub mod logging;
pub mod outcome;
