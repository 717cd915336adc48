pub(crate) mod bootstrap;
pub(crate) mod config;
pub(crate) mod project;
pub(crate) mod runtime;
pub(crate) mod tooling;
