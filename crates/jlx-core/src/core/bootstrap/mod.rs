//! The bootstrap sequence: depot choice, bridge validation, package
//! installation, system images and the lifecycle that drives them.

pub(crate) mod bridge;
pub(crate) mod image;
pub(crate) mod installer;
pub mod lifecycle;
pub mod questions;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
