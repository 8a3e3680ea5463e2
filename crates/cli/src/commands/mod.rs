//! Command implementations

pub mod status;
pub mod trigger;
