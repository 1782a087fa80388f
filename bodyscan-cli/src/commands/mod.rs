//! CLI command implementations.

pub mod config;
pub mod monitor;
pub mod profile;
pub mod simulate;
