//! CLI command implementations.

pub mod budget;
pub mod common;
pub mod config;
pub mod profile;
pub mod simulate;
