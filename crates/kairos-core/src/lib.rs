//! Dependency-light domain values shared by the kairos crates.

pub mod capacity;
pub mod config;
pub mod constants;
pub mod error;
pub mod money;
pub mod schedule;
pub mod timezone;
