// src/config/mod.rs
// Configuration: environment variables plus an optional TOML file

pub mod env;
pub mod file;

pub use env::{ApiKeys, ConfigValidation, EnvConfig};
pub use file::HealthyConfig;
