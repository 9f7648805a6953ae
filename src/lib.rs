// src/lib.rs
// Healthy - conversational health intake with adaptive question tracks and scored reports

#![warn(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod intake;
pub mod llm;
pub mod service;

pub use error::{IntakeError, Result};
pub use service::IntakeService;
