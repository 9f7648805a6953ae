// src/db/mod.rs
// Durable store: sessions, append-only messages and one report per session

pub mod pool;
mod sqlite;
mod store;
pub mod types;

pub use sqlite::SqliteStore;
pub use store::{Handoff, IntakeStore};
pub use types::{
    MessageRecord, PLACEHOLDER_RISK_LEVEL, Report, ReportContent, ReportStatus, ReportSummary,
    Session,
};
