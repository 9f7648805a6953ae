// src/intake/mod.rs
// Conversational intake engine: directives, session state, orchestration, reports

pub mod format;
pub mod locks;
pub mod orchestrator;
pub mod prompts;
pub mod report;
pub mod signals;
pub mod state;

pub use format::{CompletionPhrases, format_reply};
pub use locks::SessionLocks;
pub use orchestrator::{
    HANDOFF_ACKNOWLEDGEMENT, Orchestrator, ReportRef, TurnAction, TurnOutcome,
};
pub use report::{ReportGenerator, RiskLevel, extract_fields, extract_fields_lenient};
pub use signals::{ControlSignals, DirectiveParser, SignalLabels, SignalParser};
pub use state::{SessionMeta, SessionStatus};
