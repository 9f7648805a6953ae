// src/db/store.rs
// Durable store interface consumed by the intake engine

use crate::db::types::{MessageRecord, Report, ReportSummary, Session};
use crate::error::Result;
use crate::intake::state::{SessionMeta, SessionStatus};
use crate::llm::Role;
use async_trait::async_trait;

/// Outcome of the atomic report handoff
#[derive(Debug, Clone)]
pub struct Handoff {
    pub report: Report,
    pub acknowledgement: MessageRecord,
}

/// Sessions, messages and reports.
///
/// Every method is a single atomic unit; `begin_report_handoff` and `finalize_report`
/// cover several rows in one transaction.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    async fn get_session(&self, session_id: i64) -> Result<Option<Session>>;

    async fn create_session(&self, user_id: i64) -> Result<Session>;

    /// Persist the session metadata (status is only changed via transitions)
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Compare-and-set status change; `InvalidStateTransition` if `from` no longer holds
    async fn transition_status(
        &self,
        session_id: i64,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<()>;

    async fn append_message(&self, session_id: i64, role: Role, content: &str)
    -> Result<MessageRecord>;

    /// Messages in conversational order
    async fn list_messages(&self, session_id: i64) -> Result<Vec<MessageRecord>>;

    async fn get_report_by_session(&self, session_id: i64) -> Result<Option<Report>>;

    /// Insert the `generating` placeholder, or return the existing report
    async fn create_report_placeholder(&self, session_id: i64) -> Result<Report>;

    /// Write score, risk and content. Returns false when the stored report is
    /// already completed and was left untouched.
    async fn save_report(&self, report: &Report) -> Result<bool>;

    /// Atomically: save `meta`, move the session active -> generating_report,
    /// create the placeholder report and append the acknowledgement message.
    async fn begin_report_handoff(
        &self,
        session_id: i64,
        meta: &SessionMeta,
        acknowledgement: &str,
    ) -> Result<Handoff>;

    /// Atomically write a completed report and mark its session completed.
    /// Returns false when the report had already been completed.
    async fn finalize_report(&self, report: &Report) -> Result<bool>;

    /// Move an `error` report back to `generating`. Returns whether it changed.
    async fn reset_report_for_retry(&self, session_id: i64) -> Result<bool>;

    /// Sessions whose report is still `generating`
    async fn list_pending_report_sessions(&self) -> Result<Vec<i64>>;

    /// Most recent active session of a user
    async fn latest_active_session(&self, user_id: i64) -> Result<Option<Session>>;

    /// Reports of a user, newest first
    async fn list_reports_for_user(&self, user_id: i64) -> Result<Vec<ReportSummary>>;

    /// Remove a session with its messages and report. Returns whether it existed.
    async fn delete_session(&self, session_id: i64) -> Result<bool>;
}
