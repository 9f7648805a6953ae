// src/service.rs
// IntakeService: the operations a presentation layer calls

use crate::background::ReportQueue;
use crate::db::{IntakeStore, MessageRecord, Report, ReportStatus, ReportSummary, Session};
use crate::error::{IntakeError, Result};
use crate::intake::{Orchestrator, ReportGenerator, SessionLocks, TurnOutcome};
use crate::llm::{CompletionGateway, Role};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const GREETING: &str = "您好！我是您的 AI 健康管家。";
pub const GREETING_INSTRUCTIONS: &str =
    "为了提供精准的评估，我们需要为您进行定制化的对话采集。请描述您的年龄、性别，以及最近最困扰您的问题。";

/// A fresh session plus the greetings already stored in it
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: i64,
    pub greeting_messages: Vec<String>,
}

/// A session with its full message log
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    pub session: Session,
    pub messages: Vec<MessageRecord>,
}

pub struct IntakeService {
    store: Arc<dyn IntakeStore>,
    orchestrator: Orchestrator,
    generator: Arc<ReportGenerator>,
    locks: Arc<SessionLocks>,
    queue: Option<ReportQueue>,
}

impl IntakeService {
    pub fn new(store: Arc<dyn IntakeStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        let orchestrator = Orchestrator::new(store.clone(), gateway.clone());
        let generator = Arc::new(ReportGenerator::new(store.clone(), gateway));
        Self::from_parts(store, orchestrator, generator)
    }

    /// Assemble from a customized orchestrator (labels, phrases, prompt)
    pub fn from_parts(
        store: Arc<dyn IntakeStore>,
        orchestrator: Orchestrator,
        generator: Arc<ReportGenerator>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            generator,
            locks: Arc::new(SessionLocks::new()),
            queue: None,
        }
    }

    /// Send handed-off sessions to a report worker
    pub fn with_queue(mut self, queue: ReportQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(&self) -> Arc<dyn IntakeStore> {
        self.store.clone()
    }

    pub fn generator(&self) -> Arc<ReportGenerator> {
        self.generator.clone()
    }

    /// Shared with the report worker so turns and report runs exclude each other
    pub fn locks(&self) -> Arc<SessionLocks> {
        self.locks.clone()
    }

    /// Load a session, hiding sessions that belong to someone else
    pub async fn authorize(&self, session_id: i64, user_id: i64) -> Result<Session> {
        match self.store.get_session(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(IntakeError::SessionNotFound(session_id)),
        }
    }

    #[instrument(skip(self))]
    pub async fn start_session(&self, user_id: i64) -> Result<StartedSession> {
        let session = self.store.create_session(user_id).await?;
        let greeting_messages = vec![GREETING.to_string(), GREETING_INSTRUCTIONS.to_string()];
        for text in &greeting_messages {
            self.store
                .append_message(session.id, Role::Assistant, text)
                .await?;
        }
        Ok(StartedSession {
            session_id: session.id,
            greeting_messages,
        })
    }

    /// One turn, serialized against every other turn and report run of the session
    pub async fn handle_turn(&self, session_id: i64, user_text: &str) -> Result<TurnOutcome> {
        let outcome = {
            let _guard = self.locks.acquire(session_id).await;
            self.orchestrator.handle_turn(session_id, user_text).await
        };
        self.locks.release(session_id).await;
        let outcome = outcome?;

        if outcome.is_handoff()
            && let Some(ref queue) = self.queue
            && let Err(e) = queue.enqueue(session_id)
        {
            // The pending report is picked up again by the startup recovery scan
            warn!(session_id, error = %e, "Could not queue report generation");
        }

        Ok(outcome)
    }

    pub async fn get_report(&self, session_id: i64) -> Result<Report> {
        self.store
            .get_report_by_session(session_id)
            .await?
            .ok_or(IntakeError::ReportNotFound(session_id))
    }

    /// Idempotent report completion. A failed report is reset and retried.
    #[instrument(skip(self))]
    pub async fn trigger_report_generation(&self, session_id: i64) -> Result<Report> {
        let result = {
            let _guard = self.locks.acquire(session_id).await;
            self.run_report(session_id).await
        };
        self.locks.release(session_id).await;
        result
    }

    async fn run_report(&self, session_id: i64) -> Result<Report> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(IntakeError::SessionNotFound(session_id))?;

        let Some(report) = self.store.get_report_by_session(session_id).await? else {
            if session.meta.track.is_none() {
                return Err(IntakeError::InvalidStateTransition(format!(
                    "session {} has no locked track",
                    session_id
                )));
            }
            return Err(IntakeError::ReportNotFound(session_id));
        };

        if report.status() == ReportStatus::Error
            && self.store.reset_report_for_retry(session_id).await?
        {
            info!(session_id, "Retrying failed report");
        }

        self.generator.generate(session_id).await
    }

    /// Latest active session of a user with its messages
    pub async fn active_session(&self, user_id: i64) -> Result<Option<SessionHistory>> {
        let Some(session) = self.store.latest_active_session(user_id).await? else {
            return Ok(None);
        };
        let messages = self.store.list_messages(session.id).await?;
        Ok(Some(SessionHistory { session, messages }))
    }

    pub async fn session_history(&self, session_id: i64, user_id: i64) -> Result<SessionHistory> {
        let session = self.authorize(session_id, user_id).await?;
        let messages = self.store.list_messages(session_id).await?;
        Ok(SessionHistory { session, messages })
    }

    pub async fn list_reports(&self, user_id: i64) -> Result<Vec<ReportSummary>> {
        self.store.list_reports_for_user(user_id).await
    }

    /// Delete a session with its messages and report
    pub async fn delete_session(&self, session_id: i64) -> Result<()> {
        let deleted = {
            let _guard = self.locks.acquire(session_id).await;
            self.store.delete_session(session_id).await
        };
        self.locks.release(session_id).await;
        if !deleted? {
            return Err(IntakeError::SessionNotFound(session_id));
        }
        Ok(())
    }
}
