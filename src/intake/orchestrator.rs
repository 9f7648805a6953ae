// src/intake/orchestrator.rs
// Conversation orchestrator: one user message in, one reply plus an action tag out

use crate::db::{IntakeStore, MessageRecord, Report, ReportStatus, Session};
use crate::error::{IntakeError, Result};
use crate::intake::format::{CompletionPhrases, format_reply};
use crate::intake::prompts::INTAKE_SYSTEM_PROMPT;
use crate::intake::signals::{ControlSignals, DirectiveParser, SignalParser};
use crate::intake::state::{self, SessionMeta, SessionStatus};
use crate::llm::{CompletionGateway, EffortLevel, Message, Role};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Fixed reply when the quota is met; no model call is made for it
pub const HANDOFF_ACKNOWLEDGEMENT: &str = "收到！您的答案我们已记录。正在为您生成健康报告...";

pub const REPORT_PENDING_REPLY: &str = "您的健康报告正在生成中，请稍候查看。";
pub const REPORT_READY_REPLY: &str = "您的健康报告已生成，请前往报告页面查看。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnAction {
    /// Keep talking
    Chat,
    /// Intake is over; the caller should show (or wait for) the report
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRef {
    pub id: i64,
    pub status: ReportStatus,
}

impl From<&Report> for ReportRef {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            status: report.status(),
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    /// Every assistant message produced by the turn, in order
    pub replies: Vec<String>,
    pub action: TurnAction,
    pub report_ref: Option<ReportRef>,
}

impl TurnOutcome {
    fn chat(reply: String) -> Self {
        Self {
            replies: vec![reply.clone()],
            reply,
            action: TurnAction::Chat,
            report_ref: None,
        }
    }

    fn report(reply: String, report: Option<&Report>) -> Self {
        Self {
            replies: vec![reply.clone()],
            reply,
            action: TurnAction::Report,
            report_ref: report.map(ReportRef::from),
        }
    }

    /// True when this turn moved the session into report generation
    pub fn is_handoff(&self) -> bool {
        self.action == TurnAction::Report
            && self
                .report_ref
                .as_ref()
                .is_some_and(|r| r.status == ReportStatus::Generating)
    }
}

/// Apply parsed directives to the metadata
pub fn apply_signals(meta: &SessionMeta, signals: &ControlSignals) -> SessionMeta {
    let mut next = meta.clone();
    if let Some(ref track) = signals.track {
        next = state::lock_track(&next, track);
    }
    if let Some(count) = signals.question_count {
        next = state::set_question_quota(&next, count);
    }
    if signals.current_question.is_some() {
        next = state::mark_question_sent(&next);
    }
    if let Some(ref info) = signals.user_info {
        next = state::record_user_info(&next, info);
    }
    next
}

/// Count the incoming message as an answer if a question is pending
pub fn count_answer(meta: &SessionMeta) -> SessionMeta {
    if meta.awaiting_answer() {
        state::consume_question_sent(&state::increment_answered(meta))
    } else {
        meta.clone()
    }
}

fn to_model_messages(records: &[MessageRecord]) -> Vec<Message> {
    records
        .iter()
        .map(|m| Message::new(m.role, m.content.clone()))
        .collect()
}

/// Drives the intake state machine. Holds no session state of its own.
///
/// Callers must serialize turns per session (see `SessionLocks`).
pub struct Orchestrator {
    store: Arc<dyn IntakeStore>,
    gateway: Arc<dyn CompletionGateway>,
    parser: Arc<dyn SignalParser>,
    completion_phrases: CompletionPhrases,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn IntakeStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            store,
            gateway,
            parser: Arc::new(DirectiveParser::default()),
            completion_phrases: CompletionPhrases::default(),
            system_prompt: INTAKE_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SignalParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_completion_phrases(mut self, phrases: CompletionPhrases) -> Self {
        self.completion_phrases = phrases;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[instrument(skip(self, user_text), fields(text_len = user_text.len()))]
    pub async fn handle_turn(&self, session_id: i64, user_text: &str) -> Result<TurnOutcome> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(IntakeError::SessionNotFound(session_id))?;

        self.store
            .append_message(session_id, Role::User, user_text)
            .await?;

        if session.status != SessionStatus::Active {
            return self.report_in_progress(&session).await;
        }

        let meta = count_answer(&session.meta);
        if meta != session.meta {
            debug!(
                session_id,
                answered = meta.answered_count,
                quota = meta.question_count,
                "Answer counted"
            );
        }

        let existing = self.store.get_report_by_session(session_id).await?;
        if meta.quota_met() && existing.is_none() {
            info!(session_id, quota = meta.question_count, "Question quota met");
            return self.hand_off(session_id, &meta, HANDOFF_ACKNOWLEDGEMENT).await;
        }

        self.chat_turn(&session, meta).await
    }

    async fn chat_turn(&self, session: &Session, meta: SessionMeta) -> Result<TurnOutcome> {
        let history = to_model_messages(&self.store.list_messages(session.id).await?);
        let response = self
            .gateway
            .complete(history, &self.system_prompt, EffortLevel::Low)
            .await?;

        let signals = self.parser.parse(&response);
        let meta = apply_signals(&meta, &signals);
        let reply = format_reply(&signals.reply);
        if reply.is_empty() {
            return Err(IntakeError::ProviderUnavailable(
                "model reply had no user-facing text".to_string(),
            ));
        }

        debug!(
            session_id = session.id,
            track = ?meta.track,
            quota = meta.question_count,
            answered = meta.answered_count,
            question_sent = meta.last_question_sent,
            "Directives applied"
        );

        if self.completion_phrases.matches(&reply) {
            info!(session_id = session.id, "Model reply announced the report");
            return self.hand_off(session.id, &meta, &reply).await;
        }

        if meta != session.meta {
            let updated = Session {
                meta,
                ..session.clone()
            };
            self.store.save_session(&updated).await?;
        }
        self.store
            .append_message(session.id, Role::Assistant, &reply)
            .await?;

        Ok(TurnOutcome::chat(reply))
    }

    async fn hand_off(
        &self,
        session_id: i64,
        meta: &SessionMeta,
        acknowledgement: &str,
    ) -> Result<TurnOutcome> {
        let handoff = self
            .store
            .begin_report_handoff(session_id, meta, acknowledgement)
            .await?;
        Ok(TurnOutcome::report(
            handoff.acknowledgement.content,
            Some(&handoff.report),
        ))
    }

    /// Session already past intake: never call the model, never create a report
    async fn report_in_progress(&self, session: &Session) -> Result<TurnOutcome> {
        let report = self.store.get_report_by_session(session.id).await?;
        let reply = match report.as_ref().map(|r| r.status()) {
            Some(ReportStatus::Completed) => REPORT_READY_REPLY,
            _ => REPORT_PENDING_REPLY,
        };
        if report.is_none() {
            warn!(session_id = session.id, status = %session.status, "Session past intake without a report");
        }
        Ok(TurnOutcome::report(reply.to_string(), report.as_ref()))
    }
}
