// src/db/sqlite.rs
// SQLite implementation of IntakeStore

use crate::db::store::{Handoff, IntakeStore};
use crate::db::types::{
    MessageRecord, PLACEHOLDER_RISK_LEVEL, Report, ReportContent, ReportStatus, ReportSummary,
    Session,
};
use crate::error::{IntakeError, Result};
use crate::intake::state::{SessionMeta, SessionStatus};
use crate::llm::Role;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

/// Report list preview length, in characters; longer texts get "..."
const PREVIEW_CHARS: usize = 50;
const NO_PREVIEW: &str = "无预览";

type SessionRow = (i64, i64, String, String, i64, i64);
type MessageRow = (i64, i64, String, String, i64);
type ReportRow = (i64, i64, i64, String, String, i64, i64);

const SESSION_COLUMNS: &str = "id, user_id, status, meta, created_at, updated_at";
const REPORT_COLUMNS: &str = "id, session_id, score, risk_level, content, created_at, updated_at";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn session_from_row(row: SessionRow) -> Result<Session> {
    let (id, user_id, status, meta, created_at, updated_at) = row;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| IntakeError::Other(format!("session {} has unknown status '{}'", id, status)))?;
    Ok(Session {
        id,
        user_id,
        status,
        meta: SessionMeta::from_json(&meta),
        created_at,
        updated_at,
    })
}

fn message_from_row(row: MessageRow) -> MessageRecord {
    let (id, session_id, role, content, created_at) = row;
    MessageRecord {
        id,
        session_id,
        role: Role::from_str(&role),
        content,
        created_at,
    }
}

fn report_from_row(row: ReportRow) -> Result<Report> {
    let (id, session_id, score, risk_level, content, created_at, updated_at) = row;
    Ok(Report {
        id,
        session_id,
        score,
        risk_level,
        content: serde_json::from_str(&content)?,
        created_at,
        updated_at,
    })
}

fn preview_of(first_user_message: Option<String>) -> String {
    match first_user_message {
        Some(text) if text.chars().count() > PREVIEW_CHARS => {
            let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
            preview.push_str("...");
            preview
        }
        Some(text) if !text.trim().is_empty() => text,
        _ => NO_PREVIEW.to_string(),
    }
}

/// Store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file
    pub async fn open(database_url: &str) -> Result<Self> {
        Ok(Self::new(super::pool::open_pool(database_url).await?))
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(super::pool::open_in_memory().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_message(
        tx: &mut Transaction<'_, Sqlite>,
        session_id: i64,
        role: Role,
        content: &str,
    ) -> Result<MessageRecord> {
        let created_at = now_millis();
        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at)
        .execute(&mut **tx)
        .await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            session_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    async fn fetch_report(
        tx: &mut Transaction<'_, Sqlite>,
        session_id: i64,
    ) -> Result<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reports WHERE session_id = ?",
            REPORT_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(report_from_row).transpose()
    }

    /// ON CONFLICT DO NOTHING: a racing duplicate collapses onto the existing row
    async fn insert_placeholder(tx: &mut Transaction<'_, Sqlite>, session_id: i64) -> Result<Report> {
        let now = now_millis();
        let content = serde_json::to_string(&ReportContent::generating())?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO reports (session_id, score, risk_level, status, content, created_at, updated_at)
            VALUES (?, 0, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(PLACEHOLDER_RISK_LEVEL)
        .bind(ReportStatus::Generating.as_str())
        .bind(&content)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            debug!(session_id, "Report already exists, reusing it");
        }

        Self::fetch_report(tx, session_id)
            .await?
            .ok_or(IntakeError::ReportNotFound(session_id))
    }

    async fn write_report(tx: &mut Transaction<'_, Sqlite>, report: &Report) -> Result<bool> {
        let content = serde_json::to_string(&report.content)?;
        let updated = sqlx::query(
            r#"
            UPDATE reports
            SET score = ?, risk_level = ?, status = ?, content = ?, updated_at = ?
            WHERE session_id = ? AND status != 'completed'
            "#,
        )
        .bind(report.score)
        .bind(&report.risk_level)
        .bind(report.content.status.as_str())
        .bind(&content)
        .bind(now_millis())
        .bind(report.session_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }
}

#[async_trait]
impl IntakeStore for SqliteStore {
    async fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(session_from_row).transpose()
    }

    async fn create_session(&self, user_id: i64) -> Result<Session> {
        let now = now_millis();
        let meta = SessionMeta::default();
        let result = sqlx::query(
            "INSERT INTO sessions (user_id, status, meta, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(SessionStatus::Active.as_str())
        .bind(meta.to_json()?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(session_id = id, user_id, "Session created");
        Ok(Session {
            id,
            user_id,
            status: SessionStatus::Active,
            meta,
            created_at: now,
            updated_at: now,
        })
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let updated = sqlx::query("UPDATE sessions SET meta = ?, updated_at = ? WHERE id = ?")
            .bind(session.meta.to_json()?)
            .bind(now_millis())
            .bind(session.id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(IntakeError::SessionNotFound(session.id));
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        session_id: i64,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<()> {
        from.transition(to)?;
        let updated =
            sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(now_millis())
                .bind(session_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected();
        if updated == 0 {
            return Err(IntakeError::InvalidStateTransition(format!(
                "session {} is not {}",
                session_id, from
            )));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
    ) -> Result<MessageRecord> {
        let mut tx = self.pool.begin().await?;
        let message = Self::insert_message(&mut tx, session_id, role, content).await?;
        tx.commit().await?;
        Ok(message)
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<MessageRecord>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM messages
            WHERE session_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn get_report_by_session(&self, session_id: i64) -> Result<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reports WHERE session_id = ?",
            REPORT_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(report_from_row).transpose()
    }

    async fn create_report_placeholder(&self, session_id: i64) -> Result<Report> {
        let mut tx = self.pool.begin().await?;
        let report = Self::insert_placeholder(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(report)
    }

    async fn save_report(&self, report: &Report) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let written = Self::write_report(&mut tx, report).await?;
        tx.commit().await?;
        if !written {
            warn!(session_id = report.session_id, "Completed report left untouched");
        }
        Ok(written)
    }

    async fn begin_report_handoff(
        &self,
        session_id: i64,
        meta: &SessionMeta,
        acknowledgement: &str,
    ) -> Result<Handoff> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE sessions SET meta = ?, status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(meta.to_json()?)
        .bind(SessionStatus::GeneratingReport.as_str())
        .bind(now_millis())
        .bind(session_id)
        .bind(SessionStatus::Active.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if moved == 0 {
            tx.rollback().await?;
            return Err(IntakeError::InvalidStateTransition(format!(
                "session {} is not active, report handoff refused",
                session_id
            )));
        }

        let report = Self::insert_placeholder(&mut tx, session_id).await?;
        let acknowledgement =
            Self::insert_message(&mut tx, session_id, Role::Assistant, acknowledgement).await?;
        tx.commit().await?;

        info!(session_id, report_id = report.id, "Report handoff committed");
        Ok(Handoff {
            report,
            acknowledgement,
        })
    }

    async fn finalize_report(&self, report: &Report) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::write_report(&mut tx, report).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(SessionStatus::Completed.as_str())
            .bind(now_millis())
            .bind(report.session_id)
            .bind(SessionStatus::GeneratingReport.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reset_report_for_retry(&self, session_id: i64) -> Result<bool> {
        let content = serde_json::to_string(&ReportContent::generating())?;
        let updated = sqlx::query(
            r#"
            UPDATE reports
            SET status = ?, content = ?, score = 0, risk_level = ?, updated_at = ?
            WHERE session_id = ? AND status = ?
            "#,
        )
        .bind(ReportStatus::Generating.as_str())
        .bind(&content)
        .bind(PLACEHOLDER_RISK_LEVEL)
        .bind(now_millis())
        .bind(session_id)
        .bind(ReportStatus::Error.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn list_pending_report_sessions(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT session_id FROM reports WHERE status = ? ORDER BY created_at")
                .bind(ReportStatus::Generating.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn latest_active_session(&self, user_id: i64) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE user_id = ? AND status = ? ORDER BY created_at DESC, id DESC LIMIT 1",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(SessionStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(session_from_row).transpose()
    }

    async fn list_reports_for_user(&self, user_id: i64) -> Result<Vec<ReportSummary>> {
        let rows: Vec<(i64, i64, i64, String, String, i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT r.id, r.session_id, r.score, r.risk_level, r.status, r.created_at,
                   (SELECT m.content FROM messages m
                    WHERE m.session_id = r.session_id AND m.role = 'user'
                    ORDER BY m.created_at ASC, m.id ASC LIMIT 1)
            FROM reports r
            JOIN sessions s ON s.id = r.session_id
            WHERE s.user_id = ?
            ORDER BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(report_id, session_id, score, risk_level, status, created_at, first)| {
                    ReportSummary {
                        report_id,
                        session_id,
                        score,
                        risk_level,
                        status: ReportStatus::parse(&status).unwrap_or(ReportStatus::Error),
                        created_at,
                        preview: preview_of(first),
                    }
                },
            )
            .collect())
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(session_id, "Session deleted");
        }
        Ok(deleted > 0)
    }
}
