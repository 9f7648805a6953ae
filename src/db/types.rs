// src/db/types.rs
// Records held by the durable store

use crate::intake::state::{SessionMeta, SessionStatus};
use crate::llm::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk label a report carries while generation is still running
pub const PLACEHOLDER_RISK_LEVEL: &str = "生成中";

/// One intake conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub status: SessionStatus,
    pub meta: SessionMeta,
    /// Unix milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

/// Append-only message log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Generating,
    Completed,
    Error,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generating" => Some(Self::Generating),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report body document: `{status, html, error?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContent {
    pub status: ReportStatus,
    #[serde(default)]
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportContent {
    pub fn generating() -> Self {
        Self {
            status: ReportStatus::Generating,
            html: String::new(),
            error: None,
        }
    }

    pub fn completed(html: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Completed,
            html: html.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            html: String::new(),
            error: Some(error.into()),
        }
    }
}

/// At most one per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub id: i64,
    pub session_id: i64,
    pub score: i64,
    pub risk_level: String,
    pub content: ReportContent,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Report {
    pub fn status(&self) -> ReportStatus {
        self.content.status
    }

    pub fn is_completed(&self) -> bool {
        self.content.status == ReportStatus::Completed
    }
}

/// Row of a user's report list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub report_id: i64,
    pub session_id: i64,
    pub score: i64,
    pub risk_level: String,
    pub status: ReportStatus,
    pub created_at: i64,
    /// First user message cut to 50 characters
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_content_json_shapes() {
        let generating = serde_json::to_value(ReportContent::generating()).unwrap();
        assert_eq!(generating, serde_json::json!({"status": "generating", "html": ""}));

        let failed = serde_json::to_value(ReportContent::failed("timeout")).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"status": "error", "error": "timeout", "html": ""})
        );

        let parsed: ReportContent =
            serde_json::from_str(r#"{"status":"completed","html":"<p>ok</p>"}"#).unwrap();
        assert_eq!(parsed, ReportContent::completed("<p>ok</p>"));
    }

    #[test]
    fn test_report_status_parse() {
        assert_eq!(ReportStatus::parse("error"), Some(ReportStatus::Error));
        assert_eq!(ReportStatus::parse("done"), None);
    }
}
