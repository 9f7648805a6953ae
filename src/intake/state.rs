// src/intake/state.rs
// Typed session metadata and the pure mutations the orchestrator applies to it

use crate::error::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current layout of the stored metadata document
pub const META_VERSION: u32 = 1;

/// Session lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    GeneratingReport,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::GeneratingReport => "generating_report",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "generating_report" => Some(Self::GeneratingReport),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::GeneratingReport) | (Self::GeneratingReport, Self::Completed)
        )
    }

    /// Checked one-way transition
    pub fn transition(self, next: SessionStatus) -> Result<SessionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IntakeError::InvalidStateTransition(format!(
                "{} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated intake state of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMeta {
    pub version: u32,
    /// Locked question track; set at most once
    pub track: Option<String>,
    /// Question quota; 0 means not planned yet
    pub question_count: u32,
    pub answered_count: u32,
    /// A question went out in the last assistant reply and awaits an answer
    pub last_question_sent: bool,
    /// Profile summary the model reported (age, sex, main complaint)
    pub user_info: Option<String>,
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            track: None,
            question_count: 0,
            answered_count: 0,
            last_question_sent: false,
            user_info: None,
        }
    }
}

impl SessionMeta {
    pub fn is_track_locked(&self) -> bool {
        self.track.is_some()
    }

    /// Track locked, quota planned and every planned question answered
    pub fn quota_met(&self) -> bool {
        self.is_track_locked()
            && self.question_count > 0
            && self.answered_count >= self.question_count
    }

    /// Whether the user's incoming message answers a pending question
    pub fn awaiting_answer(&self) -> bool {
        self.is_track_locked() && self.question_count > 0 && self.last_question_sent
    }

    /// Decode a stored document. Unknown or broken documents start over empty.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable session metadata, starting from defaults");
            Self::default()
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Pure mutations: each returns a new value; compare with the input to skip writes
// ============================================================================

/// Lock the track; no-op once locked
pub fn lock_track(meta: &SessionMeta, name: &str) -> SessionMeta {
    let name = name.trim();
    if meta.is_track_locked() || name.is_empty() {
        return meta.clone();
    }
    SessionMeta {
        track: Some(name.to_string()),
        ..meta.clone()
    }
}

/// Plan the quota; applies only while unset or zero
pub fn set_question_quota(meta: &SessionMeta, n: u32) -> SessionMeta {
    if meta.question_count > 0 || n == 0 {
        return meta.clone();
    }
    SessionMeta {
        question_count: n,
        answered_count: 0,
        ..meta.clone()
    }
}

pub fn mark_question_sent(meta: &SessionMeta) -> SessionMeta {
    SessionMeta {
        last_question_sent: true,
        ..meta.clone()
    }
}

/// Clear the pending-question flag once the answer to it has been counted
pub fn consume_question_sent(meta: &SessionMeta) -> SessionMeta {
    SessionMeta {
        last_question_sent: false,
        ..meta.clone()
    }
}

/// Count one answer, never past the quota
pub fn increment_answered(meta: &SessionMeta) -> SessionMeta {
    let next = meta.answered_count.saturating_add(1);
    let answered = if meta.question_count > 0 {
        next.min(meta.question_count)
    } else {
        next
    };
    SessionMeta {
        answered_count: answered,
        ..meta.clone()
    }
}

/// Keep the latest profile summary the model reported
pub fn record_user_info(meta: &SessionMeta, info: &str) -> SessionMeta {
    let info = info.trim();
    if info.is_empty() {
        return meta.clone();
    }
    SessionMeta {
        user_info: Some(info.to_string()),
        ..meta.clone()
    }
}
