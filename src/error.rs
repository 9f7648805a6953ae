// src/error.rs
// Error taxonomy for the intake engine

use thiserror::Error;

/// Main error type for the healthy library
#[derive(Error, Debug)]
pub enum IntakeError {
    /// Both model providers failed (or timed out) for one call
    #[error("model providers unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(i64),

    #[error("report not found for session {0}")]
    ReportNotFound(i64),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Report body lacked the score/risk markers. Never fatal to report completion.
    #[error("report extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using IntakeError
pub type Result<T> = std::result::Result<T, IntakeError>;

impl IntakeError {
    /// Text shown to the end user when a turn or report fails.
    ///
    /// Internal details stay in the logs; the user only learns whether retrying makes sense.
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionNotFound(_) => "会话不存在或无权访问。".to_string(),
            Self::ReportNotFound(_) => "报告尚未创建。".to_string(),
            Self::InvalidStateTransition(_) => "当前会话状态不允许该操作。".to_string(),
            Self::ExtractionFailure(_) => "报告已生成，但评分信息缺失。".to_string(),
            _ => "服务暂时不可用，请稍后重试。".to_string(),
        }
    }

    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::Db(_) | Self::Anyhow(_)
        )
    }
}

impl From<String> for IntakeError {
    fn from(s: String) -> Self {
        IntakeError::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Display
    // ============================================================================

    #[test]
    fn test_provider_unavailable_error() {
        let err = IntakeError::ProviderUnavailable("gemini: 503; deepseek: timeout".to_string());
        assert!(err.to_string().contains("providers unavailable"));
        assert!(err.to_string().contains("deepseek: timeout"));
    }

    #[test]
    fn test_not_found_errors_carry_id() {
        assert!(IntakeError::SessionNotFound(42).to_string().contains("42"));
        assert!(IntakeError::ReportNotFound(7).to_string().contains("session 7"));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = IntakeError::InvalidStateTransition("completed -> active".to_string());
        assert!(err.to_string().contains("invalid state transition"));
    }

    // ============================================================================
    // User-facing text
    // ============================================================================

    #[test]
    fn test_provider_failure_asks_to_retry() {
        let err = IntakeError::ProviderUnavailable("down".to_string());
        assert!(err.user_message().contains("重试"));
        assert!(!err.user_message().contains("down"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(IntakeError::ProviderUnavailable("x".into()).is_retryable());
        assert!(!IntakeError::SessionNotFound(1).is_retryable());
        assert!(!IntakeError::InvalidStateTransition("x".into()).is_retryable());
    }

    // ============================================================================
    // Conversions
    // ============================================================================

    #[test]
    fn test_from_string() {
        let err: IntakeError = "some error".to_string().into();
        assert!(matches!(err, IntakeError::Other(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: IntakeError = json_err.into();
        assert!(matches!(err, IntakeError::Json(_)));
    }
}
