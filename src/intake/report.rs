// src/intake/report.rs
// Report generation: one high-effort model call per session, then score/risk extraction

use crate::db::{
    IntakeStore, MessageRecord, PLACEHOLDER_RISK_LEVEL, Report, ReportContent, ReportStatus,
    Session,
};
use crate::error::{IntakeError, Result};
use crate::intake::prompts::{REPORT_REQUEST, render_report_prompt};
use crate::llm::{CompletionGateway, EffortLevel, Message};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Risk label stored when the body carries no risk badge
pub const UNRATED_RISK_LEVEL: &str = "unrated";

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:html)?\s*|\s*```").expect("valid regex"));

/// Number right after a tag naming `score-value` (`class="score-value"` or the bare
/// `score-value>` form). A fraction ("82.5") or a unit ("82分") may follow.
/// Anchored inside `<...>` so CSS rules in a `<style>` block never match.
static RE_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^<>]*\bscore-value\b[^<>]*>\s*(\d+(?:\.\d+)?)[^<]*<").expect("valid regex")
});

/// Text right after a tag naming `risk-badge`
static RE_RISK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^<>]*\brisk-badge\b[^<>]*>\s*([^<]*[^<\s])\s*<").expect("valid regex")
});

/// First non-empty capture; an empty badge does not hide a later one
fn first_capture<'h>(re: &Regex, html: &'h str) -> Option<&'h str> {
    re.captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| !s.is_empty())
}

fn find_score(html: &str) -> Option<i64> {
    first_capture(&RE_SCORE, html)
        .and_then(|s| s.parse::<f64>().ok())
        .map(|v| v.round() as i64)
}

fn find_risk(html: &str) -> Option<String> {
    first_capture(&RE_RISK, html).map(str::to_string)
}

/// Normalized risk class of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Unrated,
}

impl RiskLevel {
    /// Map a free-text label ("高", "中风险", "Low", ...) onto the fixed classes
    pub fn normalize(raw: &str) -> Self {
        let label = raw.trim().to_lowercase();
        if label.is_empty() || label == PLACEHOLDER_RISK_LEVEL {
            Self::Unrated
        } else if label.contains('高') || label.starts_with("high") {
            Self::High
        } else if label.contains('中') || label.starts_with("medium") || label.starts_with("moderate")
        {
            Self::Medium
        } else if label.contains('低') || label.starts_with("low") {
            Self::Low
        } else {
            Self::Unrated
        }
    }

    pub fn label_zh(&self) -> &'static str {
        match self {
            Self::High => "高",
            Self::Medium => "中",
            Self::Low => "低",
            Self::Unrated => "未评估",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unrated => "unrated",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remove Markdown code-fence wrapping around the HTML body
pub fn strip_code_fences(raw: &str) -> String {
    RE_CODE_FENCE.replace_all(raw, "").trim().to_string()
}

/// Score and risk label read from the report body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFields {
    pub score: i64,
    pub risk_level: String,
}

/// Read the score and risk markers. Fails when either marker is missing.
pub fn extract_fields(html: &str) -> Result<ReportFields> {
    let score = find_score(html);
    let risk = find_risk(html);

    match (score, risk) {
        (Some(score), Some(risk_level)) => Ok(ReportFields { score, risk_level }),
        (score, risk) => Err(IntakeError::ExtractionFailure(format!(
            "score marker {}, risk marker {}",
            if score.is_some() { "found" } else { "missing" },
            if risk.is_some() { "found" } else { "missing" },
        ))),
    }
}

/// Like `extract_fields`, but never fails: missing markers fall back to 0 / unrated
pub fn extract_fields_lenient(html: &str) -> ReportFields {
    match extract_fields(html) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(error = %e, "Report markers missing, using fallback values");
            ReportFields {
                score: find_score(html).unwrap_or(0),
                risk_level: find_risk(html).unwrap_or_else(|| UNRATED_RISK_LEVEL.to_string()),
            }
        }
    }
}

/// Flatten the message log into `role: content` lines
pub fn render_history(messages: &[MessageRecord]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produces and finalizes the report of one session
pub struct ReportGenerator {
    store: Arc<dyn IntakeStore>,
    gateway: Arc<dyn CompletionGateway>,
}

impl ReportGenerator {
    pub fn new(store: Arc<dyn IntakeStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self { store, gateway }
    }

    /// Generate the session's report. No-op unless the report is `generating`.
    ///
    /// Model and extraction problems never escape as errors: they end up in the
    /// report as `status = error` so a later call can retry.
    #[instrument(skip(self), fields(report_id))]
    pub async fn generate(&self, session_id: i64) -> Result<Report> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(IntakeError::SessionNotFound(session_id))?;
        let mut report = self
            .store
            .get_report_by_session(session_id)
            .await?
            .ok_or(IntakeError::ReportNotFound(session_id))?;
        tracing::Span::current().record("report_id", report.id);

        if report.status() != ReportStatus::Generating {
            info!(session_id, status = %report.status(), "Report not pending, nothing to do");
            return Ok(report);
        }

        let start = Instant::now();
        match self.author(&session).await {
            Ok(html) => {
                let fields = extract_fields_lenient(&html);
                report.score = fields.score;
                report.risk_level = fields.risk_level;
                report.content = ReportContent::completed(html);

                if !self.store.finalize_report(&report).await? {
                    // Someone else finished first; theirs stands
                    return self
                        .store
                        .get_report_by_session(session_id)
                        .await?
                        .ok_or(IntakeError::ReportNotFound(session_id));
                }
                info!(
                    session_id,
                    score = report.score,
                    risk_level = %report.risk_level,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Report completed"
                );
            }
            Err(e) => {
                error!(session_id, error = %e, "Report generation failed");
                report.content = ReportContent::failed(e.to_string());
                self.store.save_report(&report).await?;
            }
        }

        Ok(report)
    }

    /// Ask the model for the HTML body
    async fn author(&self, session: &Session) -> Result<String> {
        let history = render_history(&self.store.list_messages(session.id).await?);
        let prompt = render_report_prompt(
            session.meta.user_info.as_deref(),
            session.meta.track.as_deref(),
            &history,
        );

        let raw = self
            .gateway
            .complete(vec![Message::user(REPORT_REQUEST)], &prompt, EffortLevel::High)
            .await?;

        let html = strip_code_fences(&raw);
        if html.is_empty() {
            return Err(IntakeError::Other("model returned an empty report".to_string()));
        }
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_class_form() {
        let html = r#"<div><span class="score-value">82</span><span class="risk-badge risk-high">高</span></div>"#;
        let fields = extract_fields(html).unwrap();
        assert_eq!(fields.score, 82);
        assert_eq!(fields.risk_level, "高");
    }

    #[test]
    fn test_extract_bare_form() {
        let fields = extract_fields("<b score-value>82</b><i risk-badge x>高</i>").unwrap();
        assert_eq!(fields, ReportFields { score: 82, risk_level: "高".into() });
    }

    #[test]
    fn test_extract_tolerates_whitespace() {
        let html = "<span class=\"score-value\"> 67 </span>\n<span class=\"risk-badge\">\n  中风险\n</span>";
        let fields = extract_fields(html).unwrap();
        assert_eq!(fields.score, 67);
        assert_eq!(fields.risk_level, "中风险");
    }

    #[test]
    fn test_style_block_does_not_hide_markers() {
        let html = r#"<html><head><style>
.score-value { font-size: 48px; }
.risk-badge { padding: 4px; }
.risk-badge>span { color: red; }
</style></head><body><div><span class="score-value">82</span><span class="risk-badge risk-high">高</span></div></body></html>"#;
        let fields = extract_fields_lenient(html);
        assert_eq!(fields.score, 82);
        assert_eq!(fields.risk_level, "高");
    }

    #[test]
    fn test_empty_badge_skipped() {
        let html = r#"<i class="risk-badge"> </i><span class="score-value">70</span><span class="risk-badge">低</span>"#;
        assert_eq!(extract_fields(html).unwrap().risk_level, "低");
    }

    #[test]
    fn test_score_with_fraction_or_unit() {
        let risk = r#"<span class="risk-badge">中</span>"#;
        let decimal = format!(r#"<span class="score-value">82.5</span>{}"#, risk);
        assert_eq!(extract_fields(&decimal).unwrap().score, 83);

        let unit = format!(r#"<span class="score-value">76分</span>{}"#, risk);
        assert_eq!(extract_fields(&unit).unwrap().score, 76);

        let spaced_unit = format!(r#"<span class="score-value"> 64 / 100</span>{}"#, risk);
        assert_eq!(extract_fields(&spaced_unit).unwrap().score, 64);
    }

    #[test]
    fn test_missing_markers_fall_back() {
        assert!(matches!(
            extract_fields("<p>no markers</p>"),
            Err(IntakeError::ExtractionFailure(_))
        ));
        let fields = extract_fields_lenient("<p>no markers</p>");
        assert_eq!(fields.score, 0);
        assert_eq!(fields.risk_level, UNRATED_RISK_LEVEL);

        let partial = extract_fields_lenient(r#"<span class="score-value">55</span>"#);
        assert_eq!(partial.score, 55);
        assert_eq!(partial.risk_level, UNRATED_RISK_LEVEL);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("```\n<p>y</p>\n```  "), "<p>y</p>");
        assert_eq!(strip_code_fences("<p>z</p>"), "<p>z</p>");
    }

    #[test]
    fn test_risk_normalize() {
        assert_eq!(RiskLevel::normalize("高"), RiskLevel::High);
        assert_eq!(RiskLevel::normalize(" 中风险 "), RiskLevel::Medium);
        assert_eq!(RiskLevel::normalize("Low risk"), RiskLevel::Low);
        assert_eq!(RiskLevel::normalize("MODERATE"), RiskLevel::Medium);
        assert_eq!(RiskLevel::normalize("unrated"), RiskLevel::Unrated);
        assert_eq!(RiskLevel::normalize("生成中"), RiskLevel::Unrated);
        assert_eq!(RiskLevel::Unrated.label_zh(), "未评估");
    }

    #[test]
    fn test_render_history() {
        use crate::llm::Role;
        let messages = vec![
            MessageRecord {
                id: 1,
                session_id: 1,
                role: Role::Assistant,
                content: "您好".into(),
                created_at: 0,
            },
            MessageRecord {
                id: 2,
                session_id: 1,
                role: Role::User,
                content: "失眠".into(),
                created_at: 1,
            },
        ];
        assert_eq!(render_history(&messages), "assistant: 您好\nuser: 失眠");
    }
}
