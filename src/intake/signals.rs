// src/intake/signals.rs
// Control-signal parser: pulls directives out of the model's reasoning segment
//
// Grammar (one directive per line, anywhere before the reply marker):
//   <track label>            [:：] <free text to end of line>
//   <total questions label>  [:：] <integer>
//   <current question label> [:：] <integer>
//   <user profile label>     [:：] <free text to end of line>
//   <reply marker>
//   <user-facing reply>
//
// Labels are matched case-insensitively. Without a marker the whole text is the reply.

use regex::Regex;
use tracing::warn;

/// Label variants accepted for each directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLabels {
    pub reply_markers: Vec<String>,
    pub track: Vec<String>,
    pub total_questions: Vec<String>,
    pub current_question: Vec<String>,
    pub user_info: Vec<String>,
}

impl Default for SignalLabels {
    fn default() -> Self {
        let v = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            reply_markers: v(&["【给用户的回复】", "[REPLY TO USER]"]),
            track: v(&["锁定赛道", "track"]),
            total_questions: v(&["总问题数", "total questions"]),
            current_question: v(&["当前问题编号", "current question #"]),
            user_info: v(&["用户信息", "user profile"]),
        }
    }
}

/// Everything a chat-turn reply can tell the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSignals {
    /// Text meant for the user (trimmed)
    pub reply: String,
    pub track: Option<String>,
    pub question_count: Option<u32>,
    pub current_question: Option<u32>,
    pub user_info: Option<String>,
}

impl ControlSignals {
    pub fn has_directives(&self) -> bool {
        self.track.is_some()
            || self.question_count.is_some()
            || self.current_question.is_some()
            || self.user_info.is_some()
    }
}

/// Pluggable directive extraction
pub trait SignalParser: Send + Sync {
    fn parse(&self, response_text: &str) -> ControlSignals;
}

/// Regex-backed parser built from a label configuration
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    markers: Vec<String>,
    track: Option<Regex>,
    total_questions: Option<Regex>,
    current_question: Option<Regex>,
    user_info: Option<Regex>,
}

const TEXT_VALUE: &str = r"(.+)";
const INT_VALUE: &str = r"(\d+)";
const INLINE_SPACE: &str = r"[ \t\x{3000}]*";

/// A label starting with an ASCII word character must start a word: "track" never
/// matches inside "fast-track" or "soundtrack", "total questions" never inside "subtotal".
fn label_alternative(label: &str) -> String {
    let escaped = regex::escape(label);
    if label.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        format!(r"(?:^|[^\w-]){}", escaped)
    } else {
        escaped
    }
}

/// `(?i)(?:label|label) [:：] <value>` on a single line; `None` when no usable label is configured
fn directive_regex(labels: &[String], value: &str) -> Option<Regex> {
    let alternatives: Vec<String> = labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(label_alternative)
        .collect();
    if alternatives.is_empty() {
        return None;
    }

    let pattern = format!(
        r"(?im)(?:{}){}[:：]{}{}",
        alternatives.join("|"),
        INLINE_SPACE,
        INLINE_SPACE,
        value
    );
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Directive pattern rejected, directive disabled");
            None
        }
    }
}

fn first_text(re: &Option<Regex>, haystack: &str) -> Option<String> {
    re.as_ref()?
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_int(re: &Option<Regex>, haystack: &str) -> Option<u32> {
    re.as_ref()?
        .captures(haystack)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

impl DirectiveParser {
    pub fn new(labels: &SignalLabels) -> Self {
        Self {
            markers: labels
                .reply_markers
                .iter()
                .filter(|m| !m.trim().is_empty())
                .cloned()
                .collect(),
            track: directive_regex(&labels.track, TEXT_VALUE),
            total_questions: directive_regex(&labels.total_questions, INT_VALUE),
            current_question: directive_regex(&labels.current_question, INT_VALUE),
            user_info: directive_regex(&labels.user_info, TEXT_VALUE),
        }
    }

    /// Split at the earliest marker occurrence: (reasoning, reply)
    fn split<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str)> {
        self.markers
            .iter()
            .filter_map(|m| text.find(m.as_str()).map(|pos| (pos, m.len())))
            .min_by_key(|(pos, _)| *pos)
            .map(|(pos, len)| (&text[..pos], &text[pos + len..]))
    }
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new(&SignalLabels::default())
    }
}

impl SignalParser for DirectiveParser {
    fn parse(&self, response_text: &str) -> ControlSignals {
        let Some((reasoning, reply)) = self.split(response_text) else {
            return ControlSignals {
                reply: response_text.trim().to_string(),
                ..Default::default()
            };
        };

        ControlSignals {
            reply: reply.trim().to_string(),
            track: first_text(&self.track, reasoning),
            question_count: first_int(&self.total_questions, reasoning),
            current_question: first_int(&self.current_question, reasoning),
            user_info: first_text(&self.user_info, reasoning),
        }
    }
}
