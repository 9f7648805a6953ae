// src/intake/format.rs
// Presentation cleanup for chat replies and the textual completion safety net

use once_cell::sync::Lazy;
use regex::Regex;

/// Lettered option after whitespace: "... A." -> newline before the option
static RE_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\n])\s+([ABCD]\.)").expect("valid regex"));

/// Numbered item: exactly one space after "1." (decimals like 23.5 are left alone)
static RE_NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.)[ \t]*([^\s\d])").expect("valid regex"));

/// Put each multiple-choice option on its own line and normalize list numbering
pub fn format_reply(text: &str) -> String {
    let options = RE_OPTION.replace_all(text, "$1\n$2");
    let numbered = RE_NUMBERED.replace_all(&options, "$1 $2");
    numbered.trim().to_string()
}

/// Phrases meaning the model has wrapped up the intake on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPhrases(Vec<String>);

impl Default for CompletionPhrases {
    fn default() -> Self {
        Self::new(vec![
            "生成健康报告".to_string(),
            "正在为您生成".to_string(),
            "generating your report".to_string(),
        ])
    }
}

impl CompletionPhrases {
    pub fn new(phrases: Vec<String>) -> Self {
        Self(
            phrases
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// Case-insensitive substring match
    pub fn matches(&self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        self.0.iter().any(|p| reply.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_split_onto_lines() {
        let out = format_reply("您平时运动吗？ A.经常 B.偶尔 C.从不");
        assert_eq!(out, "您平时运动吗？\nA.经常\nB.偶尔\nC.从不");
    }

    #[test]
    fn test_options_already_on_lines_untouched() {
        let text = "问题\nA.是\nB.否";
        assert_eq!(format_reply(text), text);
    }

    #[test]
    fn test_numbered_spacing() {
        assert_eq!(format_reply("1.头痛\n2.   失眠"), "1. 头痛\n2. 失眠");
    }

    #[test]
    fn test_decimals_preserved() {
        assert_eq!(format_reply("您的BMI约为23.5，偏高"), "您的BMI约为23.5，偏高");
    }

    #[test]
    fn test_trims() {
        assert_eq!(format_reply("  \n你好\n "), "你好");
    }

    #[test]
    fn test_completion_phrases() {
        let phrases = CompletionPhrases::default();
        assert!(phrases.matches("好的，正在为您生成健康报告，请稍候"));
        assert!(!phrases.matches("请继续回答第3题"));

        let custom = CompletionPhrases::new(vec!["".into(), "report incoming".into()]);
        assert!(custom.matches("Thanks! report incoming"));
        assert!(!custom.matches("anything"));
    }

    #[test]
    fn test_english_completion_phrase() {
        let phrases = CompletionPhrases::default();
        assert!(phrases.matches("Thank you! Generating your report now."));
        assert!(phrases.matches("I am generating your report, one moment"));
        assert!(!phrases.matches("Question 3: how often do you exercise?"));
    }
}
