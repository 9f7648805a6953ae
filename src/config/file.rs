// src/config/file.rs
// File-based configuration from ~/.healthy/config.toml

use crate::intake::signals::SignalLabels;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Deserialize, Default)]
pub struct HealthyConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

/// Model overrides
#[derive(Debug, Deserialize, Default)]
pub struct LlmConfig {
    /// Fallback model for low effort turns (default deepseek-chat)
    pub fallback_fast_model: Option<String>,
    /// Fallback model for high effort turns (default from DEEP_SEEK_MODEL_REASONER)
    pub fallback_deep_model: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Label variants the directive parser accepts. Each list replaces the default set.
#[derive(Debug, Deserialize, Default)]
pub struct SignalsConfig {
    pub reply_markers: Option<Vec<String>>,
    pub track_labels: Option<Vec<String>>,
    pub total_question_labels: Option<Vec<String>>,
    pub current_question_labels: Option<Vec<String>>,
    pub user_info_labels: Option<Vec<String>>,
    pub completion_phrases: Option<Vec<String>>,
}

impl HealthyConfig {
    /// Load config from ~/.healthy/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".healthy")
            .join("config.toml")
    }

    /// Directive labels, with configured lists replacing the defaults
    pub fn signal_labels(&self) -> SignalLabels {
        let defaults = SignalLabels::default();
        let pick = |configured: &Option<Vec<String>>, default: Vec<String>| match configured {
            Some(list) if !list.is_empty() => list.clone(),
            _ => default,
        };

        SignalLabels {
            reply_markers: pick(&self.signals.reply_markers, defaults.reply_markers),
            track: pick(&self.signals.track_labels, defaults.track),
            total_questions: pick(&self.signals.total_question_labels, defaults.total_questions),
            current_question: pick(
                &self.signals.current_question_labels,
                defaults.current_question,
            ),
            user_info: pick(&self.signals.user_info_labels, defaults.user_info),
        }
    }

    /// Phrases that mark a reply as ending the intake
    pub fn completion_phrases(&self) -> Option<Vec<String>> {
        self.signals
            .completion_phrases
            .clone()
            .filter(|p| !p.is_empty())
    }
}
