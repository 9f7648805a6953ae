// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default OpenAI-compatible base URL for the primary (Gemini) provider
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://grsai.dakka.com.cn/v1";
/// Default primary model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro";
/// Default secondary reasoning model
pub const DEFAULT_DEEPSEEK_REASONER: &str = "deepseek-reasoner";
/// Provider timeout in seconds (report calls at high effort are slow)
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 300;

/// API keys loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Primary provider key (GRSAI_KEY or GEMINI_API_KEY)
    pub gemini: Option<String>,
    /// Secondary provider key (DEEP_SEEK or DEEPSEEK_API_KEY)
    pub deepseek: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables
    pub fn from_env() -> Self {
        let keys = Self::from_lookup(|name| std::env::var(name).ok());
        keys.log_status();
        keys
    }

    /// Load API keys through an arbitrary variable lookup, filtering empty values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|k| !k.trim().is_empty());
        Self {
            gemini: read("GRSAI_KEY").or_else(|| read("GEMINI_API_KEY")),
            deepseek: read("DEEP_SEEK").or_else(|| read("DEEPSEEK_API_KEY")),
        }
    }

    fn log_status(&self) {
        let mut available = Vec::new();
        if self.gemini.is_some() {
            available.push("Gemini");
        }
        if self.deepseek.is_some() {
            available.push("DeepSeek");
        }

        if available.is_empty() {
            warn!("No API keys configured - model calls will fail");
        } else {
            debug!(keys = ?available, "API keys loaded");
        }
    }

    /// Check if any model provider is available
    pub fn has_llm_provider(&self) -> bool {
        self.gemini.is_some() || self.deepseek.is_some()
    }

    /// Whether a fallback exists when the primary fails
    pub fn has_fallback(&self) -> bool {
        self.gemini.is_some() && self.deepseek.is_some()
    }

    /// Get a summary of available providers
    pub fn summary(&self) -> String {
        let mut providers = Vec::new();
        if self.gemini.is_some() {
            providers.push("Gemini");
        }
        if self.deepseek.is_some() {
            providers.push("DeepSeek");
        }
        if providers.is_empty() {
            "None".to_string()
        } else {
            providers.join(", ")
        }
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    /// SQLite URL or path (HEALTHY_DATABASE_URL)
    pub database_url: String,
    /// OpenAI-compatible base URL of the primary provider (GEMINI_BASE_URL)
    pub gemini_base_url: String,
    /// Primary model (GEMINI_MODEL)
    pub gemini_model: String,
    /// Primary request timeout (GEMINI_TIMEOUT, seconds)
    pub gemini_timeout: Duration,
    /// Secondary reasoning model used for high effort (DEEP_SEEK_MODEL_REASONER)
    pub deepseek_reasoner_model: String,
    /// Secondary request timeout (DEEP_SEEK_TIMEOUT, seconds)
    pub deepseek_timeout: Duration,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.api_keys.log_status();
        config
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secs = |name: &str| {
            Duration::from_secs(
                read(name)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
            )
        };

        Self {
            api_keys: ApiKeys::from_lookup(&lookup),
            database_url: read("HEALTHY_DATABASE_URL").unwrap_or_else(default_database_url),
            gemini_base_url: read("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_model: read("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_timeout: secs("GEMINI_TIMEOUT"),
            deepseek_reasoner_model: read("DEEP_SEEK_MODEL_REASONER")
                .unwrap_or_else(|| DEFAULT_DEEPSEEK_REASONER.to_string()),
            deepseek_timeout: secs("DEEP_SEEK_TIMEOUT"),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.api_keys.has_llm_provider() {
            validation.add_error("No model API keys configured. Set GRSAI_KEY and/or DEEP_SEEK.");
        } else if !self.api_keys.has_fallback() {
            validation.add_warning(format!(
                "Only one model provider configured ({}); failures will not fail over.",
                self.api_keys.summary()
            ));
        }

        if !self.gemini_base_url.starts_with("http") {
            validation.add_error(format!(
                "GEMINI_BASE_URL '{}' is not an http(s) URL",
                self.gemini_base_url
            ));
        }

        validation
    }
}

/// Default database location: ~/.healthy/healthy.db
pub fn default_database_url() -> String {
    let path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".healthy")
        .join("healthy.db");
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}
