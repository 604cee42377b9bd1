// src/config/ai.rs
use serde::{Deserialize, Serialize};

fn default_base_url() -> String {
    "https://text.pollinations.ai".to_string()
}
fn default_model() -> String {
    "openai".to_string()
}
fn default_seed() -> u64 {
    42
}
fn default_sentiment_sample() -> usize {
    50
}
fn default_themes_sample() -> usize {
    100
}
fn default_report_sample() -> usize {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

/// Settings for the narrative text-generation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// How many comment texts go into the sentiment prompt.
    #[serde(default = "default_sentiment_sample")]
    pub sentiment_sample: usize,
    #[serde(default = "default_themes_sample")]
    pub themes_sample: usize,
    #[serde(default = "default_report_sample")]
    pub report_sample: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            seed: default_seed(),
            sentiment_sample: default_sentiment_sample(),
            themes_sample: default_themes_sample(),
            report_sample: default_report_sample(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    /// Replace nonsensical values with defaults instead of failing the whole config.
    pub fn sanitize(&mut self) {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        if self.sentiment_sample == 0 {
            self.sentiment_sample = default_sentiment_sample();
        }
        if self.themes_sample == 0 {
            self.themes_sample = default_themes_sample();
        }
        if self.report_sample == 0 {
            self.report_sample = default_report_sample();
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
    }
}
