// src/config/mod.rs
//! Typed application configuration.
//!
//! Loaded once at startup from TOML (`config/danmaku.toml` or `$DANMAKU_CONFIG_PATH`),
//! then patched with a few env overrides. Every section has defaults, so an absent file
//! yields a fully usable config; a present but malformed file is a hard error.

pub mod ai;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use ai::AiConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/danmaku.toml";
pub const ENV_CONFIG_PATH: &str = "DANMAKU_CONFIG_PATH";
pub const ENV_CACHE_MAX_SIZE: &str = "DANMAKU_CACHE_MAX_SIZE";
pub const ENV_AI_ENABLED: &str = "DANMAKU_AI_ENABLED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ui: UiSettings,
    pub network: NetworkSettings,
    pub analysis: AnalysisSettings,
    pub cache: CacheSettings,
    pub ai: AiConfig,
    pub lexicon: LexiconSettings,
}

/// Bounds and defaults for the user-facing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub time_interval_min: u32,
    pub time_interval_max: u32,
    pub time_interval_default: u32,
    pub keyword_count_min: u32,
    pub keyword_count_max: u32,
    pub keyword_count_default: u32,
    pub max_page: u32,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            time_interval_min: 10,
            time_interval_max: 100,
            time_interval_default: 60,
            keyword_count_min: 10,
            keyword_count_max: 100,
            keyword_count_default: 30,
            max_page: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Base delay for exponential backoff, in seconds.
    pub retry_delay_secs: f64,
    pub user_agent: String,
    /// Login cookie; only needed for date-filtered history comments.
    pub sessdata: Option<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 1.0,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            sessdata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Upper bound on records fed into one analysis run.
    pub max_danmaku_count: usize,
    pub min_keyword_length: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_danmaku_count: 10_000,
            min_keyword_length: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_size: usize,
    pub default_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconSettings {
    pub stop_words: Vec<String>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for LexiconSettings {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| w.to_string()).collect()
        }
        Self {
            stop_words: owned(&[
                "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "个", "这",
                "没", "会", "么", "说", "把", "你", "也", "要", "到", "用", "他", "好", "那", "多",
                "能", "还", "时", "很", "看", "来", "只", "被", "对", "上", "去", "可", "两", "啊",
                "吗", "吧", "呢", "这样", "但", "而", "或", "已经", "一个", "什么", "这个", "那个",
                "哈哈", "哈哈哈", "the", "and", "is", "it", "to", "of",
            ]),
            positive: owned(&[
                "好", "棒", "赞", "牛", "优秀", "精彩", "厉害", "给力", "完美", "喜欢", "可爱",
                "感动", "震撼", "有趣", "yyds", "nb", "666",
            ]),
            negative: owned(&[
                "差", "烂", "垃圾", "无聊", "失望", "讨厌", "难看", "糟糕", "不行", "坑", "恶心",
                "拉胯", "翻车",
            ]),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. Missing sections fall back to defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolution order:
    /// 1) `$DANMAKU_CONFIG_PATH` (must exist)
    /// 2) `config/danmaku.toml` if present
    /// 3) built-in defaults
    ///
    /// Env overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from_file(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from_file(&default_path)?
            } else {
                info!(target: "config", "no config file found, using defaults");
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_CACHE_MAX_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.cache.max_size = n,
                _ => warn!(target: "config", value = %raw, "ignoring invalid {ENV_CACHE_MAX_SIZE}"),
            }
        }
        if let Ok(raw) = std::env::var(ENV_AI_ENABLED) {
            self.ai.enabled = matches!(raw.trim(), "1" | "true" | "yes" | "on");
        }
        self.sanitize();
    }

    /// Clamp or reset values that would break the pipeline.
    pub fn sanitize(&mut self) {
        let ui_defaults = UiSettings::default();
        if self.ui.time_interval_min == 0 || self.ui.time_interval_min > self.ui.time_interval_max
        {
            self.ui.time_interval_min = ui_defaults.time_interval_min;
            self.ui.time_interval_max = ui_defaults.time_interval_max;
        }
        self.ui.time_interval_default = self
            .ui
            .time_interval_default
            .clamp(self.ui.time_interval_min, self.ui.time_interval_max);
        if self.ui.keyword_count_min == 0 || self.ui.keyword_count_min > self.ui.keyword_count_max
        {
            self.ui.keyword_count_min = ui_defaults.keyword_count_min;
            self.ui.keyword_count_max = ui_defaults.keyword_count_max;
        }
        self.ui.keyword_count_default = self
            .ui
            .keyword_count_default
            .clamp(self.ui.keyword_count_min, self.ui.keyword_count_max);
        if self.ui.max_page == 0 {
            self.ui.max_page = ui_defaults.max_page;
        }

        if self.cache.max_size == 0 {
            self.cache.max_size = CacheSettings::default().max_size;
        }
        if !self.network.retry_delay_secs.is_finite() || self.network.retry_delay_secs < 0.0 {
            self.network.retry_delay_secs = NetworkSettings::default().retry_delay_secs;
        }
        if self.network.timeout_secs == 0 {
            self.network.timeout_secs = NetworkSettings::default().timeout_secs;
        }
        if self.analysis.max_danmaku_count == 0 {
            self.analysis.max_danmaku_count = AnalysisSettings::default().max_danmaku_count;
        }
        self.ai.sanitize();
    }
}
