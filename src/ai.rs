//! Narrative commentary through a remote text-generation API.
//!
//! Provider abstraction + prompt builders. The report is computed locally first; this layer
//! only turns statistics and a small sample of texts into prose. Each of the four analyses
//! fails independently and is reported as `{analysis | error, sample_count}`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::error::{AnalyzerError, Result};
use crate::http::RetryClient;
use crate::record::format_time;
use crate::summary::SummaryReport;
use crate::window::HotMoment;

/// Longest completion kept, in characters.
pub const MAX_COMPLETION_CHARS: usize = 4000;
const HOT_MOMENTS_IN_PROMPT: usize = 5;
const SAMPLES_PER_MOMENT: usize = 3;
const KEYWORDS_IN_REPORT: usize = 10;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub trait AiClient: Send + Sync {
    /// Send `prompt` with a `system` instruction and return the generated text.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory:
/// * `AI_TEST_MODE=mock` returns a deterministic mock client.
/// * `enabled == false` returns a disabled client.
/// * otherwise the HTTP provider.
pub fn build_client_from_config(config: &AiConfig) -> Result<DynAiClient> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockClient::new("AI commentary (mock)")));
    }
    if !config.enabled {
        return Ok(Arc::new(DisabledClient));
    }
    Ok(Arc::new(PollinationsProvider::new(config)?))
}

/// Short, stable fingerprint for log lines; prompts carry user text and are never logged.
pub fn prompt_digest(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

/// Trim and cap a completion.
pub fn clean_completion(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_COMPLETION_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_COMPLETION_CHARS).collect()
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// `GET <base_url>/<encoded prompt>?model=..&seed=..&system=..` returning plain text.
pub struct PollinationsProvider {
    http: RetryClient,
    base_url: Url,
    model: String,
    seed: u64,
}

impl PollinationsProvider {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Config(format!("building ai client: {e}")))?;
        let retries = config.max_retries.saturating_sub(1);
        Self::with_http(
            RetryClient::with_client(client, retries, Duration::from_secs(1)),
            config,
        )
    }

    pub fn with_http(http: RetryClient, config: &AiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AnalyzerError::Config(format!("ai base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AnalyzerError::Config(format!(
                "ai base_url {} cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            http,
            base_url,
            model: config.model.clone(),
            seed: config.seed,
        })
    }

    fn prompt_url(&self, prompt: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AnalyzerError::Config("ai base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(prompt);
        Ok(url)
    }
}

impl AiClient for PollinationsProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        system: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.prompt_url(prompt)?;
            let query = [
                ("model", self.model.clone()),
                ("seed", self.seed.to_string()),
                ("system", system.to_string()),
            ];
            debug!(target: "ai", prompt = %prompt_digest(prompt), "requesting completion");
            let body = self.http.get_text(url.as_str(), &query).await?;
            let text = clean_completion(&body);
            if text.is_empty() {
                return Err(AnalyzerError::Upstream("empty completion".to_string()));
            }
            Ok(text)
        })
    }

    fn provider_name(&self) -> &'static str {
        "pollinations"
    }
}

/// Always fails; used when text generation is switched off.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        _system: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async {
            Err(AnalyzerError::Config(
                "text generation is disabled".to_string(),
            ))
        })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic client for tests and local runs. Remembers every prompt it saw.
pub struct MockClient {
    fixed: String,
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("poisoned prompts").clone()
    }
}

impl AiClient for MockClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        _system: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        self.prompts
            .lock()
            .expect("poisoned prompts")
            .push(prompt.to_string());
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Prompts
// ------------------------------------------------------------

const SENTIMENT_SYSTEM: &str =
    "你是一个专业的弹幕情感分析师，能够准确识别中文弹幕中的情感倾向和观众反应。";
const THEMES_SYSTEM: &str =
    "你是一个内容分析专家，擅长从弹幕中提取和总结主要话题、观众兴趣点和内容特征。";
const HOT_MOMENTS_SYSTEM: &str =
    "你是一个视频内容分析专家，能够从弹幕热点数据中推断视频内容特点和观众反应模式。";
const REPORT_SYSTEM: &str =
    "你是一个专业的新媒体内容分析师，擅长从弹幕数据中分析视频内容特点、观众行为和传播效果。";

fn bullet_list(texts: &[&str]) -> String {
    texts
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sample<'a, 'b>(texts: &'b [&'a str], n: usize) -> &'b [&'a str] {
    &texts[..texts.len().min(n)]
}

pub fn sentiment_prompt(texts: &[&str]) -> String {
    format!(
        "请分析以下弹幕的整体情感倾向和观众反应：\n\n弹幕内容：\n{}\n\n\
         请从以下几个维度进行分析：\n\
         1. 整体情感倾向（积极/消极/中性的比例）\n\
         2. 主要情绪类型（兴奋、惊讶、感动、不满等）\n\
         3. 观众反应特点\n\
         4. 热门话题或关注点\n\n\
         请用中文回答，格式简洁明了。",
        bullet_list(texts)
    )
}

pub fn themes_prompt(texts: &[&str]) -> String {
    format!(
        "请分析以下弹幕内容的主要话题和主题：\n\n弹幕内容：\n{}\n\n\
         请从以下几个方面进行分析：\n\
         1. 主要讨论话题（按重要性排序）\n\
         2. 观众关注的重点内容\n\
         3. 出现频率较高的梗或流行语\n\
         4. 弹幕反映的视频内容特点\n\
         5. 观众群体特征分析\n\n\
         请用中文回答，条理清晰。",
        bullet_list(texts)
    )
}

/// One line per moment: `热点1: 01:30 (弹幕数:42) - 样本弹幕: a; b; c`.
pub fn hot_moments_prompt(moments: &[HotMoment]) -> String {
    let lines: Vec<String> = moments
        .iter()
        .take(HOT_MOMENTS_IN_PROMPT)
        .enumerate()
        .map(|(i, m)| {
            let samples: Vec<&str> = m
                .samples
                .iter()
                .take(SAMPLES_PER_MOMENT)
                .map(String::as_str)
                .collect();
            format!(
                "热点{}: {} (弹幕数:{}) - 样本弹幕: {}",
                i + 1,
                format_time(m.start),
                m.count,
                samples.join("; ")
            )
        })
        .collect();
    format!(
        "请分析以下视频的弹幕热点时刻：\n\n热点时刻信息：\n{}\n\n\
         请分析：\n\
         1. 每个热点时刻可能对应的视频内容\n\
         2. 观众在这些时刻的主要反应\n\
         3. 热点形成的可能原因\n\
         4. 这些热点反映的视频特色\n\
         5. 对内容创作者的建议\n\n\
         请用中文回答，分析要有逻辑性。",
        lines.join("\n")
    )
}

pub fn comprehensive_prompt(report: &SummaryReport, texts: &[&str]) -> String {
    let b = &report.basic_stats;
    let s = &report.sentiment;
    let keywords: Vec<&str> = report
        .keywords
        .iter()
        .take(KEYWORDS_IN_REPORT)
        .map(|(w, _)| w.as_str())
        .collect();
    let stats = format!(
        "基本统计：\n- 总弹幕数：{}\n- 独特弹幕数：{}\n- 重复率：{:.1}%\n\n\
         热门关键词：{}\n\n\
         情感分布：积极 {:.1}%, 消极 {:.1}%, 中性 {:.1}%\n\n\
         热点时刻数：{}",
        b.total_count,
        b.unique_count,
        b.duplicate_rate * 100.0,
        keywords.join(", "),
        s.positive * 100.0,
        s.negative * 100.0,
        s.neutral * 100.0,
        report.hot_moments.len()
    );
    format!(
        "基于以下弹幕数据统计和样本，请生成一份专业的视频弹幕分析报告：\n\n\
         统计数据：\n{stats}\n\n弹幕样本：\n{}\n\n\
         请生成一份包含以下内容的分析报告：\n\
         1. 视频内容推测和类型判断\n\
         2. 观众群体特征分析\n\
         3. 观众参与度和互动质量评估\n\
         4. 弹幕文化现象观察\n\
         5. 视频传播潜力和受欢迎程度分析\n\
         6. 对内容创作者的建议和改进方向",
        bullet_list(texts)
    )
}

// ------------------------------------------------------------
// Orchestration
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sample_count: usize,
}

impl AiSection {
    fn failed(error: impl Into<String>, sample_count: usize) -> Self {
        Self {
            analysis: None,
            error: Some(error.into()),
            sample_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReport {
    pub provider: String,
    pub sentiment: AiSection,
    pub themes: AiSection,
    /// Absent when the report has no hot moments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_moments: Option<AiSection>,
    pub comprehensive: AiSection,
}

async fn run_section(
    client: &dyn AiClient,
    label: &'static str,
    prompt: String,
    system: &str,
    sample_count: usize,
) -> AiSection {
    match client.complete(&prompt, system).await {
        Ok(text) => AiSection {
            analysis: Some(text),
            error: None,
            sample_count,
        },
        Err(e) => {
            warn!(target: "ai", section = label, error = %e, "ai section failed");
            AiSection::failed(format!("{label} analysis failed: {e}"), sample_count)
        }
    }
}

/// Run all four analyses over an already assembled report. `texts` are the non-empty
/// comment texts in fetch order; the first N of each sample size are used.
pub async fn analyze_with_ai(
    client: &dyn AiClient,
    config: &AiConfig,
    report: &SummaryReport,
    texts: &[&str],
) -> AiReport {
    let provider = client.provider_name().to_string();
    if texts.is_empty() {
        let empty = AiSection::failed(crate::summary::NO_DATA, 0);
        return AiReport {
            provider,
            sentiment: empty.clone(),
            themes: empty.clone(),
            hot_moments: None,
            comprehensive: empty,
        };
    }

    let sent = sample(texts, config.sentiment_sample);
    let sentiment = run_section(
        client,
        "sentiment",
        sentiment_prompt(sent),
        SENTIMENT_SYSTEM,
        sent.len(),
    )
    .await;

    let them = sample(texts, config.themes_sample);
    let themes = run_section(client, "themes", themes_prompt(them), THEMES_SYSTEM, them.len()).await;

    let hot_moments = if report.hot_moments.is_empty() {
        None
    } else {
        let used = report.hot_moments.len().min(HOT_MOMENTS_IN_PROMPT);
        Some(
            run_section(
                client,
                "hot_moments",
                hot_moments_prompt(&report.hot_moments),
                HOT_MOMENTS_SYSTEM,
                used,
            )
            .await,
        )
    };

    let rep = sample(texts, config.report_sample);
    let comprehensive = run_section(
        client,
        "comprehensive",
        comprehensive_prompt(report, rep),
        REPORT_SYSTEM,
        rep.len(),
    )
    .await;

    info!(target: "ai", provider = %provider, texts = texts.len(), "ai commentary finished");
    AiReport {
        provider,
        sentiment,
        themes,
        hot_moments,
        comprehensive,
    }
}
