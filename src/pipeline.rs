//! Request orchestration: validate → fetch (through the cache) → assemble → chart → optional AI.
//!
//! The [`Pipeline`] owns configuration, the cache and every collaborator; nothing here is
//! global. The cache mutex is only held for individual cache calls, never across `.await`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::{analyze_with_ai, AiReport, DynAiClient};
use crate::cache::{CacheStats, DanmakuCache, DanmakuKey};
use crate::config::AppConfig;
use crate::error::{AnalyzerError, Result};
use crate::fetcher::{DanmakuSource, InterfaceKind, VideoInfo};
use crate::metrics::{PIPELINE_DURATION_MS, PIPELINE_RUNS};
use crate::record::CommentRecord;
use crate::summary::{assemble, Summary};
use crate::text::LexiconAnalyzer;
use crate::viz::{build_charts, ChartSet};

/// A validated analysis request. `page` is 1-based as users see it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub video_id: String,
    pub page: u32,
    pub interface: InterfaceKind,
    pub date: Option<NaiveDate>,
    pub time_interval: u32,
    pub keyword_count: u32,
    pub with_ai: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub video_id: String,
    pub page: u32,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charts: Option<ChartSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiReport>,
    /// True when the report itself came from the cache.
    pub cached: bool,
}

pub struct Pipeline {
    config: AppConfig,
    cache: Mutex<DanmakuCache>,
    source: Arc<dyn DanmakuSource>,
    analyzer: LexiconAnalyzer,
    ai: DynAiClient,
}

impl Pipeline {
    pub fn new(config: AppConfig, source: Arc<dyn DanmakuSource>, ai: DynAiClient) -> Self {
        let cache = DanmakuCache::new(&config.cache);
        Self::with_cache(config, cache, source, ai)
    }

    pub fn with_cache(
        config: AppConfig,
        cache: DanmakuCache,
        source: Arc<dyn DanmakuSource>,
        ai: DynAiClient,
    ) -> Self {
        let analyzer = LexiconAnalyzer::new(&config.lexicon, &config.analysis);
        Self {
            config,
            cache: Mutex::new(cache),
            source,
            analyzer,
            ai,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn cache(&self) -> MutexGuard<'_, DanmakuCache> {
        self.cache.lock().expect("cache mutex poisoned")
    }

    pub async fn video_info(&self, video_id: &str) -> Result<Arc<VideoInfo>> {
        let hit = self.cache().get_video_info(video_id);
        if let Some(hit) = hit {
            return Ok(hit);
        }
        let info = self.source.video_info(video_id).await?;
        let mut cache = self.cache();
        cache.set_video_info(video_id, info, None);
        cache
            .get_video_info(video_id)
            .ok_or_else(|| AnalyzerError::Config("video info vanished from cache".to_string()))
    }

    /// Comments for one part (`page` is 1-based), served from the cache when possible and
    /// capped at `analysis.max_danmaku_count`.
    pub async fn comments(
        &self,
        video_id: &str,
        page: u32,
        interface: InterfaceKind,
        date: Option<NaiveDate>,
    ) -> Result<Arc<Vec<CommentRecord>>> {
        if page == 0 {
            return Err(AnalyzerError::OutOfRange {
                field: "page".to_string(),
                value: 0.0,
                min: 1.0,
                max: self.config.ui.max_page as f64,
            });
        }
        let date_str = date.map(|d| d.format("%Y-%m-%d").to_string());
        let key = DanmakuKey {
            video_id,
            page,
            interface,
            date: date_str.as_deref(),
        };
        let hit = self.cache().get_danmaku(&key);
        if let Some(hit) = hit {
            debug!(target: "pipeline", page, interface = interface.as_str(), "comment cache hit");
            return Ok(hit);
        }

        // part lookup goes through the video info cache
        let info = self.video_info(video_id).await?;
        let part = info.part((page - 1) as usize)?;
        let mut records = self
            .source
            .fetch_part(video_id, &part, interface, date_str.as_deref())
            .await?;
        records.truncate(self.config.analysis.max_danmaku_count);
        let records = Arc::new(records);
        self.cache()
            .set_danmaku(&key, records.as_ref().clone(), None);
        Ok(records)
    }

    /// Pure assembly with the configured lexicon; no cache involved.
    pub fn summarize(&self, records: &[CommentRecord], time_interval: f64) -> Result<Summary> {
        assemble(records, time_interval, &self.analyzer, &self.analyzer)
    }

    /// Requests at the configured defaults (default interface, no date, default interval)
    /// share one analysis entry per video page.
    fn is_canonical(&self, req: &AnalyzeRequest) -> bool {
        req.interface == InterfaceKind::default()
            && req.date.is_none()
            && req.time_interval == self.config.ui.time_interval_default
    }

    pub async fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        counter!(PIPELINE_RUNS).increment(1);

        let canonical = self.is_canonical(req);
        let cached_summary = if canonical {
            self.cache().get_analysis(&req.video_id, req.page)
        } else {
            None
        };

        let (summary, records, cached) = match cached_summary {
            Some(s) => ((*s).clone(), None, true),
            None => {
                let records = self
                    .comments(&req.video_id, req.page, req.interface, req.date)
                    .await?;
                let summary = self.summarize(&records, f64::from(req.time_interval))?;
                if canonical && summary.report().is_some() {
                    self.cache()
                        .set_analysis(&req.video_id, req.page, summary.clone(), None);
                }
                (summary, Some(records), false)
            }
        };

        let charts = summary
            .report()
            .map(|r| build_charts(r, req.keyword_count as usize));

        let ai = match (req.with_ai, summary.report()) {
            (true, Some(report)) => {
                let records = match records {
                    Some(r) => r,
                    None => {
                        self.comments(&req.video_id, req.page, req.interface, req.date)
                            .await?
                    }
                };
                let texts: Vec<&str> = records
                    .iter()
                    .map(|r| r.text.as_str())
                    .filter(|t| !t.is_empty())
                    .collect();
                Some(analyze_with_ai(self.ai.as_ref(), &self.config.ai, report, &texts).await)
            }
            _ => None,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(PIPELINE_DURATION_MS).record(elapsed_ms);
        info!(
            target: "pipeline",
            video = %req.video_id,
            page = req.page,
            interface = req.interface.as_str(),
            cached,
            empty = summary.report().is_none(),
            elapsed_ms = elapsed_ms as u64,
            "analysis finished"
        );

        Ok(AnalysisOutcome {
            video_id: req.video_id.clone(),
            page: req.page,
            summary,
            charts,
            ai,
            cached,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn clear_cache(&self) -> CacheStats {
        let mut cache = self.cache();
        cache.clear();
        cache.stats()
    }

    pub fn invalidate_video(&self, video_id: &str) -> usize {
        let removed = self.cache().invalidate_video(video_id);
        info!(target: "pipeline", video = %video_id, removed, "invalidated cached video");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockClient;
    use crate::fetcher::PageInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        records: Vec<CommentRecord>,
        fetches: AtomicUsize,
        info_calls: AtomicUsize,
    }

    #[async_trait]
    impl DanmakuSource for CountingSource {
        async fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(VideoInfo {
                bvid: video_id.to_string(),
                cid: 4242,
                title: "demo".to_string(),
                ..VideoInfo::default()
            })
        }

        async fn fetch_part(
            &self,
            _video_id: &str,
            part: &PageInfo,
            _interface: InterfaceKind,
            _date: Option<&str>,
        ) -> Result<Vec<CommentRecord>> {
            assert_eq!(part.cid, 4242, "part comes from the cached video info");
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn pipeline(records: Vec<CommentRecord>) -> (Pipeline, Arc<CountingSource>, Arc<MockClient>) {
        let source = Arc::new(CountingSource {
            records,
            fetches: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        });
        let ai = Arc::new(MockClient::new("ok"));
        let p = Pipeline::new(AppConfig::default(), source.clone(), ai.clone());
        (p, source, ai)
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            video_id: "BV1234567890".to_string(),
            page: 1,
            interface: InterfaceKind::Protobuf,
            date: None,
            time_interval: 60,
            keyword_count: 30,
            with_ai: false,
        }
    }

    fn records(n: usize) -> Vec<CommentRecord> {
        (0..n).map(|i| CommentRecord::new("前方高能", i as f64)).collect()
    }

    #[tokio::test]
    async fn canonical_request_is_served_from_cache_second_time() {
        let (p, source, _) = pipeline(records(50));
        let first = p.analyze(&request()).await.unwrap();
        assert!(!first.cached);
        let second = p.analyze(&request()).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.summary, second.summary);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(second.charts.is_some());
    }

    #[tokio::test]
    async fn custom_interval_reuses_comments_but_not_report() {
        let (p, source, _) = pipeline(records(50));
        p.analyze(&request()).await.unwrap();
        let custom = AnalyzeRequest {
            time_interval: 10,
            ..request()
        };
        let out = p.analyze(&custom).await.unwrap();
        assert!(!out.cached);
        assert_eq!(out.summary.report().unwrap().time_distribution.len(), 5);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_comments_are_not_cached_as_reports() {
        let (p, _, _) = pipeline(Vec::new());
        let out = p.analyze(&request()).await.unwrap();
        assert_eq!(out.summary.error(), Some("no data"));
        assert!(out.charts.is_none());
        let again = p.analyze(&request()).await.unwrap();
        assert!(!again.cached);
    }

    #[tokio::test]
    async fn ai_runs_on_cached_reports_too() {
        let (p, _, ai) = pipeline(records(20));
        p.analyze(&request()).await.unwrap();
        let out = p
            .analyze(&AnalyzeRequest {
                with_ai: true,
                ..request()
            })
            .await
            .unwrap();
        assert!(out.cached);
        let report = out.ai.unwrap();
        assert_eq!(report.sentiment.analysis.as_deref(), Some("ok"));
        assert_eq!(report.sentiment.sample_count, 20);
        assert!(report.hot_moments.is_some());
        assert_eq!(ai.prompts().len(), 4);
    }

    #[tokio::test]
    async fn invalidate_drops_everything_for_the_video() {
        let (p, source, _) = pipeline(records(5));
        p.video_info("BV1234567890").await.unwrap();
        p.analyze(&request()).await.unwrap();
        assert_eq!(p.invalidate_video("BV1234567890"), 3);
        p.analyze(&request()).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(p.clear_cache().size, 0);
    }

    #[tokio::test]
    async fn comment_fetch_reuses_cached_video_info() {
        let (p, source, _) = pipeline(records(5));
        p.video_info("BV1234567890").await.unwrap();
        p.analyze(&request()).await.unwrap();
        p.analyze(&AnalyzeRequest {
            interface: InterfaceKind::Xml,
            ..request()
        })
        .await
        .unwrap();
        assert_eq!(source.info_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn page_beyond_parts_is_invalid() {
        let (p, source, _) = pipeline(records(5));
        let err = p
            .comments("BV1234567890", 2, InterfaceKind::Protobuf, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_parameter");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn comment_cap_applies() {
        let mut cfg = AppConfig::default();
        cfg.analysis.max_danmaku_count = 10;
        let source = Arc::new(CountingSource {
            records: records(25),
            fetches: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        });
        let p = Pipeline::new(cfg, source, Arc::new(MockClient::new("x")));
        let recs = p
            .comments("BV1234567890", 1, InterfaceKind::Xml, None)
            .await
            .unwrap();
        assert_eq!(recs.len(), 10);
    }
}
