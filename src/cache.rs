//! # In-memory cache with TTL + LRU eviction
//!
//! [`DataCache`] is a small string-keyed store:
//! - every entry carries an absolute expiry; it is visible iff `now < expires_at`,
//! - expired entries are swept lazily at the start of `get`/`set`/prefix scans,
//! - when full, `set` evicts the single least-recently touched entry (touch = `get` hit or `set`).
//!
//! Operations take `&mut self`; callers sharing a cache wrap it in one `Mutex` so the
//! sweep → evict → insert sequence runs as a single critical section.
//!
//! [`DanmakuCache`] layers the typed accessors (video info / comments / analysis) with their
//! fixed default TTLs on top.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CacheSettings;
use crate::fetcher::types::{InterfaceKind, VideoInfo};
use crate::record::CommentRecord;
use crate::summary::Summary;

pub const VIDEO_INFO_TTL_SECS: f64 = 600.0;
pub const DANMAKU_TTL_SECS: f64 = 1800.0;
pub const ANALYSIS_TTL_SECS: f64 = 7200.0;

/// Time source in (fractional) seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn advance(&self, secs: f64) {
        let now = self.now();
        self.bits.store((now + secs).to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: f64,
    expires_at: f64,
    /// Monotonic touch sequence; smaller = less recently used.
    last_touch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Stored entries, including expired ones not yet swept.
    pub size: usize,
    pub max_size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Percent, rounded to two decimals.
    pub hit_rate: f64,
    pub expired_count: usize,
}

pub struct DataCache<V> {
    entries: HashMap<String, Entry<V>>,
    max_size: usize,
    default_ttl: f64,
    hit_count: u64,
    miss_count: u64,
    tick: u64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> DataCache<V> {
    pub fn new(max_size: usize, default_ttl_secs: f64) -> Self {
        Self::with_clock(max_size, default_ttl_secs, Arc::new(SystemClock))
    }

    pub fn with_clock(max_size: usize, default_ttl_secs: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            max_size: max_size.max(1),
            default_ttl: default_ttl_secs.max(0.0),
            hit_count: 0,
            miss_count: 0,
            tick: 0,
            clock,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Drop every entry whose expiry has passed. Returns how many were removed.
    fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(target: "cache", removed, "swept expired entries");
        }
        removed
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_touch)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!(target: "cache", %key, "evicted least recently used entry");
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.sweep_expired();
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_touch = tick;
                self.hit_count += 1;
                counter!(crate::metrics::CACHE_HITS).increment(1);
                debug!(target: "cache", %key, "hit");
                Some(entry.value.clone())
            }
            None => {
                self.miss_count += 1;
                counter!(crate::metrics::CACHE_MISSES).increment(1);
                debug!(target: "cache", %key, "miss");
                None
            }
        }
    }

    /// Insert with the default TTL.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    /// Insert or overwrite; overwriting resets both value and expiry.
    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl_secs: f64) {
        let key = key.into();
        self.sweep_expired();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_lru();
        }
        let now = self.clock.now();
        let tick = self.next_tick();
        let ttl = if ttl_secs.is_finite() { ttl_secs.max(0.0) } else { self.default_ttl };
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
                last_touch: tick,
            },
        );
    }

    /// Insertion time of a stored entry (expired or not); does not count as a touch.
    pub fn inserted_at(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|e| e.inserted_at)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove everything and reset the hit/miss counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hit_count = 0;
        self.miss_count = 0;
        info!(target: "cache", "cache cleared");
    }

    /// Live keys starting with `prefix`.
    pub fn keys_with_prefix(&mut self, prefix: &str) -> Vec<String> {
        self.sweep_expired();
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn remove_by_prefix(&mut self, prefix: &str) -> usize {
        let keys = self.keys_with_prefix(prefix);
        for k in &keys {
            self.entries.remove(k);
        }
        info!(target: "cache", removed = keys.len(), %prefix, "removed entries by prefix");
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total = self.hit_count + self.miss_count;
        let hit_rate = if total > 0 {
            (self.hit_count as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            hit_rate,
            expired_count: self.entries.values().filter(|e| now >= e.expires_at).count(),
        }
    }
}

// ------------------------------------------------------------
// Typed layer
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum CachedItem {
    VideoInfo(Arc<VideoInfo>),
    Danmaku(Arc<Vec<CommentRecord>>),
    Analysis(Arc<Summary>),
}

/// Identifies one comment payload: same video and page fetched through two interfaces
/// (or with two date filters) are different entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DanmakuKey<'a> {
    pub video_id: &'a str,
    pub page: u32,
    pub interface: InterfaceKind,
    pub date: Option<&'a str>,
}

impl DanmakuKey<'_> {
    pub fn render(&self) -> String {
        let base = format!(
            "danmaku:{}:page{}:{}",
            self.video_id,
            self.page,
            self.interface.as_str()
        );
        match self.date {
            Some(d) => format!("{base}:{d}"),
            None => base,
        }
    }
}

pub fn analysis_key(video_id: &str, page: u32) -> String {
    format!("analysis:{video_id}:page{page}")
}

pub fn video_info_key(video_id: &str) -> String {
    format!("video_info:{video_id}")
}

pub struct DanmakuCache {
    inner: DataCache<CachedItem>,
}

impl DanmakuCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: DataCache::with_clock(settings.max_size, settings.default_ttl_secs as f64, clock),
        }
    }

    pub fn store(&mut self) -> &mut DataCache<CachedItem> {
        &mut self.inner
    }

    pub fn set_video_info(&mut self, video_id: &str, info: VideoInfo, ttl: Option<f64>) {
        self.inner.set_with_ttl(
            video_info_key(video_id),
            CachedItem::VideoInfo(Arc::new(info)),
            ttl.unwrap_or(VIDEO_INFO_TTL_SECS),
        );
    }

    pub fn get_video_info(&mut self, video_id: &str) -> Option<Arc<VideoInfo>> {
        match self.inner.get(&video_info_key(video_id))? {
            CachedItem::VideoInfo(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_danmaku(&mut self, key: &DanmakuKey<'_>, records: Vec<CommentRecord>, ttl: Option<f64>) {
        self.inner.set_with_ttl(
            key.render(),
            CachedItem::Danmaku(Arc::new(records)),
            ttl.unwrap_or(DANMAKU_TTL_SECS),
        );
    }

    pub fn get_danmaku(&mut self, key: &DanmakuKey<'_>) -> Option<Arc<Vec<CommentRecord>>> {
        match self.inner.get(&key.render())? {
            CachedItem::Danmaku(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_analysis(&mut self, video_id: &str, page: u32, summary: Summary, ttl: Option<f64>) {
        self.inner.set_with_ttl(
            analysis_key(video_id, page),
            CachedItem::Analysis(Arc::new(summary)),
            ttl.unwrap_or(ANALYSIS_TTL_SECS),
        );
    }

    pub fn get_analysis(&mut self, video_id: &str, page: u32) -> Option<Arc<Summary>> {
        match self.inner.get(&analysis_key(video_id, page))? {
            CachedItem::Analysis(v) => Some(v),
            _ => None,
        }
    }

    /// Drop everything cached for one video (info, comments, analyses).
    pub fn invalidate_video(&mut self, video_id: &str) -> usize {
        self.inner.remove(&video_info_key(video_id)) as usize
            + self.inner.remove_by_prefix(&format!("danmaku:{video_id}:"))
            + self.inner.remove_by_prefix(&format!("analysis:{video_id}:"))
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max: usize) -> (DataCache<i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000.0));
        (DataCache::with_clock(max, 60.0, clock.clone()), clock)
    }

    #[test]
    fn set_then_get_returns_value() {
        let (mut c, _) = cache(3);
        c.set("a", 1);
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("b"), None);
        let s = c.stats();
        assert_eq!((s.hit_count, s.miss_count), (1, 1));
        assert_eq!(s.hit_rate, 50.0);
    }

    #[test]
    fn zero_ttl_is_never_visible() {
        let (mut c, clock) = cache(3);
        c.set_with_ttl("a", 1, 0.0);
        assert_eq!(c.get("a"), None);
        c.set_with_ttl("b", 2, 0.0);
        clock.advance(0.001);
        assert_eq!(c.get("b"), None);
    }

    #[test]
    fn entries_expire_at_ttl() {
        let (mut c, clock) = cache(3);
        c.set_with_ttl("a", 1, 10.0);
        clock.advance(9.5);
        assert_eq!(c.get("a"), Some(1));
        clock.advance(0.5);
        assert_eq!(c.get("a"), None);
        assert!(c.is_empty());
    }

    #[test]
    fn evicts_least_recently_touched() {
        let (mut c, _) = cache(3);
        c.set("a", 1);
        c.set("b", 2);
        c.set("c", 3);
        assert_eq!(c.get("a"), Some(1)); // a is now most recent
        c.set("d", 4);
        assert_eq!(c.len(), 3);
        assert_eq!(c.get("b"), None, "b was least recently touched");
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.get("c"), Some(3));
        assert_eq!(c.get("d"), Some(4));
    }

    #[test]
    fn expired_entries_free_capacity_before_eviction() {
        let (mut c, clock) = cache(2);
        c.set_with_ttl("short", 1, 5.0);
        c.set_with_ttl("long", 2, 500.0);
        clock.advance(10.0);
        c.set("new", 3);
        assert_eq!(c.get("long"), Some(2));
        assert_eq!(c.get("new"), Some(3));
    }

    #[test]
    fn overwrite_resets_value_and_expiry_without_eviction() {
        let (mut c, clock) = cache(2);
        c.set_with_ttl("a", 1, 5.0);
        c.set("b", 2);
        clock.advance(4.0);
        c.set_with_ttl("a", 10, 5.0);
        assert_eq!(c.len(), 2);
        assert_eq!(c.inserted_at("a"), Some(1004.0));
        clock.advance(4.0);
        assert_eq!(c.get("a"), Some(10));
        assert_eq!(c.get("b"), Some(2));
    }

    #[test]
    fn clear_resets_counters_and_stats_count_unswept() {
        let (mut c, clock) = cache(5);
        c.set_with_ttl("a", 1, 1.0);
        c.set("b", 2);
        let _ = c.get("b");
        clock.advance(2.0);
        let s = c.stats();
        assert_eq!(s.size, 2);
        assert_eq!(s.expired_count, 1);
        c.clear();
        let s = c.stats();
        assert_eq!((s.size, s.hit_count, s.miss_count, s.hit_rate), (0, 0, 0, 0.0));
    }

    #[test]
    fn prefix_scan_and_removal() {
        let (mut c, _) = cache(10);
        c.set("danmaku:BV1:page0:xml", 1);
        c.set("danmaku:BV1:page0:protobuf", 2);
        c.set("danmaku:BV2:page0:xml", 3);
        assert_eq!(c.keys_with_prefix("danmaku:BV1:").len(), 2);
        assert_eq!(c.remove_by_prefix("danmaku:BV1:"), 2);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn typed_keys_keep_interfaces_apart() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut c = DanmakuCache::with_clock(&CacheSettings::default(), clock.clone());
        let xml = DanmakuKey {
            video_id: "BV1xx411c7mD",
            page: 0,
            interface: InterfaceKind::Xml,
            date: None,
        };
        let pb = DanmakuKey {
            interface: InterfaceKind::Protobuf,
            ..xml.clone()
        };
        assert_eq!(xml.render(), "danmaku:BV1xx411c7mD:page0:xml");
        assert_ne!(xml.render(), pb.render());

        c.set_danmaku(&xml, vec![CommentRecord::new("x", 1.0)], None);
        assert!(c.get_danmaku(&pb).is_none());
        assert_eq!(c.get_danmaku(&xml).unwrap().len(), 1);

        // comment payloads default to 30 minutes
        clock.advance(DANMAKU_TTL_SECS);
        assert!(c.get_danmaku(&xml).is_none());
    }

    #[test]
    fn typed_analysis_and_invalidation() {
        let mut c = DanmakuCache::new(&CacheSettings::default());
        c.set_analysis("BV1", 0, Summary::no_data(), None);
        c.set_video_info("BV1", VideoInfo::default(), None);
        assert_eq!(c.get_analysis("BV1", 0).unwrap().error(), Some("no data"));
        assert!(c.get_analysis("BV1", 1).is_none());
        assert_eq!(c.invalidate_video("BV1"), 2);
        assert!(c.get_video_info("BV1").is_none());
    }
}
