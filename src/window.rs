//! # Window Aggregator
//! Buckets timestamped comments into fixed-size windows and finds bursts ("hot moments").
//!
//! A record lands in the window starting at `floor(timestamp / size) * size`. Windows are
//! always produced in ascending start order; hot moments are re-ordered by count, keeping
//! that start order for ties.
//!
//! Everything here is pure, in-memory work: O(n log w) in records/windows, no I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnalyzerError, Result};
use crate::record::CommentRecord;

/// Samples kept per window.
pub const MAX_SAMPLES: usize = 5;
/// Upper bound on returned hot moments.
pub const MAX_HOT_MOMENTS: usize = 10;

/// One fixed-size slice of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(rename = "time_start")]
    pub start: f64,
    #[serde(rename = "time_end")]
    pub end: f64,
    pub count: usize,
    /// First comments seen in this window, in input order.
    #[serde(rename = "sample_danmaku")]
    pub samples: Vec<String>,
}

/// A window whose count reached the percentile threshold of its run.
pub type HotMoment = TimeWindow;

/// One row of the time-distribution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub time_start: f64,
    pub time_end: f64,
    pub count: usize,
    /// Mean timestamp of the records in the bucket.
    pub time_avg: f64,
}

#[derive(Debug)]
struct Acc {
    window: TimeWindow,
    ts_sum: f64,
}

fn check_window_size(name: &'static str, size: f64) -> Result<()> {
    if !size.is_finite() || size <= 0.0 {
        return Err(AnalyzerError::invalid_parameter(
            name,
            format!("must be a positive number of seconds (got {size})"),
        ));
    }
    Ok(())
}

/// Effective timestamp: non-finite values are treated like a garbled time (0.0).
fn effective_ts(r: &CommentRecord) -> f64 {
    if r.timestamp.is_finite() {
        r.timestamp
    } else {
        warn!(target: "window", raw_time = %r.raw_time, "non-finite timestamp, using 0.0");
        0.0
    }
}

fn accumulate(records: &[CommentRecord], size: f64) -> BTreeMap<i64, Acc> {
    let mut buckets: BTreeMap<i64, Acc> = BTreeMap::new();
    for r in records {
        let ts = effective_ts(r);
        let idx = (ts / size).floor() as i64;
        let acc = buckets.entry(idx).or_insert_with(|| {
            let start = idx as f64 * size;
            Acc {
                window: TimeWindow {
                    start,
                    end: start + size,
                    count: 0,
                    samples: Vec::with_capacity(MAX_SAMPLES),
                },
                ts_sum: 0.0,
            }
        });
        acc.window.count += 1;
        acc.ts_sum += ts;
        if acc.window.samples.len() < MAX_SAMPLES {
            acc.window.samples.push(r.text.clone());
        }
    }
    buckets
}

/// Group records into windows of `window_size_seconds`.
///
/// Returns one entry per distinct window start, ascending. Empty input yields an empty
/// vector; a non-positive size is `InvalidParameter`.
pub fn bucket(records: &[CommentRecord], window_size_seconds: f64) -> Result<Vec<TimeWindow>> {
    check_window_size("window_size_seconds", window_size_seconds)?;
    Ok(accumulate(records, window_size_seconds)
        .into_values()
        .map(|acc| acc.window)
        .collect())
}

/// Percentile with linear interpolation between closest ranks
/// (`rank = p/100 * (n - 1)`). `None` for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn check_percentile(p: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&p) {
        return Err(AnalyzerError::invalid_parameter(
            "threshold_percentile",
            format!("must be within [0, 100] (got {p})"),
        ));
    }
    Ok(())
}

/// Burst threshold over the window counts of `records`; `None` when there are no windows.
pub fn hot_moment_threshold(
    records: &[CommentRecord],
    window_size_seconds: f64,
    threshold_percentile: f64,
) -> Result<Option<f64>> {
    check_percentile(threshold_percentile)?;
    let windows = bucket(records, window_size_seconds)?;
    let counts: Vec<f64> = windows.iter().map(|w| w.count as f64).collect();
    Ok(percentile(&counts, threshold_percentile))
}

/// Windows whose count is at least the `threshold_percentile` of all window counts,
/// busiest first (ties keep timeline order), at most [`MAX_HOT_MOMENTS`].
///
/// With a single window the threshold equals its count, so it always qualifies.
pub fn detect_hot_moments(
    records: &[CommentRecord],
    window_size_seconds: f64,
    threshold_percentile: f64,
) -> Result<Vec<HotMoment>> {
    check_percentile(threshold_percentile)?;
    let windows = bucket(records, window_size_seconds)?;
    let counts: Vec<f64> = windows.iter().map(|w| w.count as f64).collect();
    let Some(threshold) = percentile(&counts, threshold_percentile) else {
        return Ok(Vec::new());
    };

    let mut hot: Vec<HotMoment> = windows
        .into_iter()
        .filter(|w| w.count as f64 >= threshold)
        .collect();
    // stable: equal counts stay in start order
    hot.sort_by(|a, b| b.count.cmp(&a.count));
    hot.truncate(MAX_HOT_MOMENTS);

    debug!(
        target: "window",
        windows = counts.len(),
        threshold,
        hot = hot.len(),
        "hot moments detected"
    );
    Ok(hot)
}

/// Per-bucket counts and mean timestamps, ascending by start.
pub fn distribution_table(
    records: &[CommentRecord],
    interval_seconds: f64,
) -> Result<Vec<DistributionRow>> {
    check_window_size("interval_seconds", interval_seconds)?;
    Ok(accumulate(records, interval_seconds)
        .into_values()
        .map(|acc| DistributionRow {
            time_start: acc.window.start,
            time_end: acc.window.end,
            count: acc.window.count,
            time_avg: acc.ts_sum / acc.window.count as f64,
        })
        .collect())
}
