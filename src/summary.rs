//! # Summary Assembler
//! Builds the per-video report from raw comment records.
//!
//! Output shape is fixed: `basic_stats, keywords, sentiment, length_stats,
//! time_distribution, hot_moments`. An empty record set yields exactly
//! `{"error": "no data"}` so front ends can render an empty state instead of failing.
//!
//! Hot moments always use a 30 s window and the 90th percentile; the caller's interval only
//! drives `time_distribution`. The two views are intentionally at different granularities.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::CommentRecord;
use crate::text::{KeywordExtractor, SentimentClassifier, SentimentRatio};
use crate::window::{detect_hot_moments, distribution_table, DistributionRow, HotMoment};

pub const NO_DATA: &str = "no data";
pub const TOP_KEYWORDS: usize = 20;
pub const HOT_WINDOW_SECONDS: f64 = 30.0;
pub const HOT_PERCENTILE: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub total_count: usize,
    pub unique_count: usize,
    pub duplicate_rate: f64,
}

/// Character-length statistics over non-empty comment texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub mean_length: f64,
    pub median_length: f64,
    pub max_length: usize,
    pub min_length: usize,
    /// Population standard deviation.
    pub std_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub basic_stats: BasicStats,
    pub keywords: Vec<(String, usize)>,
    pub sentiment: SentimentRatio,
    /// `{}` when there is no non-empty text.
    #[serde(with = "empty_map_if_none")]
    pub length_stats: Option<LengthStats>,
    pub time_distribution: Vec<DistributionRow>,
    pub hot_moments: Vec<HotMoment>,
}

/// Either a full report or the `{"error": ...}` marker. Callers check for the error first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Report(Box<SummaryReport>),
    Empty { error: String },
}

impl Summary {
    pub fn no_data() -> Self {
        Summary::Empty {
            error: NO_DATA.to_string(),
        }
    }

    pub fn report(&self) -> Option<&SummaryReport> {
        match self {
            Summary::Report(r) => Some(r),
            Summary::Empty { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Summary::Report(_) => None,
            Summary::Empty { error } => Some(error),
        }
    }
}

/// Assemble a report. Errors only on an invalid `time_interval_seconds`.
pub fn assemble(
    records: &[CommentRecord],
    time_interval_seconds: f64,
    keywords: &dyn KeywordExtractor,
    sentiment: &dyn SentimentClassifier,
) -> Result<Summary> {
    if records.is_empty() {
        return Ok(Summary::no_data());
    }

    let texts: Vec<&str> = records
        .iter()
        .map(|r| r.text.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    let total_count = records.len();
    let unique_count = texts.iter().collect::<HashSet<_>>().len();
    let basic_stats = BasicStats {
        total_count,
        unique_count,
        duplicate_rate: 1.0 - unique_count as f64 / total_count as f64,
    };

    let time_distribution = distribution_table(records, time_interval_seconds)?;
    let hot_moments = detect_hot_moments(records, HOT_WINDOW_SECONDS, HOT_PERCENTILE)?;

    Ok(Summary::Report(Box::new(SummaryReport {
        basic_stats,
        keywords: keywords.extract(&texts, TOP_KEYWORDS),
        sentiment: sentiment.classify(&texts),
        length_stats: length_stats(&texts),
        time_distribution,
        hot_moments,
    })))
}

pub fn length_stats(texts: &[&str]) -> Option<LengthStats> {
    let mut lengths: Vec<usize> = texts
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().count())
        .collect();
    if lengths.is_empty() {
        return None;
    }
    lengths.sort_unstable();
    let n = lengths.len();
    let mean = lengths.iter().sum::<usize>() as f64 / n as f64;
    let median = if n % 2 == 1 {
        lengths[n / 2] as f64
    } else {
        (lengths[n / 2 - 1] + lengths[n / 2]) as f64 / 2.0
    };
    let var = lengths
        .iter()
        .map(|&l| (l as f64 - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    Some(LengthStats {
        mean_length: mean,
        median_length: median,
        max_length: lengths[n - 1],
        min_length: lengths[0],
        std_length: var.sqrt(),
    })
}

mod empty_map_if_none {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::LengthStats;

    pub fn serialize<S: Serializer>(v: &Option<LengthStats>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(stats) => stats.serialize(s),
            None => s.serialize_map(Some(0))?.end(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Full(LengthStats),
        Empty {},
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LengthStats>, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Full(s) => Some(s),
            Repr::Empty {} => None,
        })
    }
}
