// src/viz.rs
//! Chart-ready series derived from a [`SummaryReport`].
//!
//! The server does not render images; it ships plain series that any front-end chart
//! library can draw. Every chart carries a title, and an empty chart carries a `note`
//! instead of points.

use serde::{Deserialize, Serialize};

use crate::record::format_time;
use crate::summary::SummaryReport;

pub const KEYWORD_BARS: usize = 15;
const BUBBLE_MIN: f64 = 10.0;
const BUBBLE_SPAN: f64 = 50.0;
const LABEL_SAMPLE_CHARS: usize = 50;

/* -------------------------------------------------------------------------- */
/* Shapes                                                                     */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudWord {
    pub text: String,
    /// Count relative to the most frequent word, in `(0, 1]`.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart<T> {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl<T> Chart<T> {
    fn new(title: &str, x_label: &str, y_label: &str, data: Vec<T>, empty_note: &str) -> Self {
        let note = data.is_empty().then(|| empty_note.to_string());
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            data,
            note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSet {
    pub sentiment: Chart<Slice>,
    pub time_distribution: Chart<Point>,
    pub keywords: Chart<Bar>,
    pub word_cloud: Chart<CloudWord>,
    pub length: Chart<Bar>,
    pub hot_moments: Chart<Bubble>,
}

/* -------------------------------------------------------------------------- */
/* Builders                                                                   */
/* -------------------------------------------------------------------------- */

/// `keyword_limit` caps both keyword charts (bars additionally stop at [`KEYWORD_BARS`]).
pub fn build_charts(report: &SummaryReport, keyword_limit: usize) -> ChartSet {
    ChartSet {
        sentiment: sentiment_chart(report),
        time_distribution: time_chart(report),
        keywords: keyword_chart(report, keyword_limit.min(KEYWORD_BARS)),
        word_cloud: cloud_chart(report, keyword_limit),
        length: length_chart(report),
        hot_moments: hot_moment_chart(report),
    }
}

fn sentiment_chart(report: &SummaryReport) -> Chart<Slice> {
    let s = &report.sentiment;
    let total = s.positive + s.negative + s.neutral;
    let data = if total > 0.0 {
        vec![
            Slice { label: "积极".into(), value: s.positive },
            Slice { label: "消极".into(), value: s.negative },
            Slice { label: "中性".into(), value: s.neutral },
        ]
    } else {
        Vec::new()
    };
    Chart::new("弹幕情感分布", "", "", data, "没有情感数据")
}

fn time_chart(report: &SummaryReport) -> Chart<Point> {
    let data = report
        .time_distribution
        .iter()
        .map(|row| Point {
            x: row.time_start,
            y: row.count as f64,
        })
        .collect();
    Chart::new("弹幕时间分布", "时间 (秒)", "弹幕数量", data, "没有时间分布数据")
}

fn keyword_chart(report: &SummaryReport, limit: usize) -> Chart<Bar> {
    let data = report
        .keywords
        .iter()
        .take(limit)
        .map(|(w, c)| Bar {
            label: w.clone(),
            value: *c as f64,
        })
        .collect();
    Chart::new("热门关键词", "关键词", "出现次数", data, "没有关键词数据")
}

fn cloud_chart(report: &SummaryReport, limit: usize) -> Chart<CloudWord> {
    let max = report.keywords.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let data = if max == 0 {
        Vec::new()
    } else {
        report
            .keywords
            .iter()
            .take(limit)
            .map(|(w, c)| CloudWord {
                text: w.clone(),
                weight: *c as f64 / max as f64,
            })
            .collect()
    };
    Chart::new("弹幕词云", "", "", data, "没有关键词数据")
}

fn length_chart(report: &SummaryReport) -> Chart<Bar> {
    let data = match &report.length_stats {
        Some(l) => vec![
            Bar { label: "平均长度".into(), value: l.mean_length },
            Bar { label: "中位数长度".into(), value: l.median_length },
            Bar { label: "最大长度".into(), value: l.max_length as f64 },
            Bar { label: "最小长度".into(), value: l.min_length as f64 },
        ],
        None => Vec::new(),
    };
    Chart::new("弹幕长度分布统计", "统计指标", "字符数", data, "没有长度统计数据")
}

fn hot_moment_chart(report: &SummaryReport) -> Chart<Bubble> {
    let max = report.hot_moments.iter().map(|m| m.count).max().unwrap_or(0);
    let data = report
        .hot_moments
        .iter()
        .map(|m| {
            let sample: String = m
                .samples
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("、")
                .chars()
                .take(LABEL_SAMPLE_CHARS)
                .collect();
            Bubble {
                x: m.start,
                y: m.count as f64,
                size: m.count as f64 / max.max(1) as f64 * BUBBLE_SPAN + BUBBLE_MIN,
                label: format!("{}: {}", format_time(m.start), sample),
            }
        })
        .collect();
    Chart::new("弹幕热点时刻", "时间 (秒)", "弹幕数量", data, "没有热点时刻数据")
}
