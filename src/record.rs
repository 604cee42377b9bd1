//! Comment records as produced by the fetcher, plus time parsing/formatting helpers.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// One timestamped viewer comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub text: String,
    /// Seconds from video start. Deserializes leniently: numbers, numeric or clock strings;
    /// anything else (null, garbage, missing) becomes 0.0.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub timestamp: f64,
    /// Time exactly as delivered upstream (e.g. `"0:01:23.45"` or `"83.45"`).
    #[serde(default)]
    pub raw_time: String,
}

impl CommentRecord {
    pub fn new(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            text: text.into(),
            timestamp,
            raw_time: format_clock(timestamp),
        }
    }

    /// Build a record from an upstream time string. A garbled time never fails the
    /// record: it is logged and mapped to 0.0.
    pub fn from_raw(text: impl Into<String>, raw_time: impl Into<String>) -> Self {
        let raw_time = raw_time.into();
        let timestamp = parse_time_to_seconds(&raw_time);
        Self {
            text: text.into(),
            timestamp,
            raw_time,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeconds {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let secs = match Option::<RawSeconds>::deserialize(d)? {
        Some(RawSeconds::Number(n)) if n.is_finite() => n,
        Some(RawSeconds::Text(t)) => parse_time_to_seconds(&t),
        _ => {
            warn!(target: "record", "missing or non-numeric timestamp, using 0.0");
            0.0
        }
    };
    Ok(secs)
}

/// Parse `H:MM:SS.ss`, `MM:SS.ss` or plain seconds. Anything else becomes 0.0.
pub fn parse_time_to_seconds(raw: &str) -> f64 {
    match try_parse_time(raw) {
        Some(v) => v,
        None => {
            warn!(target: "record", raw_time = %raw, "unparsable timestamp, using 0.0");
            0.0
        }
    }
}

fn try_parse_time(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parts: Vec<&str> = raw.split(':').collect();
    let secs = match parts.as_slice() {
        [s] => s.parse::<f64>().ok()?,
        [m, s] => m.parse::<u64>().ok()? as f64 * 60.0 + s.parse::<f64>().ok()?,
        [h, m, s] => {
            h.parse::<u64>().ok()? as f64 * 3600.0
                + m.parse::<u64>().ok()? as f64 * 60.0
                + s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    secs.is_finite().then_some(secs)
}

/// `MM:SS`, or `HH:MM:SS` once past the hour.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// `H:MM:SS.cc` clock form used for `raw_time` when only seconds are known.
pub fn format_clock(seconds: f64) -> String {
    let cs_total = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 100.0).round() as u64
    } else {
        0
    };
    let cs = cs_total % 100;
    let total = cs_total / 100;
    format!(
        "{}:{:02}:{:02}.{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        cs
    )
}

/// Human duration in Chinese units, as the dashboard shows video length.
pub fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}小时{m}分{s}秒")
    } else if m > 0 {
        format!("{m}分{s}秒")
    } else {
        format!("{s}秒")
    }
}

/// Compact counts: `1.2亿`, `3.4万`, or the plain number.
pub fn format_count(n: u64) -> String {
    if n >= 100_000_000 {
        format!("{:.1}亿", n as f64 / 100_000_000.0)
    } else if n >= 10_000 {
        format!("{:.1}万", n as f64 / 10_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_and_plain_forms() {
        assert_eq!(parse_time_to_seconds("0:01:23.50"), 83.5);
        assert_eq!(parse_time_to_seconds("1:00:00.00"), 3600.0);
        assert_eq!(parse_time_to_seconds("02:03"), 123.0);
        assert_eq!(parse_time_to_seconds("12.25"), 12.25);
    }

    #[test]
    fn garbled_time_maps_to_zero() {
        for bad in ["", "abc", "1:2:3:4", "x:10:00", "NaN", "inf"] {
            assert_eq!(parse_time_to_seconds(bad), 0.0, "input {bad:?}");
        }
        let r = CommentRecord::from_raw("hi", "??");
        assert_eq!(r.timestamp, 0.0);
        assert_eq!(r.raw_time, "??");
    }

    #[test]
    fn bad_timestamps_do_not_fail_the_batch() {
        let raw = serde_json::json!([
            { "text": "ok", "timestamp": 3.0 },
            { "text": "clock", "timestamp": "0:01:30.00" },
            { "text": "garbled", "timestamp": "0:01:xx" },
            { "text": "null", "timestamp": null },
            { "text": "object", "timestamp": { "ms": 5 } },
            { "text": "missing" }
        ]);
        let recs: Vec<CommentRecord> = serde_json::from_value(raw).unwrap();
        let ts: Vec<f64> = recs.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![3.0, 90.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(83.9), "01:23");
        assert_eq!(format_time(3723.0), "01:02:03");
        assert_eq!(format_time(-5.0), "00:00");
        assert_eq!(format_clock(83.5), "0:01:23.50");
        assert_eq!(format_duration(3725), "1小时2分5秒");
        assert_eq!(format_count(123_456), "12.3万");
        assert_eq!(format_count(999), "999");
    }
}
