//! Boundary validation for everything a user types: numbers, video URLs / ids, pages,
//! dates and free text. All failures are typed [`AnalyzerError`] variants.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::UiSettings;
use crate::error::{AnalyzerError, Result};

pub const MAX_URL_LEN: usize = 2000;

const ALLOWED_HOSTS: &[&str] = &["bilibili.com", "www.bilibili.com", "m.bilibili.com", "b23.tv"];
const DANGEROUS_CHARS: &[char] = &['<', '>', '"', '\'', '&'];
const INJECTION_MARKERS: &[&str] = &["union select", "drop table", "<script", "javascript:"];

static RE_SHARE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2}[A-Za-z0-9]{10}$").expect("static regex"));
static RE_BVID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BV[A-Za-z0-9]{10}").expect("static regex"));
static RE_AVID: Lazy<Regex> = Lazy::new(|| Regex::new(r"av(\d+)").expect("static regex"));
static RE_EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("static regex"));
static RE_UNSAFE_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<script[^>]*>|javascript:|\bon\w+\s*=|<iframe[^>]*>|<object[^>]*>|<embed[^>]*>")
        .expect("static regex")
});

/// What a validated video input resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    /// Normalized input (trimmed).
    pub url: String,
    /// Host for URL input; `None` for a bare share code.
    pub domain: Option<String>,
    pub bvid: Option<String>,
    pub avid: Option<String>,
}

impl VideoRef {
    /// Canonical id used in cache keys and API calls: the BV id if present, else `av<n>`.
    pub fn video_id(&self) -> String {
        match (&self.bvid, &self.avid) {
            (Some(bv), _) => bv.clone(),
            (None, Some(av)) => format!("av{av}"),
            (None, None) => String::new(),
        }
    }
}

fn invalid_url(reason: impl Into<String>) -> AnalyzerError {
    AnalyzerError::InvalidUrl(reason.into())
}

/// Accept a bare 12-character share code (`BV` + 10 alphanumerics style) or a full
/// `http(s)` URL on an allow-listed host.
pub fn validate_video_input(input: &str) -> Result<VideoRef> {
    let input = input.trim();
    if input.is_empty() {
        return Err(invalid_url("input is empty"));
    }
    if input.chars().count() > MAX_URL_LEN {
        return Err(invalid_url("input is too long"));
    }
    if input.chars().any(|c| c.is_control() || DANGEROUS_CHARS.contains(&c)) {
        return Err(invalid_url("input contains illegal characters"));
    }
    let lowered = input.to_ascii_lowercase();
    if INJECTION_MARKERS.iter().any(|m| lowered.contains(m)) || RE_EVENT_HANDLER.is_match(input) {
        return Err(invalid_url("input contains unsafe content"));
    }

    if !input.contains("://") {
        if RE_SHARE_CODE.is_match(input) {
            return Ok(VideoRef {
                url: input.to_string(),
                domain: None,
                bvid: Some(input.to_string()),
                avid: None,
            });
        }
        return Err(invalid_url(format!(
            "{input:?} is neither a URL nor a 12-character video id"
        )));
    }

    let parsed = Url::parse(input).map_err(|e| invalid_url(format!("malformed url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid_url("url must start with http:// or https://"));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid_url("url has no host"))?
        .to_ascii_lowercase();
    let allowed = ALLOWED_HOSTS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")));
    if !allowed {
        return Err(invalid_url(format!("unsupported host {host}")));
    }

    let bvid = RE_BVID.find(input).map(|m| m.as_str().to_string());
    let avid = RE_AVID
        .captures(parsed.path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    if bvid.is_none() && avid.is_none() {
        return Err(AnalyzerError::NoVideoId(input.to_string()));
    }

    Ok(VideoRef {
        url: input.to_string(),
        domain: Some(host),
        bvid,
        avid,
    })
}

/// A bare id as used in cache paths: a 12-character share code or `av<digits>`.
pub fn validate_video_id(id: &str) -> Result<String> {
    let id = id.trim();
    let is_av = id
        .strip_prefix("av")
        .is_some_and(|n| !n.is_empty() && n.len() <= 20 && n.chars().all(|c| c.is_ascii_digit()));
    if is_av || RE_SHARE_CODE.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(invalid_url(format!("{id:?} is not a video id")))
    }
}

/// Coerce a JSON scalar (number or numeric string) and range-check it.
pub fn validate_number_input(
    value: &Value,
    min: Option<f64>,
    max: Option<f64>,
    field: &str,
) -> Result<f64> {
    let not_a_number = || AnalyzerError::NotANumber {
        field: field.to_string(),
        input: value.to_string(),
    };
    let num = match value {
        Value::Number(n) => n.as_f64().ok_or_else(not_a_number)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| not_a_number())?,
        _ => return Err(not_a_number()),
    };
    check_range(num, min, max, field)
}

/// Same as [`validate_number_input`] for raw text (query strings, form fields).
pub fn validate_number_str(raw: &str, min: Option<f64>, max: Option<f64>, field: &str) -> Result<f64> {
    let num = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| AnalyzerError::NotANumber {
            field: field.to_string(),
            input: raw.to_string(),
        })?;
    check_range(num, min, max, field)
}

fn check_range(num: f64, min: Option<f64>, max: Option<f64>, field: &str) -> Result<f64> {
    if num.is_nan() {
        return Err(AnalyzerError::NotANumber {
            field: field.to_string(),
            input: "NaN".to_string(),
        });
    }
    let out_of_range = || AnalyzerError::OutOfRange {
        field: field.to_string(),
        value: num,
        min: min.unwrap_or(f64::NEG_INFINITY),
        max: max.unwrap_or(f64::INFINITY),
    };
    if min.is_some_and(|m| num < m) || max.is_some_and(|m| num > m) {
        return Err(out_of_range());
    }
    Ok(num)
}

fn require_integer(num: f64, field: &str) -> Result<u32> {
    if num.fract() != 0.0 {
        return Err(AnalyzerError::NotANumber {
            field: field.to_string(),
            input: num.to_string(),
        });
    }
    Ok(num as u32)
}

/// 1-based page number as shown to users.
pub fn validate_page_number(value: &Value, max_page: u32) -> Result<u32> {
    let n = validate_number_input(value, Some(1.0), Some(max_page as f64), "page")?;
    require_integer(n, "page")
}

/// Time interval (seconds) and keyword count, both bounded by the UI settings.
pub fn validate_analysis_parameters(
    time_interval: &Value,
    keyword_count: &Value,
    ui: &UiSettings,
) -> Result<(u32, u32)> {
    let interval = validate_number_input(
        time_interval,
        Some(ui.time_interval_min as f64),
        Some(ui.time_interval_max as f64),
        "time_interval",
    )?;
    let keywords = validate_number_input(
        keyword_count,
        Some(ui.keyword_count_min as f64),
        Some(ui.keyword_count_max as f64),
        "keyword_count",
    )?;
    Ok((
        require_integer(interval, "time_interval")?,
        require_integer(keywords, "keyword_count")?,
    ))
}

/// `YYYY-MM-DD` that is also a real calendar date. `None`/blank passes through.
pub fn validate_date_input(input: Option<&str>) -> Result<Option<NaiveDate>> {
    static RE_DATE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if !RE_DATE.is_match(raw) {
        return Err(AnalyzerError::InvalidDate(format!(
            "{raw:?} must be formatted as YYYY-MM-DD"
        )));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AnalyzerError::InvalidDate(format!("{raw:?} is not a calendar date")))
}

/// Trim, length-check (in characters) and reject markup that could run script.
pub fn validate_text_input(
    text: &str,
    min_len: Option<usize>,
    max_len: Option<usize>,
    field: &str,
) -> Result<String> {
    let text = text.trim();
    let len = text.chars().count();
    if let Some(min) = min_len.filter(|&m| len < m) {
        return Err(AnalyzerError::OutOfRange {
            field: format!("{field} length"),
            value: len as f64,
            min: min as f64,
            max: max_len.map_or(f64::INFINITY, |m| m as f64),
        });
    }
    if let Some(max) = max_len.filter(|&m| len > m) {
        return Err(AnalyzerError::OutOfRange {
            field: format!("{field} length"),
            value: len as f64,
            min: min_len.map_or(0.0, |m| m as f64),
            max: max as f64,
        });
    }
    if RE_UNSAFE_MARKUP.is_match(text) {
        return Err(AnalyzerError::UnsafeText {
            field: field.to_string(),
        });
    }
    Ok(text.to_string())
}

/// Strip paths, IPs and key material from an error message before it leaves the process.
pub fn sanitize_error_message(msg: &str) -> String {
    static RE_PATH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[A-Za-z]:[\\/][^\s]*").expect("static regex"));
    static RE_IP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("static regex"));
    static RE_KEY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)key[=:]\s*[A-Za-z0-9+/=]+").expect("static regex"));

    let out = RE_PATH.replace_all(msg, "[path hidden]");
    let out = RE_IP.replace_all(&out, "[ip hidden]");
    let out = RE_KEY.replace_all(&out, "key=[hidden]");
    if out.chars().count() > 200 {
        let mut short: String = out.chars().take(200).collect();
        short.push_str("...");
        short
    } else {
        out.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_bare_share_code() {
        let v = validate_video_input("BV1234567890").unwrap();
        assert_eq!(v.bvid.as_deref(), Some("BV1234567890"));
        assert_eq!(v.video_id(), "BV1234567890");
        assert!(v.domain.is_none());
    }

    #[test]
    fn short_code_is_invalid_url() {
        assert!(matches!(
            validate_video_input("BV12"),
            Err(AnalyzerError::InvalidUrl(_))
        ));
    }

    #[test]
    fn accepts_allow_listed_urls() {
        for url in [
            "https://www.bilibili.com/video/BV1P24y1a7Lt",
            "https://www.bilibili.com/video/BV1P24y1a7Lt?p=1",
            "https://b23.tv/BV1P24y1a7Lt",
            "http://m.bilibili.com/video/BV1P24y1a7Lt/",
        ] {
            let v = validate_video_input(url).unwrap();
            assert_eq!(v.bvid.as_deref(), Some("BV1P24y1a7Lt"), "{url}");
        }
        let av = validate_video_input("https://www.bilibili.com/video/av170001").unwrap();
        assert_eq!(av.video_id(), "av170001");
    }

    #[test]
    fn rejects_foreign_hosts_and_schemes() {
        for url in [
            "https://evil.example.com/video/BV1P24y1a7Lt",
            "https://notbilibili.com/video/BV1P24y1a7Lt",
            "ftp://www.bilibili.com/video/BV1P24y1a7Lt",
        ] {
            assert!(
                matches!(validate_video_input(url), Err(AnalyzerError::InvalidUrl(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn url_without_id_is_no_video_id() {
        assert!(matches!(
            validate_video_input("https://www.bilibili.com/anime/"),
            Err(AnalyzerError::NoVideoId(_))
        ));
    }

    #[test]
    fn rejects_dangerous_input() {
        for bad in [
            "https://www.bilibili.com/video/BV1P24y1a7Lt?a=1&b=2",
            "BV1234567890<",
            "https://www.bilibili.com/video/BV1P24y1a7Lt\n",
            "javascript:alert(1)",
            "https://www.bilibili.com/video/BV1P24y1a7Lt/union%20select union select",
            "https://www.bilibili.com/drop table/BV1P24y1a7Lt",
            "https://www.bilibili.com/video/BV1P24y1a7Lt?onload=x",
        ] {
            assert!(
                matches!(validate_video_input(bad), Err(AnalyzerError::InvalidUrl(_))),
                "{bad:?}"
            );
        }
        let long = format!("https://www.bilibili.com/video/BV1P24y1a7Lt?x={}", "a".repeat(2000));
        assert!(validate_video_input(&long).is_err());
    }

    #[test]
    fn bare_ids() {
        assert_eq!(validate_video_id("BV1234567890").unwrap(), "BV1234567890");
        assert_eq!(validate_video_id("av170001").unwrap(), "av170001");
        assert!(validate_video_id("av").is_err());
        assert!(validate_video_id("BV12").is_err());
    }

    #[test]
    fn numbers_are_coerced_and_range_checked() {
        assert_eq!(validate_number_input(&json!(42), Some(10.0), Some(100.0), "n").unwrap(), 42.0);
        assert_eq!(validate_number_input(&json!(" 12.5 "), None, None, "n").unwrap(), 12.5);
        assert!(matches!(
            validate_number_input(&json!(5), Some(10.0), None, "n"),
            Err(AnalyzerError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_number_input(&json!(500), None, Some(100.0), "n"),
            Err(AnalyzerError::OutOfRange { .. })
        ));
        for bad in [json!("abc"), json!(null), json!([1]), json!("NaN")] {
            assert!(matches!(
                validate_number_input(&bad, None, None, "n"),
                Err(AnalyzerError::NotANumber { .. })
            ));
        }
        assert!(validate_number_str("x1", None, None, "n").is_err());
    }

    #[test]
    fn pages_and_analysis_parameters() {
        assert_eq!(validate_page_number(&json!(3), 1000).unwrap(), 3);
        assert!(validate_page_number(&json!(0), 1000).is_err());
        assert!(validate_page_number(&json!(1.5), 1000).is_err());
        let ui = UiSettings::default();
        assert_eq!(
            validate_analysis_parameters(&json!(60), &json!("30"), &ui).unwrap(),
            (60, 30)
        );
        assert!(validate_analysis_parameters(&json!(5), &json!(30), &ui).is_err());
        assert!(validate_analysis_parameters(&json!(60), &json!(101), &ui).is_err());
    }

    #[test]
    fn dates_must_be_real() {
        assert_eq!(validate_date_input(None).unwrap(), None);
        assert_eq!(validate_date_input(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_date_input(Some("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(validate_date_input(Some("2023-02-29")).is_err());
        assert!(validate_date_input(Some("2024/01/01")).is_err());
    }

    #[test]
    fn text_validation() {
        assert_eq!(validate_text_input("  hi  ", Some(1), Some(10), "t").unwrap(), "hi");
        assert!(validate_text_input("", Some(1), None, "t").is_err());
        assert!(matches!(
            validate_text_input("<script>x</script>", None, None, "t"),
            Err(AnalyzerError::UnsafeText { .. })
        ));
        assert!(validate_text_input("<img onerror = x>", None, None, "t").is_err());
    }

    #[test]
    fn error_messages_are_scrubbed() {
        let msg = r"failed C:\Users\me\secret.txt from 10.0.0.1 with key=abc123";
        let out = sanitize_error_message(msg);
        assert!(!out.contains("Users"));
        assert!(!out.contains("10.0.0.1"));
        assert!(!out.contains("abc123"));
        let long = "x".repeat(300);
        assert_eq!(sanitize_error_message(&long).chars().count(), 203);
    }
}
