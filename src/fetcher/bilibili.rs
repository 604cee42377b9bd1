use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::NetworkSettings;
use crate::error::{AnalyzerError, Result};
use crate::fetcher::segment::{decode_segment, segment_count};
use crate::fetcher::types::{DanmakuSource, InterfaceKind, PageInfo, VideoInfo};
use crate::fetcher::xml::parse_comment_xml;
use crate::http::RetryClient;
use crate::record::CommentRecord;

pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";
pub const DEFAULT_COMMENT_BASE: &str = "https://comment.bilibili.com";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    bvid: String,
    #[serde(default)]
    aid: u64,
    cid: u64,
    title: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    pubdate: i64,
    #[serde(default)]
    stat: ViewStat,
    #[serde(default)]
    pages: Vec<PageInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ViewStat {
    #[serde(default)]
    view: u64,
    #[serde(default)]
    danmaku: u64,
    #[serde(default)]
    like: u64,
    #[serde(default)]
    coin: u64,
    #[serde(default)]
    favorite: u64,
    #[serde(default)]
    share: u64,
}

impl From<ViewData> for VideoInfo {
    fn from(v: ViewData) -> Self {
        VideoInfo {
            bvid: v.bvid,
            aid: v.aid,
            cid: v.cid,
            title: v.title,
            desc: v.desc,
            duration: v.duration,
            view: v.stat.view,
            danmaku: v.stat.danmaku,
            like: v.stat.like,
            coin: v.stat.coin,
            favorite: v.stat.favorite,
            share: v.stat.share,
            pubdate: v.pubdate,
            pages: v.pages,
        }
    }
}

/// Query parameter identifying a video: `aid` for `av123`, `bvid` otherwise.
fn id_param(video_id: &str) -> (&'static str, String) {
    match video_id.strip_prefix("av") {
        Some(num) if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) => {
            ("aid", num.to_string())
        }
        _ => ("bvid", video_id.to_string()),
    }
}

/// Bilibili web API client.
pub struct BilibiliClient {
    http: RetryClient,
    api_base: String,
    comment_base: String,
}

impl BilibiliClient {
    pub fn new(settings: &NetworkSettings) -> Result<Self> {
        Ok(Self::with_http(RetryClient::new(settings)?))
    }

    pub fn with_http(http: RetryClient) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            comment_base: DEFAULT_COMMENT_BASE.to_string(),
        }
    }

    /// Point both endpoints at another host (local stub servers in tests).
    pub fn with_base_urls(mut self, api_base: &str, comment_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.comment_base = comment_base.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_xml(&self, page: &PageInfo) -> Result<Vec<CommentRecord>> {
        let url = format!("{}/{}.xml", self.comment_base, page.cid);
        let body = self.http.get_text(&url, &[]).await?;
        parse_comment_xml(&body)
    }

    async fn fetch_segments(&self, page: &PageInfo) -> Result<Vec<CommentRecord>> {
        let url = format!("{}/x/v2/dm/web/seg.so", self.api_base);
        let mut out = Vec::new();
        for index in 1..=segment_count(page.duration) {
            let query = [
                ("type", "1".to_string()),
                ("oid", page.cid.to_string()),
                ("segment_index", index.to_string()),
            ];
            let bytes = self.http.get_bytes(&url, &query).await?;
            out.extend(decode_segment(&bytes)?);
        }
        Ok(out)
    }

    async fn fetch_history(&self, page: &PageInfo, date: &str) -> Result<Vec<CommentRecord>> {
        let url = format!("{}/x/v2/dm/web/history/seg.so", self.api_base);
        let query = [
            ("type", "1".to_string()),
            ("oid", page.cid.to_string()),
            ("date", date.to_string()),
        ];
        let bytes = self.http.get_bytes(&url, &query).await?;
        decode_segment(&bytes)
    }
}

#[async_trait]
impl DanmakuSource for BilibiliClient {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo> {
        let url = format!("{}/x/web-interface/view", self.api_base);
        let env: ApiEnvelope<ViewData> = self.http.get_json(&url, &[id_param(video_id)]).await?;
        if env.code != 0 {
            return Err(AnalyzerError::Upstream(format!(
                "video info code {}: {}",
                env.code, env.message
            )));
        }
        let data = env
            .data
            .ok_or_else(|| AnalyzerError::Decode("video info without data".to_string()))?;
        Ok(data.into())
    }

    async fn fetch_part(
        &self,
        _video_id: &str,
        part: &PageInfo,
        interface: InterfaceKind,
        date: Option<&str>,
    ) -> Result<Vec<CommentRecord>> {
        let result = match (interface, date) {
            (InterfaceKind::Xml, Some(_)) => Err(AnalyzerError::invalid_parameter(
                "date",
                "date filtering needs the protobuf interface",
            )),
            (InterfaceKind::Xml, None) => self.fetch_xml(part).await,
            (InterfaceKind::Protobuf, Some(d)) => self.fetch_history(part, d).await,
            (InterfaceKind::Protobuf, None) => self.fetch_segments(part).await,
        };

        match &result {
            Ok(records) => info!(
                target: "fetcher",
                cid = part.cid,
                interface = interface.as_str(),
                count = records.len(),
                "fetched comments"
            ),
            Err(e) if !e.is_validation() => {
                counter!(crate::metrics::FETCH_ERRORS).increment(1);
                warn!(target: "fetcher", cid = part.cid, error = %e, "comment fetch failed");
            }
            Err(_) => {}
        }
        result
    }

    fn name(&self) -> &'static str {
        "bilibili"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn av_ids_use_aid_param() {
        assert_eq!(id_param("av170001"), ("aid", "170001".to_string()));
        assert_eq!(id_param("BV1P24y1a7Lt"), ("bvid", "BV1P24y1a7Lt".to_string()));
        assert_eq!(id_param("avx"), ("bvid", "avx".to_string()));
    }

    #[test]
    fn view_payload_maps_into_video_info() {
        let raw = r#"{"code":0,"message":"0","data":{
            "bvid":"BV1P24y1a7Lt","aid":42,"cid":7,"title":"t","desc":"d","duration":725,
            "pubdate":1700000000,
            "stat":{"view":10,"danmaku":3,"like":2,"coin":1,"favorite":5,"share":0},
            "pages":[{"cid":7,"page":1,"part":"p1","duration":725}]}}"#;
        let env: ApiEnvelope<ViewData> = serde_json::from_str(raw).unwrap();
        let info: VideoInfo = env.data.unwrap().into();
        assert_eq!(info.cid, 7);
        assert_eq!(info.danmaku, 3);
        assert_eq!(info.pages.len(), 1);
        assert_eq!(info.page(0).unwrap().duration, 725);
        assert!(info.page(1).is_none());
    }
}
