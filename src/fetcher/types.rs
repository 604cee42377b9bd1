// src/fetcher/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::CommentRecord;

/// Which comment endpoint a payload came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// Segmented binary endpoint; supports date-filtered history.
    #[default]
    Protobuf,
    /// Legacy single-document endpoint; capped by the platform.
    Xml,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Protobuf => "protobuf",
            InterfaceKind::Xml => "xml",
        }
    }
}

impl std::str::FromStr for InterfaceKind {
    type Err = crate::error::AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "protobuf" | "pb" => Ok(InterfaceKind::Protobuf),
            "xml" => Ok(InterfaceKind::Xml),
            other => Err(crate::error::AnalyzerError::invalid_parameter(
                "interface",
                format!("unknown interface {other:?}, expected protobuf or xml"),
            )),
        }
    }
}

/// One playable part of a (possibly multi-part) video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub cid: u64,
    pub page: u32,
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub bvid: String,
    #[serde(default)]
    pub aid: u64,
    /// cid of the first part.
    pub cid: u64,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    /// Seconds.
    pub duration: u64,
    pub view: u64,
    pub danmaku: u64,
    pub like: u64,
    pub coin: u64,
    pub favorite: u64,
    pub share: u64,
    /// Unix seconds.
    pub pubdate: i64,
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

impl VideoInfo {
    /// 0-based page lookup; falls back to the top-level cid/duration for single-part videos.
    pub fn page(&self, index: usize) -> Option<PageInfo> {
        if self.pages.is_empty() && index == 0 {
            return Some(PageInfo {
                cid: self.cid,
                page: 1,
                part: self.title.clone(),
                duration: self.duration,
            });
        }
        self.pages.get(index).cloned()
    }

    /// Like [`VideoInfo::page`], but a missing part is an `InvalidParameter("page")`.
    pub fn part(&self, index: usize) -> Result<PageInfo> {
        self.page(index).ok_or_else(|| {
            crate::error::AnalyzerError::invalid_parameter(
                "page",
                format!(
                    "video has {} part(s), page {} requested",
                    self.pages.len().max(1),
                    index + 1
                ),
            )
        })
    }
}

/// Where comment records come from. The Bilibili client is the production implementation;
/// tests plug in canned data.
#[async_trait]
pub trait DanmakuSource: Send + Sync {
    async fn video_info(&self, video_id: &str) -> Result<VideoInfo>;

    /// Comments of one resolved part. `date` (`YYYY-MM-DD`) selects historical comments and
    /// requires the protobuf interface.
    async fn fetch_part(
        &self,
        video_id: &str,
        part: &PageInfo,
        interface: InterfaceKind,
        date: Option<&str>,
    ) -> Result<Vec<CommentRecord>>;

    /// Resolve part `page` (0-based) through [`DanmakuSource::video_info`], then fetch it.
    async fn fetch(
        &self,
        video_id: &str,
        page: usize,
        interface: InterfaceKind,
        date: Option<&str>,
    ) -> Result<Vec<CommentRecord>> {
        let info = self.video_info(video_id).await?;
        let part = info.part(page)?;
        self.fetch_part(video_id, &part, interface, date).await
    }

    fn name(&self) -> &'static str;
}
