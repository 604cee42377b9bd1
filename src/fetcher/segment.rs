//! Decoder for segmented binary comment replies.
//!
//! A reply is a protobuf `DmSegMobileReply { repeated DanmakuElem elems = 1; }`. Only two
//! element fields are declared here: `progress = 2` (int32, milliseconds) and `content = 7`
//! (string). prost skips undeclared fields, so new upstream fields are harmless.

use prost::Message;
use tracing::debug;

use crate::error::{AnalyzerError, Result};
use crate::record::CommentRecord;

/// Segment length used by the segmented endpoint, in seconds.
pub const SEGMENT_SECONDS: u64 = 360;

#[derive(Clone, PartialEq, Message)]
pub struct DmSegMobileReply {
    #[prost(message, repeated, tag = "1")]
    pub elems: Vec<DanmakuElem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DanmakuElem {
    /// Offset from video start, milliseconds.
    #[prost(int32, tag = "2")]
    pub progress: i32,
    #[prost(string, tag = "7")]
    pub content: String,
}

impl From<DanmakuElem> for CommentRecord {
    fn from(e: DanmakuElem) -> Self {
        CommentRecord::new(e.content, f64::from(e.progress) / 1000.0)
    }
}

/// How many segments cover a video of `duration_secs`. Always at least one.
pub fn segment_count(duration_secs: u64) -> u64 {
    duration_secs.div_ceil(SEGMENT_SECONDS).max(1)
}

/// Decode one segment reply into records, in payload order.
pub fn decode_segment(buf: &[u8]) -> Result<Vec<CommentRecord>> {
    let reply = DmSegMobileReply::decode(buf)
        .map_err(|e| AnalyzerError::Decode(format!("comment segment: {e}")))?;
    debug!(target: "fetcher", count = reply.elems.len(), bytes = buf.len(), "decoded comment segment");
    Ok(reply.elems.into_iter().map(CommentRecord::from).collect())
}
