//! Decoder for the legacy XML comment document (`<i><d p="...">text</d>...</i>`).

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AnalyzerError, Result};
use crate::record::CommentRecord;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "d", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    /// `seconds,mode,size,color,sent_at,pool,user_hash,id,weight`
    #[serde(rename = "@p")]
    p: String,
    #[serde(rename = "$text", default)]
    text: String,
}

pub fn parse_comment_xml(xml: &str) -> Result<Vec<CommentRecord>> {
    let doc: Document =
        from_str(xml).map_err(|e| AnalyzerError::Decode(format!("comment xml: {e}")))?;
    let records: Vec<CommentRecord> = doc
        .items
        .into_iter()
        .map(|item| {
            let offset = item.p.split(',').next().unwrap_or_default();
            CommentRecord::from_raw(item.text.trim(), offset)
        })
        .collect();
    debug!(target: "fetcher", count = records.len(), "decoded xml comments");
    Ok(records)
}
