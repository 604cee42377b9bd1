// src/fetcher/mod.rs
//! Comment sources: the [`DanmakuSource`] seam, the Bilibili client and payload decoders.

pub mod bilibili;
pub mod segment;
pub mod types;
pub mod xml;

pub use bilibili::BilibiliClient;
pub use types::{DanmakuSource, InterfaceKind, PageInfo, VideoInfo};
