// src/lib.rs
// Public library surface for the server binary and integration tests.

pub mod error;
pub mod config;
pub mod record;

// Core analytics
pub mod window;
pub mod text;
pub mod summary;
pub mod cache;
pub mod validator;

// Fetching and enrichment
pub mod http;
pub mod fetcher;
pub mod ai;
pub mod viz;

pub mod pipeline;
pub mod metrics;
pub mod api;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{AnalyzerError, Result};
pub use crate::pipeline::{AnalyzeRequest, Pipeline};
pub use crate::summary::{assemble, Summary};
