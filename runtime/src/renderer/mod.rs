//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). A context is
//! one isolated browser instance used for a single fetch attempt.

pub mod chromium;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open isolated rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launch a fresh, isolated browsing context.
    async fn open(&self) -> Result<Box<dyn RenderContext>, FetchError>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browsing context. Must be released with [`close`](Self::close).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL, failing with `NavigationTimeout` past `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64)
        -> Result<NavigationResult, FetchError>;
    /// Poll a JavaScript boolean expression until it holds.
    ///
    /// Returns `Ok(false)` if it never held within `timeout_ms`.
    async fn wait_for(&self, condition: &str, timeout_ms: u64) -> Result<bool, FetchError>;
    /// Serialized DOM of the rendered page.
    async fn html(&self) -> Result<String, FetchError>;
    /// Full-page screenshot written to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), FetchError>;
    /// Tear the context down.
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}
