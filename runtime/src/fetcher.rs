//! Page fetcher: render the target page in a fresh browsing context and
//! run the query planner over the result.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use feargreed::planner::GAUGE_CONTAINERS;
use feargreed::{parse_score, QueryPlanner, Reading};

use crate::config::Config;
use crate::error::FetchError;
use crate::renderer::{RenderContext, Renderer};

/// The document has finished loading.
pub const READY_CONDITION: &str = "document.readyState === 'complete'";

/// Some leaf inside a gauge container shows an integer in `0..=100`.
///
/// Scans the same leaves the planner's gauge tier reads.
pub fn gauge_condition() -> String {
    let leaves = GAUGE_CONTAINERS
        .iter()
        .map(|c| format!("{c} *"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"Array.from(document.querySelectorAll({leaves:?})).some(el => {{
    if (el.children.length > 0) return false;
    const text = (el.textContent || '').trim();
    return /^\+?\d+$/.test(text) && Number(text) <= 100;
}})"#
    )
}

/// One fetch-and-extract attempt, as seen by the retry supervisor.
#[async_trait]
pub trait AttemptSource: Send + Sync {
    async fn attempt(&self) -> Result<Reading, FetchError>;
}

/// Timeouts and paths a [`PageFetcher`] works with.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub target_url: String,
    pub navigation_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub gauge_timeout_ms: u64,
    pub screenshot_path: PathBuf,
}

impl From<&Config> for FetchSettings {
    fn from(c: &Config) -> Self {
        Self {
            target_url: c.target_url.clone(),
            navigation_timeout_ms: c.navigation_timeout_ms,
            ready_timeout_ms: c.ready_timeout_ms,
            gauge_timeout_ms: c.gauge_timeout_ms,
            screenshot_path: c.screenshot_path.clone(),
        }
    }
}

/// Renders the target page and extracts a [`Reading`] from it.
pub struct PageFetcher {
    renderer: Arc<dyn Renderer>,
    planner: QueryPlanner,
    settings: FetchSettings,
}

impl PageFetcher {
    pub fn new(renderer: Arc<dyn Renderer>, settings: FetchSettings) -> Self {
        Self {
            renderer,
            planner: QueryPlanner::default(),
            settings,
        }
    }

    /// Render, then extract.
    pub async fn fetch(&self) -> Result<Reading, FetchError> {
        let html = self.render().await?;
        self.extract(&html)
    }

    /// Open a context, render inside it, and close it whatever happened.
    async fn render(&self) -> Result<String, FetchError> {
        let mut ctx = self.renderer.open().await?;
        let rendered = self.render_in(ctx.as_mut()).await;
        if let Err(e) = ctx.close().await {
            tracing::warn!("browser context did not close cleanly: {e}");
        }
        rendered
    }

    async fn render_in(&self, ctx: &mut dyn RenderContext) -> Result<String, FetchError> {
        let s = &self.settings;

        tracing::info!(url = %s.target_url, "navigating");
        let nav = ctx.navigate(&s.target_url, s.navigation_timeout_ms).await?;
        tracing::debug!(final_url = %nav.final_url, load_time_ms = nav.load_time_ms, "navigation finished");

        // Querying before the document is complete races the page's scripts.
        if !ctx.wait_for(READY_CONDITION, s.ready_timeout_ms).await? {
            return Err(FetchError::NavigationTimeout {
                url: s.target_url.clone(),
                timeout_ms: s.ready_timeout_ms,
            });
        }

        if !ctx.wait_for(&gauge_condition(), s.gauge_timeout_ms).await? {
            tracing::warn!(
                timeout_ms = s.gauge_timeout_ms,
                "gauge value did not appear, falling back to generic strategies"
            );
        }

        match ctx.screenshot(&s.screenshot_path).await {
            Ok(()) => tracing::debug!(path = %s.screenshot_path.display(), "screenshot saved"),
            Err(e) => tracing::warn!(path = %s.screenshot_path.display(), "screenshot failed: {e}"),
        }

        ctx.html().await
    }

    /// Run the planner over rendered HTML and stamp the result.
    pub fn extract(&self, html: &str) -> Result<Reading, FetchError> {
        let extraction = self.planner.extract_html(html);
        let score = extraction
            .score
            .as_deref()
            .and_then(parse_score)
            .ok_or(FetchError::NoScoreFound {
                strategies_tried: self.planner.score_tiers(),
            })?;

        if extraction.mood.is_none() {
            tracing::warn!("no mood label found, recording score only");
        }

        let reading = Reading::new(score, extraction.mood, Utc::now());
        tracing::info!(
            score = %reading.score,
            mood = reading.mood.as_deref().unwrap_or("-"),
            mood_family = reading.mood_family().map(|f| f.as_str()).unwrap_or("-"),
            score_strategy = extraction.score_strategy.as_deref().unwrap_or("-"),
            mood_strategy = extraction.mood_strategy.as_deref().unwrap_or("-"),
            "extracted reading"
        );
        Ok(reading)
    }
}

#[async_trait]
impl AttemptSource for PageFetcher {
    async fn attempt(&self) -> Result<Reading, FetchError> {
        self.fetch().await
    }
}
