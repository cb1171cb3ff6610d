//! End-to-end pipeline tests with a scripted browser.
//!
//! Covers the persisted file shape, retention at the bound, failure
//! isolation of the data file, and the one-live-context invariant across
//! retries.

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use feargreed::{HistoryLog, HistoryStore, Reading, HISTORY_LIMIT};
use feargreed_runtime::config::Config;
use feargreed_runtime::fetcher::{FetchSettings, PageFetcher};
use feargreed_runtime::renderer::{NavigationResult, RenderContext, Renderer};
use feargreed_runtime::{
    AttemptSource, FetchError, Pipeline, PipelineError, RetryPolicy, RetrySupervisor,
};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ──

struct FixedReading(Reading);

#[async_trait]
impl AttemptSource for FixedReading {
    async fn attempt(&self) -> Result<Reading, FetchError> {
        Ok(self.0.clone())
    }
}

/// Serves one HTML page per attempt, in order; the last page repeats.
struct PagedRenderer {
    pages: Mutex<Vec<String>>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    opened: AtomicUsize,
}

impl PagedRenderer {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: Mutex::new(pages.iter().rev().map(|p| p.to_string()).collect()),
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
        }
    }
}

struct PagedContext {
    html: String,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for PagedRenderer {
    async fn open(&self) -> Result<Box<dyn RenderContext>, FetchError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_live, Ordering::SeqCst);

        let html = {
            let mut pages = self.pages.lock().unwrap();
            if pages.len() > 1 {
                pages.pop().unwrap()
            } else {
                pages.last().cloned().unwrap_or_default()
            }
        };
        Ok(Box::new(PagedContext {
            html,
            live: Arc::clone(&self.live),
        }))
    }

    fn active_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderContext for PagedContext {
    async fn navigate(
        &mut self,
        url: &str,
        _timeout_ms: u64,
    ) -> Result<NavigationResult, FetchError> {
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 3,
        })
    }
    async fn wait_for(&self, _condition: &str, _timeout_ms: u64) -> Result<bool, FetchError> {
        Ok(true)
    }
    async fn html(&self) -> Result<String, FetchError> {
        Ok(self.html.clone())
    }
    async fn screenshot(&self, _path: &Path) -> Result<(), FetchError> {
        Ok(())
    }
    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Helpers ──

fn reading(score: &str, mood: Option<&str>, timestamp: &str) -> Reading {
    Reading {
        score: score.to_string(),
        mood: mood.map(String::from),
        timestamp: timestamp.to_string(),
    }
}

fn no_wait() -> RetrySupervisor {
    RetrySupervisor::new(RetryPolicy::new(4, Duration::ZERO))
}

fn settings(dir: &TempDir) -> FetchSettings {
    let mut config = Config::default();
    config.screenshot_path = dir.path().join("debug-screenshot.png");
    FetchSettings::from(&config)
}

// ── Scenarios ──

#[tokio::test]
async fn test_first_reading_into_empty_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("public").join("data.json");
    let r = reading("62", Some("greed"), "2024-01-01T00:00:00Z");

    let pipeline = Pipeline::new(HistoryStore::new(&path), FixedReading(r), no_wait());
    pipeline.run().await.unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let expected = json!({
        "current": {"score": "62", "mood": "greed", "timestamp": "2024-01-01T00:00:00Z"},
        "history": [
            {"score": "62", "mood": "greed", "timestamp": "2024-01-01T00:00:00Z"}
        ]
    });
    assert_json_eq!(written, expected);
}

#[tokio::test]
async fn test_full_log_drops_oldest() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("data.json"));

    let mut full = HistoryLog::empty();
    for day in 1..=HISTORY_LIMIT {
        full.append(reading(
            &day.to_string(),
            Some("neutral"),
            &format!("2024-01-{day:02}T00:00:00Z"),
        ));
    }
    store.save(&full).unwrap();
    let old_second = full.history[1].clone();

    let newest = reading("80", Some("extreme greed"), "2024-02-01T00:00:00Z");
    let pipeline = Pipeline::new(store.clone(), FixedReading(newest.clone()), no_wait());
    let report = pipeline.run().await.unwrap();

    let on_disk = store.load();
    assert_eq!(on_disk, report.log);
    assert_eq!(on_disk.len(), HISTORY_LIMIT);
    assert_eq!(on_disk.history[0], old_second);
    assert_eq!(on_disk.current, Some(newest.clone()));
    assert_eq!(on_disk.history.last(), Some(&newest));
}

#[tokio::test]
async fn test_retries_until_page_renders_gauge() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(PagedRenderer::new(&[
        "<html><body><h1>Checking your browser</h1></body></html>",
        "<html><body><p>Loading</p></body></html>",
        r#"<html><body>
             <div class="market-fng-gauge">
               <div class="market-fng-gauge__dial-number-value">47</div>
               <div class="market-fng-gauge__label">Neutral</div>
             </div>
           </body></html>"#,
    ]));
    let fetcher = PageFetcher::new(renderer.clone(), settings(&dir));
    let store = HistoryStore::new(dir.path().join("data.json"));
    let pipeline = Pipeline::new(store.clone(), fetcher, no_wait());

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 3);
    assert_eq!(renderer.peak.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.active_contexts(), 0);
    assert_eq!(report.reading.score, "47");
    assert_eq!(report.reading.mood.as_deref(), Some("neutral"));
    assert!(report.reading.is_valid());
    assert_eq!(store.load().current, Some(report.reading));
}

#[tokio::test]
async fn test_exhausted_run_leaves_existing_log_intact() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::new(dir.path().join("data.json"));
    let mut log = HistoryLog::empty();
    log.append(reading("33", Some("fear"), "2024-01-01T00:00:00Z"));
    store.save(&log).unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let renderer = Arc::new(PagedRenderer::new(&["<html><body>blocked</body></html>"]));
    let fetcher = PageFetcher::new(renderer.clone(), settings(&dir));
    let pipeline = Pipeline::new(store.clone(), fetcher, no_wait());

    let err = pipeline.run().await.unwrap_err();
    match err {
        PipelineError::Fetch(FetchError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, FetchError::NoScoreFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 4);
    assert_eq!(renderer.active_contexts(), 0);
    assert_eq!(std::fs::read(store.path()).unwrap(), before);
}
