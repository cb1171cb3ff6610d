//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use crate::config::Identity;
use crate::error::FetchError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Interval between evaluations in [`RenderContext::wait_for`].
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. FEARGREED_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FEARGREED_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.feargreed/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".feargreed/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feargreed/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feargreed/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".feargreed/chromium/chrome-linux64/chrome"),
                home.join(".feargreed/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Counts one live context; released when dropped, whatever the exit path.
struct LiveSlot(Arc<AtomicUsize>);

impl LiveSlot {
    fn acquire(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for LiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Launches one headless Chromium process per context.
pub struct ChromiumRenderer {
    chrome_path: PathBuf,
    identity: Identity,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Locate Chromium; nothing is launched until [`Renderer::open`].
    pub fn new(identity: Identity) -> Result<Self, FetchError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            FetchError::Launch(
                "Chromium not found. Install Chrome or set FEARGREED_CHROMIUM_PATH.".into(),
            )
        })?;
        tracing::debug!(path = %chrome_path.display(), "using Chromium");
        Ok(Self {
            chrome_path,
            identity,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        let (width, height) = self.identity.viewport;
        BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-accelerated-2d-canvas")
            .arg("--disable-gpu")
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .build()
            .map_err(|e| FetchError::Launch(format!("failed to build browser config: {e}")))
    }

    async fn apply_identity(&self, page: &Page) -> Result<(), FetchError> {
        page.set_user_agent(SetUserAgentOverrideParams::new(
            self.identity.user_agent.clone(),
        ))
        .await
        .map_err(|e| FetchError::Launch(format!("failed to set user agent: {e}")))?;

        let headers: serde_json::Map<String, serde_json::Value> = self
            .identity
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(headers),
        )))
        .await
        .map_err(|e| FetchError::Launch(format!("failed to set extra headers: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self) -> Result<Box<dyn RenderContext>, FetchError> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Launch(format!("failed to launch Chromium: {e}")))?;

        // Drive the CDP connection for the lifetime of the context.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(FetchError::Launch(format!("failed to create new page: {e}")));
            }
        };

        // From here on the context owns the browser and releases it.
        let ctx = ChromiumContext {
            browser,
            page,
            handler_task,
            _slot: LiveSlot::acquire(&self.active_count),
        };
        if let Err(e) = self.apply_identity(&ctx.page).await {
            let _ = Box::new(ctx).close().await;
            return Err(e);
        }

        Ok(Box::new(ctx))
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// One Chromium process with a single page.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    _slot: LiveSlot,
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // `Browser` kills its child process on drop; the handler would
        // otherwise spin on a dead connection.
        self.handler_task.abort();
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<NavigationResult, FetchError> {
        let start = Instant::now();

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(FetchError::Navigation(e.to_string())),
            Err(_) => Err(FetchError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms,
            }),
        }
    }

    async fn wait_for(&self, condition: &str, timeout_ms: u64) -> Result<bool, FetchError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.page.evaluate(condition)).await {
                Ok(Ok(result)) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return Ok(true);
                    }
                }
                Ok(Err(e)) => tracing::debug!("condition evaluation failed, polling again: {e}"),
                Err(_) => return Ok(false),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn html(&self) -> Result<String, FetchError> {
        self.page
            .content()
            .await
            .map_err(|e| FetchError::Render(format!("failed to get HTML: {e}")))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), FetchError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Render(format!("screenshot failed: {e}")))
    }

    async fn close(mut self: Box<Self>) -> Result<(), FetchError> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed
            .map(|_| ())
            .map_err(|e| FetchError::Render(format!("browser close failed: {e}")))
    }
}
