//! Run configuration: CLI flag > environment variable > built-in default.

use std::path::PathBuf;
use std::time::Duration;

/// Page the gauge is scraped from.
pub const DEFAULT_URL: &str = "https://edition.cnn.com/markets/fear-and-greed";

/// Desktop Chrome identity presented to the source site.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/122.0.0.0 Safari/537.36";

/// Headers sent alongside every request.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("Accept-Language", "en-US,en;q=0.9"),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Encoding", "gzip, deflate, br"),
];

/// Browser identity: user agent, viewport and extra headers.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub headers: Vec<(String, String)>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: (1920, 1080),
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Static configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub data_path: PathBuf,
    pub screenshot_path: PathBuf,
    pub navigation_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub gauge_timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub identity: Identity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_URL.to_string(),
            data_path: PathBuf::from("public").join("data.json"),
            screenshot_path: PathBuf::from("debug-screenshot.png"),
            navigation_timeout_ms: 60_000,
            ready_timeout_ms: 5_000,
            gauge_timeout_ms: 10_000,
            max_attempts: 4,
            base_delay_ms: 5_000,
            identity: Identity::default(),
        }
    }
}

/// Values given on the command line; `None` means "not passed".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub data: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

impl Config {
    /// Resolve every field from flags, then `FEARGREED_*` variables, then
    /// defaults.
    pub fn resolve(overrides: &Overrides) -> Self {
        let d = Self::default();
        let mut identity = d.identity;
        if let Some(ua) = read_env_string("FEARGREED_USER_AGENT").filter(|s| !s.is_empty()) {
            identity.user_agent = ua;
        }

        Self {
            target_url: overrides
                .url
                .clone()
                .or_else(|| read_env_string("FEARGREED_URL").filter(|s| !s.is_empty()))
                .unwrap_or(d.target_url),
            data_path: overrides
                .data
                .clone()
                .or_else(|| read_env_path("FEARGREED_DATA"))
                .unwrap_or(d.data_path),
            screenshot_path: overrides
                .screenshot
                .clone()
                .or_else(|| read_env_path("FEARGREED_SCREENSHOT"))
                .unwrap_or(d.screenshot_path),
            navigation_timeout_ms: read_env_u64("FEARGREED_NAV_TIMEOUT_MS", d.navigation_timeout_ms),
            ready_timeout_ms: read_env_u64("FEARGREED_READY_TIMEOUT_MS", d.ready_timeout_ms),
            gauge_timeout_ms: read_env_u64("FEARGREED_GAUGE_TIMEOUT_MS", d.gauge_timeout_ms),
            max_attempts: read_env_u32("FEARGREED_MAX_ATTEMPTS", d.max_attempts).max(1),
            base_delay_ms: read_env_u64("FEARGREED_BASE_DELAY_MS", d.base_delay_ms),
            identity,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

fn read_env_path(name: &str) -> Option<PathBuf> {
    read_env_string(name)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}
