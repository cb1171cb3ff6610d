//! Error taxonomy for fetching and running the pipeline.

use feargreed::StoreError;

/// Failure of one fetch-and-extract attempt, or of the whole retry loop.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The browser could not be started (missing binary, bad config).
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("{url} not ready within {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Reading the rendered page back out of the browser failed.
    #[error("render error: {0}")]
    Render(String),

    #[error("page loaded but no score found after {strategies_tried} strategies")]
    NoScoreFound { strategies_tried: usize },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// A browser that cannot launch at all will not launch on retry either.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NavigationTimeout { .. }
            | FetchError::Navigation(_)
            | FetchError::Render(_)
            | FetchError::NoScoreFound { .. } => true,
            FetchError::Launch(_) | FetchError::RetriesExhausted { .. } => false,
        }
    }

    /// Stable short code used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Launch(_) => "launch",
            FetchError::NavigationTimeout { .. } => "navigation_timeout",
            FetchError::Navigation(_) => "navigation",
            FetchError::Render(_) => "render",
            FetchError::NoScoreFound { .. } => "no_score_found",
            FetchError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Terminal failure of a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persistence failed: {0}")]
    Persist(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::NoScoreFound { strategies_tried: 3 }.is_retryable());
        assert!(FetchError::NavigationTimeout {
            url: "x".into(),
            timeout_ms: 1
        }
        .is_retryable());
        assert!(!FetchError::Launch("no chromium".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_message_carries_last_error() {
        let err = FetchError::RetriesExhausted {
            attempts: 4,
            last: Box::new(FetchError::NoScoreFound { strategies_tried: 3 }),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("no score found"));
        assert_eq!(err.kind(), "retries_exhausted");
    }
}
