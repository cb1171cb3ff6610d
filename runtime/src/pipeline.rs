//! Pipeline driver: one end-to-end run: fetch under supervision, then
//! commit the reading to the history store.

use feargreed::{HistoryLog, HistoryStore, Reading};

use crate::error::PipelineError;
use crate::fetcher::AttemptSource;
use crate::retry::RetrySupervisor;

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub reading: Reading,
    pub attempts: u32,
    /// Log as written to disk.
    pub log: HistoryLog,
}

/// Composes the store, an attempt source and the retry supervisor.
pub struct Pipeline<S> {
    store: HistoryStore,
    source: S,
    supervisor: RetrySupervisor,
}

impl<S: AttemptSource> Pipeline<S> {
    pub fn new(store: HistoryStore, source: S, supervisor: RetrySupervisor) -> Self {
        Self {
            store,
            source,
            supervisor,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Run once.
    ///
    /// The data file is only touched after a reading has been obtained; a
    /// failed fetch leaves it exactly as it was.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let before = self.store.load();
        tracing::info!(
            path = %self.store.path().display(),
            entries = before.len(),
            max_attempts = self.supervisor.policy().max_attempts,
            "loaded history"
        );

        let supervised = self.supervisor.run(&self.source).await?;

        // Re-read under the lock; another run may have committed meanwhile.
        let log = self.store.commit(supervised.reading.clone())?;
        tracing::info!(
            score = %supervised.reading.score,
            attempts = supervised.attempts,
            entries = log.len(),
            "history updated"
        );

        Ok(RunReport {
            reading: supervised.reading,
            attempts: supervised.attempts,
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixed(Option<Reading>);

    #[async_trait]
    impl AttemptSource for Fixed {
        async fn attempt(&self) -> Result<Reading, FetchError> {
            self.0
                .clone()
                .ok_or(FetchError::NoScoreFound { strategies_tried: 3 })
        }
    }

    fn fast() -> RetrySupervisor {
        RetrySupervisor::new(RetryPolicy::new(4, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "not json at all").unwrap();

        let pipeline = Pipeline::new(HistoryStore::new(&path), Fixed(None), fast());
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Fetch(FetchError::RetriesExhausted { attempts: 4, .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");
    }

    #[tokio::test]
    async fn test_successful_run_writes_log() {
        let dir = TempDir::new().unwrap();
        let reading = Reading::new(
            25,
            Some("extreme fear".into()),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        let pipeline = Pipeline::new(
            HistoryStore::new(dir.path().join("data.json")),
            Fixed(Some(reading.clone())),
            fast(),
        );
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.log.current, Some(reading.clone()));
        assert_eq!(pipeline.store().load().history, vec![reading]);
    }
}
