//! `feargreed run`: fetch one reading and append it to the history file.

use std::sync::Arc;

use anyhow::{Context, Result};
use feargreed::HistoryStore;

use crate::config::Config;
use crate::fetcher::{FetchSettings, PageFetcher};
use crate::pipeline::Pipeline;
use crate::renderer::chromium::ChromiumRenderer;
use crate::retry::{RetryPolicy, RetrySupervisor};

/// Run the pipeline once; any error maps to a non-zero exit in `main`.
pub async fn run(config: &Config, json: bool) -> Result<()> {
    let renderer = ChromiumRenderer::new(config.identity.clone())
        .context("cannot start the browser")?;
    let fetcher = PageFetcher::new(Arc::new(renderer), FetchSettings::from(config));
    let supervisor = RetrySupervisor::new(RetryPolicy::new(
        config.max_attempts,
        config.base_delay(),
    ));
    let pipeline = Pipeline::new(HistoryStore::new(&config.data_path), fetcher, supervisor);

    let report = pipeline.run().await.context("run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.reading)?);
    } else {
        println!(
            "Score {} ({}) at {} after {} attempt(s); {} entries in {}",
            report.reading.score,
            report.reading.mood.as_deref().unwrap_or("no mood"),
            report.reading.timestamp,
            report.attempts,
            report.log.len(),
            config.data_path.display(),
        );
    }
    Ok(())
}
