//! `feargreed show`: print the stored history.

use std::path::Path;

use anyhow::Result;
use feargreed::{HistoryLog, HistoryStore};

pub async fn run(data_path: &Path, json: bool) -> Result<()> {
    let log = HistoryStore::new(data_path).load();

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        print!("{}", summary(&log));
    }
    Ok(())
}

/// Human-readable rendering of a log.
pub fn summary(log: &HistoryLog) -> String {
    let mut out = String::new();
    match &log.current {
        Some(r) => out.push_str(&format!(
            "Current: {} ({}) at {}\n",
            r.score,
            r.mood.as_deref().unwrap_or("no mood"),
            r.timestamp
        )),
        None => out.push_str("Current: none\n"),
    }
    out.push_str(&format!("History: {} entries\n", log.len()));
    for r in log.history.iter().rev().take(5) {
        out.push_str(&format!(
            "  {}  {:>3}  {}\n",
            r.timestamp,
            r.score,
            r.mood.as_deref().unwrap_or("-")
        ));
    }
    out
}
