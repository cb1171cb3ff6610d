//! Feargreed: sentiment reading model, resilient DOM query planner, and
//! bounded history store.

pub mod planner;
pub mod storage;
pub mod types;

pub use planner::{accept_mood, accept_score, Extraction, QueryPlanner, Strategy};
pub use storage::{HistoryStore, StoreLock};
pub use types::*;
