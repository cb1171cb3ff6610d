// Copyright 2026 Feargreed Contributors
// SPDX-License-Identifier: MIT

//! Feargreed runtime library: browser fetch, retry supervision, and the
//! pipeline driver behind the `feargreed` binary.
//!
//! This library crate exposes the modules for integration testing.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod renderer;
pub mod retry;

pub use error::{FetchError, PipelineError};
pub use fetcher::{AttemptSource, PageFetcher};
pub use pipeline::{Pipeline, RunReport};
pub use retry::{RetryPolicy, RetrySupervisor};
