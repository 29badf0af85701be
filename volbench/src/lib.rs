//! Shared types, error handling and the orchestration core of volbench.
//!
//! A run loads one volume, then drives every applicable backend through the
//! same trial discipline: one discarded warm-up invocation, `N` timed and
//! event-bracketed trials, one CSV record per trial, and one metrics series
//! per (algorithm, backend, variant).

pub mod adapters;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod events;
pub mod metrics;
pub mod nrrd;
pub mod report;
pub mod runner;

use serde::Serialize;

pub use config::{Capabilities, DatasetSource, Device, Family, HarnessConfig, NormalStrategy, VariantConfig};
pub use dataset::Dataset;
pub use driver::{run_comparison, ComparisonDriver, RunSummary};
pub use events::{EventGuard, EventHandle, EventLogger, Trace};
pub use metrics::{MetricsStore, SeriesKey, SeriesSummary};
pub use runner::{BlockOutcome, TrialRunner};

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// No adapter applies, or the command line is inconsistent.
    #[error("Config error: {0}")]
    Config(String),
    /// Dataset missing, unreadable, or degenerate after resampling.
    #[error("Data error: {0}")]
    Data(String),
    /// One backend's trial failed; isolated by the trial runner.
    #[error("{backend} backend error: {message}")]
    Backend { backend: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    pub fn backend(backend: &str, message: impl std::fmt::Display) -> Self {
        BenchError::Backend {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    /// Process exit status for an error that reached the top of a run.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Config(_) => 2,
            BenchError::Data(_) => 3,
            _ => 1,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Run environment
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub rayon_threads: usize,
    pub native_backend: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
            rayon_threads: rayon::current_num_threads(),
            native_backend: Capabilities::detect().native,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_fatal_kinds() {
        assert_eq!(BenchError::Config("none".into()).exit_code(), 2);
        assert_eq!(BenchError::Data("missing".into()).exit_code(), 3);
        assert_eq!(BenchError::backend("Native", "boom").exit_code(), 1);
    }

    #[test]
    fn backend_error_names_the_backend() {
        let e = BenchError::backend("Toolkit", "no cells");
        assert_eq!(e.to_string(), "Toolkit backend error: no cells");
    }
}
