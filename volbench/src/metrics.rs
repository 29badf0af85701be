//! Append-only store of per-trial timing series.
//!
//! One series per [`SeriesKey`]; the driver owns the store and lends it to the
//! trial runner by reference. Summaries go through an HDR histogram so the
//! percentiles match what the latency reports of the other bench tools show.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Family;

/// Phase name of the aggregate per-trial time.
pub const TOTAL_PHASE: &str = "total";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SeriesKey {
    pub algorithm: String,
    pub backend: String,
    pub variant: String,
    pub phase: String,
}

impl SeriesKey {
    pub fn total(family: Family, backend: &str, variant: &str) -> Self {
        Self {
            algorithm: family.as_str().to_string(),
            backend: backend.to_string(),
            variant: variant.to_string(),
            phase: TOTAL_PHASE.to_string(),
        }
    }

    /// Same series coordinates, narrowed to one staged sub-phase.
    pub fn phase(&self, phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            ..self.clone()
        }
    }

    pub fn is_total(&self) -> bool {
        self.phase == TOTAL_PHASE
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.algorithm, self.backend, self.variant)?;
        if !self.is_total() {
            write!(f, "/{}", self.phase)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Summary
// ────────────────────────────────────────────────────────────────────────────────

/// Statistics over one series, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p99: f64,
}

impl SeriesSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                p50: 0.0,
                p99: 0.0,
            };
        }

        // 1µs .. 1h, 3 significant digits
        let mut hist = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)
            .expect("Failed to create histogram");
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &secs in samples {
            min = min.min(secs);
            max = max.max(secs);
            sum += secs;
            let micros = (secs * 1e6).round().max(1.0) as u64;
            hist.saturating_record(micros);
        }

        Self {
            count: samples.len(),
            mean: sum / samples.len() as f64,
            min,
            max,
            p50: hist.value_at_quantile(0.50) as f64 / 1e6,
            p99: hist.value_at_quantile(0.99) as f64 / 1e6,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Store
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MetricsStore {
    series: Mutex<BTreeMap<SeriesKey, Vec<f64>>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: SeriesKey, secs: f64) {
        self.series.lock().entry(key).or_default().push(secs);
    }

    /// Samples of one series in insertion order; empty when never recorded.
    pub fn series(&self, key: &SeriesKey) -> Vec<f64> {
        self.series.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        self.series.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.series.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.lock().is_empty()
    }

    /// Total number of samples across all series.
    pub fn sample_count(&self) -> usize {
        self.series.lock().values().map(Vec::len).sum()
    }

    pub fn summaries(&self) -> Vec<(SeriesKey, SeriesSummary)> {
        self.series
            .lock()
            .iter()
            .map(|(key, samples)| (key.clone(), SeriesSummary::from_samples(samples)))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<SeriesKey, Vec<f64>> {
        self.series.lock().clone()
    }
}
