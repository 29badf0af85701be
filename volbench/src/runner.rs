//! Trial scheduling for one (backend, variant) block.

use colored::Colorize;
use std::io::Write;

use crate::adapters::{BackendAdapter, TrialContext, TrialTiming};
use crate::dataset::Dataset;
use crate::events::{EventColor, EventLogger};
use crate::metrics::{MetricsStore, SeriesKey};
use crate::report::RecordWriter;
use crate::{BenchError, BenchResult};

/// Result of one block. `error` holds the backend failure that cut the
/// block short, if any.
#[derive(Debug)]
pub struct BlockOutcome {
    pub label: String,
    pub completed: usize,
    pub error: Option<BenchError>,
}

impl BlockOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs blocks of trials against the run's shared store, logger and record
/// stream.
pub struct TrialRunner<'a, W: Write> {
    metrics: &'a MetricsStore,
    events: &'a EventLogger,
    records: &'a mut RecordWriter<W>,
}

impl<'a, W: Write> TrialRunner<'a, W> {
    pub fn new(metrics: &'a MetricsStore, events: &'a EventLogger, records: &'a mut RecordWriter<W>) -> Self {
        Self {
            metrics,
            events,
            records,
        }
    }

    /// Column header line that precedes a block's records.
    pub fn header(&mut self, label: &str) -> BenchResult<()> {
        self.records.header(label)
    }

    /// Prepare, invoke once as warm-up, then run trials `0..trial_count` in
    /// order. Unless `silent`, every completed trial becomes one metrics
    /// sample per phase and one CSV record.
    ///
    /// Backend failures end the block and are reported in the outcome; only a
    /// failure to write the record stream is returned as `Err`.
    pub fn run_trials(
        &mut self,
        adapter: &mut dyn BackendAdapter,
        dataset: &Dataset,
        trial_count: usize,
        silent: bool,
    ) -> BenchResult<BlockOutcome> {
        let label = adapter.label();
        let variant = adapter.variant().clone();
        let category = format!("{} {}", adapter.name(), variant.tag());
        let key = SeriesKey::total(adapter.algorithm(), adapter.name(), variant.tag());

        tracing::debug!(block = %label, trials = trial_count, silent, "starting block");

        if let Err(e) = adapter.prepare(dataset, self.events) {
            return Ok(self.fail(label, 0, e));
        }
        let handle = self.events.create_event_id(&category, EventColor::GREEN);

        let warmup = {
            let _bracket = self.events.start(handle, format!("{} warm-up", adapter.name()));
            adapter.run_trial(dataset, &TrialContext::warmup(self.events))
        };
        if let Err(e) = warmup {
            return Ok(self.fail(label, 0, e));
        }

        let mut completed = 0;
        for trial in 0..trial_count {
            let result = {
                let _bracket = self.events.start(
                    handle,
                    format!(
                        "{} round {}, point_resolution={}",
                        adapter.name(),
                        trial,
                        variant.resolution_flag()
                    ),
                );
                adapter.run_trial(dataset, &TrialContext::trial(self.events, trial))
            };
            let timing = match result {
                Ok(timing) => timing,
                Err(e) => return Ok(self.fail(label, completed, e)),
            };
            if !silent {
                self.record(&key, &timing);
                self.records
                    .record(&label, variant.device.name(), timing.elapsed.as_secs_f64(), trial)?;
            }
            tracing::debug!(
                block = %label,
                trial,
                secs = timing.elapsed.as_secs_f64(),
                cells = timing.output.cells,
                points = timing.output.points,
                "trial complete"
            );
            completed += 1;
        }

        Ok(BlockOutcome {
            label,
            completed,
            error: None,
        })
    }

    fn record(&self, key: &SeriesKey, timing: &TrialTiming) {
        self.metrics.record(key.clone(), timing.elapsed.as_secs_f64());
        for (phase, elapsed) in &timing.phases {
            self.metrics.record(key.phase(phase), elapsed.as_secs_f64());
        }
    }

    fn fail(&self, label: String, completed: usize, error: BenchError) -> BlockOutcome {
        tracing::warn!(block = %label, completed, error = %error, "backend failed; skipping rest of block");
        eprintln!("  {} {}: {}", "FAIL".red().bold(), label, error);
        BlockOutcome {
            label,
            completed,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Family, HarnessConfig, VariantConfig};
    use std::time::Duration;
    use volbench_kernels::Dims;

    /// Adapter that counts invocations and can fail on a given call.
    struct Scripted {
        variant: VariantConfig,
        calls: usize,
        fail_on_call: Option<usize>,
        fail_prepare: bool,
    }

    impl Scripted {
        fn new(point_resolution: Option<bool>) -> Self {
            Self {
                variant: HarnessConfig::default().variant(point_resolution),
                calls: 0,
                fail_on_call: None,
                fail_prepare: false,
            }
        }
    }

    impl BackendAdapter for Scripted {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn algorithm(&self) -> Family {
            Family::Threshold
        }

        fn variant(&self) -> &VariantConfig {
            &self.variant
        }

        fn prepare(&mut self, _dataset: &Dataset, _events: &EventLogger) -> BenchResult<()> {
            if self.fail_prepare {
                return Err(BenchError::backend("Scripted", "no device"));
            }
            Ok(())
        }

        fn run_trial(&mut self, _dataset: &Dataset, _ctx: &TrialContext<'_>) -> BenchResult<TrialTiming> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_on_call == Some(call) {
                return Err(BenchError::backend("Scripted", "kernel fault"));
            }
            Ok(TrialTiming {
                elapsed: Duration::from_millis(call as u64 + 1),
                phases: vec![("update", Duration::from_millis(1))],
                ..TrialTiming::default()
            })
        }
    }

    fn dataset() -> Dataset {
        Dataset::synthetic(Dims::new(4, 4, 4), 0)
    }

    fn lines(writer: RecordWriter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(writer.into_inner().unwrap())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn warmup_is_invoked_once_and_never_recorded() {
        let metrics = MetricsStore::new();
        let events = EventLogger::new();
        let mut records = RecordWriter::new(Vec::new());
        let mut adapter = Scripted::new(Some(true));

        let outcome = TrialRunner::new(&metrics, &events, &mut records)
            .run_trials(&mut adapter, &dataset(), 3, false)
            .unwrap();

        assert!(outcome.is_ok());
        assert_eq!(outcome.completed, 3);
        assert_eq!(adapter.calls, 4);
        let key = SeriesKey::total(Family::Threshold, "Scripted", "with-resolution");
        // the warm-up call took 1ms; recorded trials are calls 1..=3
        assert_eq!(metrics.series(&key), vec![0.002, 0.003, 0.004]);
        assert_eq!(metrics.series(&key.phase("update")).len(), 3);
        assert_eq!(
            lines(records),
            ["ScriptedResolution,Serial,0.002,0", "ScriptedResolution,Serial,0.003,1", "ScriptedResolution,Serial,0.004,2"]
        );
        assert_eq!(events.started(), 4);
        assert_eq!(events.open_events(), 0);
    }

    #[test]
    fn silent_pass_records_nothing() {
        let metrics = MetricsStore::new();
        let events = EventLogger::new();
        let mut records = RecordWriter::new(Vec::new());
        let outcome = TrialRunner::new(&metrics, &events, &mut records)
            .run_trials(&mut Scripted::new(None), &dataset(), 5, true)
            .unwrap();
        assert_eq!(outcome.completed, 5);
        assert!(metrics.is_empty());
        assert_eq!(records.records_written(), 0);
    }

    #[test]
    fn failing_trial_skips_the_rest_and_closes_its_bracket() {
        let metrics = MetricsStore::new();
        let events = EventLogger::new();
        let mut records = RecordWriter::new(Vec::new());
        let mut adapter = Scripted::new(None);
        adapter.fail_on_call = Some(2);

        let outcome = TrialRunner::new(&metrics, &events, &mut records)
            .run_trials(&mut adapter, &dataset(), 5, false)
            .unwrap();

        assert_eq!(outcome.completed, 1);
        assert!(matches!(outcome.error, Some(BenchError::Backend { .. })));
        assert_eq!(adapter.calls, 3);
        assert_eq!(records.records_written(), 1);
        assert_eq!(events.started(), events.ended());
    }

    #[test]
    fn failing_prepare_runs_nothing() {
        let metrics = MetricsStore::new();
        let events = EventLogger::new();
        let mut records = RecordWriter::new(Vec::new());
        let mut adapter = Scripted::new(None);
        adapter.fail_prepare = true;

        let outcome = TrialRunner::new(&metrics, &events, &mut records)
            .run_trials(&mut adapter, &dataset(), 5, false)
            .unwrap();

        assert_eq!(outcome.completed, 0);
        assert_eq!(adapter.calls, 0);
        assert_eq!(events.started(), 0);
    }

    #[test]
    fn zero_trials_still_warms_up() {
        let metrics = MetricsStore::new();
        let events = EventLogger::new();
        let mut records = RecordWriter::new(Vec::new());
        let mut adapter = Scripted::new(None);
        let outcome = TrialRunner::new(&metrics, &events, &mut records)
            .run_trials(&mut adapter, &dataset(), 0, false)
            .unwrap();
        assert_eq!(outcome.completed, 0);
        assert_eq!(adapter.calls, 1);
        assert!(metrics.is_empty());
    }
}
