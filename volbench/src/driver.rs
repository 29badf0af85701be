//! Comparison driver: plans the blocks for one run and executes them in a
//! fixed order.

use colored::Colorize;
use std::io::Write;

use crate::adapters::{BackendAdapter, NativeAdapter, ReferenceAdapter, ToolkitAdapter};
use crate::config::{DatasetSource, Family, HarnessConfig};
use crate::dataset::Dataset;
use crate::events::{EventLogger, LogSink, Trace};
use crate::metrics::MetricsStore;
use crate::report::{self, RecordWriter, RunReport};
use crate::runner::TrialRunner;
use crate::{BenchError, BenchResult, SystemInfo};

// ────────────────────────────────────────────────────────────────────────────────
// Plan
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    NativeStaged,
    ToolkitNoResolution,
    ToolkitResolution,
    Native,
    Reference,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::NativeStaged => "NativeStaged",
            BlockKind::ToolkitNoResolution => "ToolkitNoResolution",
            BlockKind::ToolkitResolution => "ToolkitResolution",
            BlockKind::Native => "Native",
            BlockKind::Reference => "Reference",
        }
    }

    fn backend(&self) -> &'static str {
        match self {
            BlockKind::NativeStaged => "NativeStaged",
            BlockKind::ToolkitNoResolution | BlockKind::ToolkitResolution => "Toolkit",
            BlockKind::Native => "Native",
            BlockKind::Reference => "Reference",
        }
    }

    /// Matches a `--skip` entry against the block label or its backend name.
    fn is_skipped(&self, skip: &[String]) -> bool {
        skip.iter().any(|s| {
            s.eq_ignore_ascii_case(self.label()) || s.eq_ignore_ascii_case(self.backend())
        })
    }

    fn build(&self, family: Family, config: &HarnessConfig) -> Box<dyn BackendAdapter> {
        match self {
            BlockKind::NativeStaged => Box::new(NativeAdapter::staged(config.variant(None))),
            BlockKind::ToolkitNoResolution => Box::new(ToolkitAdapter::new(family, config.variant(Some(false)))),
            BlockKind::ToolkitResolution => Box::new(ToolkitAdapter::new(family, config.variant(Some(true)))),
            BlockKind::Native => Box::new(NativeAdapter::new(family, config.variant(None))),
            BlockKind::Reference => Box::new(ReferenceAdapter::new(family, config.variant(None))),
        }
    }
}

pub struct PlannedBlock {
    pub kind: BlockKind,
    pub adapter: Box<dyn BackendAdapter>,
}

impl PlannedBlock {
    /// Wrap an arbitrary adapter, e.g. one injected by a test.
    pub fn custom(kind: BlockKind, adapter: Box<dyn BackendAdapter>) -> Self {
        Self { kind, adapter }
    }
}

/// Block kinds for `family` in execution order, before `--skip` filtering.
pub fn block_order(family: Family, config: &HarnessConfig) -> Vec<BlockKind> {
    let caps = config.capabilities;
    let mut kinds = Vec::new();
    if family == Family::MarchingCubes && caps.native_staged_normals {
        kinds.push(BlockKind::NativeStaged);
    }
    kinds.push(BlockKind::ToolkitNoResolution);
    kinds.push(BlockKind::ToolkitResolution);
    if caps.native {
        kinds.push(BlockKind::Native);
    }
    if config.device.is_serial() {
        kinds.push(BlockKind::Reference);
    }
    kinds
}

pub fn plan(family: Family, config: &HarnessConfig) -> BenchResult<Vec<PlannedBlock>> {
    let blocks: Vec<PlannedBlock> = block_order(family, config)
        .into_iter()
        .filter(|kind| {
            let skipped = kind.is_skipped(&config.skip);
            if skipped {
                tracing::info!(block = kind.label(), "skipped by request");
            }
            !skipped
        })
        .map(|kind| PlannedBlock {
            kind,
            adapter: kind.build(family, config),
        })
        .collect();

    if blocks.is_empty() {
        return Err(BenchError::Config(format!(
            "no backend applies to {} on device {}",
            family.title(),
            config.device
        )));
    }
    Ok(blocks)
}

// ────────────────────────────────────────────────────────────────────────────────
// Run
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct BlockSummary {
    pub label: String,
    pub completed: usize,
    pub error: Option<String>,
}

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunSummary {
    pub family: Family,
    pub blocks: Vec<BlockSummary>,
    pub records: usize,
    pub metrics: MetricsStore,
    pub trace: Trace,
}

impl RunSummary {
    pub fn failed_blocks(&self) -> impl Iterator<Item = &BlockSummary> {
        self.blocks.iter().filter(|b| b.error.is_some())
    }
}

pub struct ComparisonDriver<W: Write> {
    config: HarnessConfig,
    records: RecordWriter<W>,
}

impl ComparisonDriver<std::io::Stdout> {
    pub fn stdout(config: HarnessConfig) -> Self {
        Self::new(config, RecordWriter::stdout())
    }
}

impl<W: Write> ComparisonDriver<W> {
    pub fn new(config: HarnessConfig, records: RecordWriter<W>) -> Self {
        Self { config, records }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn into_records(self) -> RecordWriter<W> {
        self.records
    }

    /// Load the configured dataset, plan the blocks and run them.
    pub fn run(&mut self) -> BenchResult<RunSummary> {
        self.config.validate()?;
        let metrics = MetricsStore::new();
        let events = EventLogger::new().with_sink(Box::new(LogSink));
        events.register_thread("Main");

        let dataset = Dataset::from_source(&self.config.source, self.config.resample_ratio)?;
        let family = self.config.family();
        let blocks = plan(family, &self.config)?;
        self.execute(family, &dataset, blocks, metrics, events)
    }

    /// Run an explicit plan against an already-loaded dataset.
    pub fn run_plan(&mut self, dataset: &Dataset, blocks: Vec<PlannedBlock>) -> BenchResult<RunSummary> {
        let metrics = MetricsStore::new();
        let events = EventLogger::new().with_sink(Box::new(LogSink));
        events.register_thread("Main");
        let family = self.config.family();
        self.execute(family, dataset, blocks, metrics, events)
    }

    fn execute(
        &mut self,
        family: Family,
        dataset: &Dataset,
        blocks: Vec<PlannedBlock>,
        metrics: MetricsStore,
        events: EventLogger,
    ) -> BenchResult<RunSummary> {
        let trials = self.config.trials;
        let mut summaries = Vec::with_capacity(blocks.len());
        {
            let mut runner = TrialRunner::new(&metrics, &events, &mut self.records);

            if self.config.machine_warmup {
                tracing::info!(dataset = dataset.source(), "warming up the machine");
                let mut warm = ToolkitAdapter::new(family, self.config.variant(Some(false)));
                let outcome = runner.run_trials(&mut warm, dataset, trials, true)?;
                if let Some(e) = outcome.error {
                    tracing::warn!(error = %e, "machine warm-up failed");
                }
            }

            tracing::info!(family = family.title(), blocks = blocks.len(), "benchmarking");
            for mut block in blocks {
                let label = block.adapter.label();
                runner.header(&label)?;
                let outcome = runner.run_trials(block.adapter.as_mut(), dataset, trials, false)?;
                summaries.push(BlockSummary {
                    label: outcome.label,
                    completed: outcome.completed,
                    error: outcome.error.map(|e| e.to_string()),
                });
            }
        }

        let trace = events.teardown();
        if !trace.is_balanced() {
            tracing::warn!(started = trace.started, ended = trace.ended, "unbalanced event brackets");
        }
        if let Some(path) = &self.config.trace_path {
            trace.write_chrome_json(path)?;
            tracing::info!(path = %path.display(), "trace written");
        }

        if self.config.print_summary {
            report::print_summary(&metrics, &SystemInfo::collect());
        }
        if let Some(dir) = &self.config.export_dir {
            std::fs::create_dir_all(dir)?;
            report::export_csv(&metrics, &dir.join("volbench.csv"))?;
            report::export_json(&RunReport::new(&self.config, &metrics), &dir.join("volbench.json"))?;
        }

        let failed = summaries.iter().filter(|b| b.error.is_some()).count();
        if failed > 0 {
            eprintln!(
                "  {} {} of {} blocks failed",
                "WARN".yellow().bold(),
                failed,
                summaries.len()
            );
        }

        Ok(RunSummary {
            family,
            blocks: summaries,
            records: self.records.records_written(),
            metrics,
            trace,
        })
    }
}

/// Command-line equivalent entry point: run the standard comparison on
/// `device` for the NRRD file at `dataset_path`, printing CSV to stdout.
/// Returns the process exit status.
pub fn run_comparison(device: &str, dataset_path: &str, selector: i64) -> i32 {
    let config = HarnessConfig::new(device, DatasetSource::Nrrd(dataset_path.into()), selector);
    exit_status(ComparisonDriver::stdout(config).run())
}

pub fn exit_status(result: BenchResult<RunSummary>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(error = %e, "run aborted");
            eprintln!("{} {}", "error:".red().bold(), e);
            e.exit_code()
        }
    }
}
