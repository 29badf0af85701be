//! volbench: cross-backend marching cubes / threshold benchmark
//!
//! Usage:
//!   volbench Serial brain.nrrd 1           # threshold, all four backends
//!   volbench GPU brain.nrrd 2              # marching cubes, no serial reference
//!   volbench Serial synthetic:128 2        # generated 128³ volume
//!   volbench Serial brain.nrrd 2 --skip native --export out/
//!
//! CSV records go to stdout, diagnostics to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use volbench::config::{DatasetSource, HarnessConfig, NormalStrategy, DEFAULT_RESAMPLE_RATIO};
use volbench::driver::{exit_status, ComparisonDriver};
use volbench_kernels::Dims;

const DEFAULT_SYNTHETIC_EXTENT: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "volbench", about = "Cross-backend isosurface and threshold benchmark", version)]
struct Cli {
    /// Accelerator name. "Serial" pins workers to one thread and adds the
    /// serial reference backend.
    device: String,

    /// NRRD file, or `synthetic[:N]` for a generated N³ volume.
    dataset: String,

    /// Pipeline selector: 1 or less runs threshold, anything larger marching
    /// cubes.
    #[arg(default_value = "1", allow_negative_numbers = true)]
    pipeline: i64,

    /// Timed trials per backend.
    #[arg(long, default_value = "5")]
    trials: usize,

    /// Per-axis resample ratio applied to NRRD input.
    #[arg(long, default_value_t = DEFAULT_RESAMPLE_RATIO)]
    ratio: f64,

    /// Contour value for marching cubes.
    #[arg(long, default_value = "0.07")]
    iso: f32,

    /// Lower bound of the threshold range.
    #[arg(long, default_value = "0.07")]
    threshold_lower: f32,

    /// Upper bound of the threshold range.
    #[arg(long, default_value = "1.0")]
    threshold_upper: f32,

    /// Native normal pass: native, reference or skip.
    #[arg(long, default_value = "native")]
    normals: NormalStrategy,

    /// Skip blocks or backends (comma-separated: toolkit, native, reference, ...).
    #[arg(long, value_delimiter = ',')]
    skip: Vec<String>,

    /// Export directory for CSV + JSON summaries.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Write a Chrome trace of every event bracket to this file.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Seed for synthetic volumes.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Do not run the silent machine warm-up pass.
    #[arg(long)]
    no_warmup: bool,

    /// Do not print the summary tables.
    #[arg(long)]
    no_summary: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn dataset_source(arg: &str, seed: u64) -> Result<DatasetSource, String> {
    let Some(rest) = arg.strip_prefix("synthetic") else {
        return Ok(DatasetSource::Nrrd(PathBuf::from(arg)));
    };
    let n = match rest.strip_prefix(':') {
        Some(n) => n.parse().map_err(|_| format!("bad synthetic extent '{n}'"))?,
        None if rest.is_empty() => DEFAULT_SYNTHETIC_EXTENT,
        None => return Ok(DatasetSource::Nrrd(PathBuf::from(arg))),
    };
    Ok(DatasetSource::synthetic(Dims::new(n, n, n), seed))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let source = match dataset_source(&cli.dataset, cli.seed) {
        Ok(source) => source,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(2);
        }
    };

    let config = HarnessConfig::new(cli.device, source, cli.pipeline)
        .with_trials(cli.trials)
        .with_resample_ratio(cli.ratio)
        .with_iso_value(cli.iso)
        .with_threshold(cli.threshold_lower, cli.threshold_upper)
        .with_normals(cli.normals)
        .with_skip(cli.skip)
        .with_machine_warmup(!cli.no_warmup)
        .with_summary(!cli.no_summary)
        .with_export_dir(cli.export)
        .with_trace_path(cli.trace);

    tracing::info!(
        device = %config.device,
        dataset = %config.source,
        family = config.family().title(),
        trials = config.trials,
        "volbench starting"
    );

    let code = exit_status(ComparisonDriver::stdout(config).run());
    ExitCode::from(code as u8)
}
