//! Per-trial CSV record stream, end-of-run summary tables, CSV/JSON export.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use crate::config::HarnessConfig;
use crate::metrics::{MetricsStore, SeriesKey, SeriesSummary};
use crate::{BenchError, BenchResult, SystemInfo};

// ────────────────────────────────────────────────────────────────────────────────
// Record stream
// ────────────────────────────────────────────────────────────────────────────────

/// Writes `<Label>,Accelerator,Time,Trial` headers and one line per trial.
pub struct RecordWriter<W: Write> {
    wtr: csv::Writer<W>,
    records: usize,
}

impl RecordWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            wtr: csv::WriterBuilder::new().has_headers(false).from_writer(out),
            records: 0,
        }
    }

    pub fn header(&mut self, label: &str) -> BenchResult<()> {
        self.wtr.write_record([label, "Accelerator", "Time", "Trial"])?;
        self.wtr.flush()?;
        Ok(())
    }

    pub fn record(&mut self, label: &str, device: &str, secs: f64, trial: usize) -> BenchResult<()> {
        self.wtr
            .write_record([label, device, secs.to_string().as_str(), trial.to_string().as_str()])?;
        self.wtr.flush()?;
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> BenchResult<W> {
        self.wtr
            .into_inner()
            .map_err(|e| BenchError::Io(e.into_error()))
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

/// Print one table per algorithm with every series, then the fastest
/// backend of each algorithm.
pub fn print_summary(metrics: &MetricsStore, system: &SystemInfo) {
    let summaries = metrics.summaries();
    if summaries.is_empty() {
        println!("\n{}", "No timings recorded.".yellow());
        return;
    }

    println!("\n{}", "━━━ volbench summary ━━━".bold().cyan());
    println!(
        "  OS: {}  Arch: {}  CPUs: {}  rayon threads: {}",
        system.os, system.arch, system.cpus, system.rayon_threads
    );

    let mut by_algorithm: BTreeMap<&str, Vec<&(SeriesKey, SeriesSummary)>> = BTreeMap::new();
    for entry in &summaries {
        by_algorithm.entry(entry.0.algorithm.as_str()).or_default().push(entry);
    }

    for (algorithm, rows) in &by_algorithm {
        println!("\n{}", format!("━━━ {} ━━━", algorithm).bold().cyan());
        let best = fastest(rows.iter().copied());

        let mut table = Table::new();
        table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
        table.set_header(vec![
            "Backend", "Variant", "Phase", "Trials", "Mean (s)", "Min (s)", "Max (s)", "p50 (s)", "p99 (s)",
        ]);

        for (key, s) in rows.iter().map(|e| (&e.0, &e.1)) {
            let is_best = best.map_or(false, |b| b == key);
            let name = if is_best {
                Cell::new(format!("★ {}", key.backend)).fg(Color::Green)
            } else {
                Cell::new(&key.backend)
            };
            let mean = if is_best {
                Cell::new(format_secs(s.mean)).fg(Color::Green)
            } else {
                Cell::new(format_secs(s.mean))
            };
            table.add_row(vec![
                name,
                Cell::new(&key.variant),
                Cell::new(&key.phase),
                Cell::new(s.count),
                mean,
                Cell::new(format_secs(s.min)),
                Cell::new(format_secs(s.max)),
                Cell::new(format_secs(s.p50)),
                Cell::new(format_secs(s.p99)),
            ]);
        }
        println!("{table}");
    }

    println!("\n{}", "── Summary: Fastest by Algorithm ──".bold().yellow());
    for (algorithm, rows) in &by_algorithm {
        if let Some(key) = fastest(rows.iter().copied()) {
            println!(
                "  {} {} ({})",
                format!("{:>16}", algorithm).bold(),
                key.backend,
                key.variant.dimmed()
            );
        }
    }
}

/// Total-time series with the lowest mean.
fn fastest<'a>(rows: impl Iterator<Item = &'a (SeriesKey, SeriesSummary)>) -> Option<&'a SeriesKey> {
    rows.filter(|(key, s)| key.is_total() && s.count > 0)
        .min_by(|a, b| a.1.mean.total_cmp(&b.1.mean))
        .map(|(key, _)| key)
}

// ────────────────────────────────────────────────────────────────────────────────
// Export
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SeriesReport {
    pub key: SeriesKey,
    pub summary: SeriesSummary,
    pub samples: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub system_info: SystemInfo,
    pub config: &'a HarnessConfig,
    pub series: Vec<SeriesReport>,
}

impl<'a> RunReport<'a> {
    pub fn new(config: &'a HarnessConfig, metrics: &MetricsStore) -> Self {
        let series = metrics
            .snapshot()
            .into_iter()
            .map(|(key, samples)| SeriesReport {
                summary: SeriesSummary::from_samples(&samples),
                key,
                samples,
            })
            .collect();
        Self {
            system_info: SystemInfo::collect(),
            config,
            series,
        }
    }
}

pub fn export_csv(metrics: &MetricsStore, path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "algorithm",
        "backend",
        "variant",
        "phase",
        "count",
        "mean_secs",
        "min_secs",
        "max_secs",
        "p50_secs",
        "p99_secs",
    ])?;

    for (key, s) in metrics.summaries() {
        wtr.write_record([
            &key.algorithm,
            &key.backend,
            &key.variant,
            &key.phase,
            &s.count.to_string(),
            &format!("{:.6}", s.mean),
            &format!("{:.6}", s.min),
            &format!("{:.6}", s.max),
            &format!("{:.6}", s.p50),
            &format!("{:.6}", s.p99),
        ])?;
    }

    wtr.flush()?;
    tracing::info!(path = %path.display(), "CSV exported");
    Ok(())
}

pub fn export_json(report: &RunReport<'_>, path: &Path) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "JSON exported");
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_secs(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{:.3}", secs)
    } else {
        format!("{:.6}", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Family;

    #[test]
    fn header_and_records_are_csv_lines() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.header("ToolkitNoResolution").unwrap();
        writer.record("ToolkitNoResolution", "Serial", 0.25, 0).unwrap();
        writer.record("ToolkitNoResolution", "Serial", 0.5, 1).unwrap();
        assert_eq!(writer.records_written(), 2);
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "ToolkitNoResolution,Accelerator,Time,Trial\n\
             ToolkitNoResolution,Serial,0.25,0\n\
             ToolkitNoResolution,Serial,0.5,1\n"
        );
    }

    #[test]
    fn fastest_ignores_phase_series() {
        let total = SeriesKey::total(Family::Threshold, "Native", "default");
        let slow = SeriesKey::total(Family::Threshold, "Reference", "default");
        let phase = total.phase("update");
        let rows = vec![
            (slow, SeriesSummary::from_samples(&[2.0])),
            (phase, SeriesSummary::from_samples(&[0.1])),
            (total.clone(), SeriesSummary::from_samples(&[1.0])),
        ];
        assert_eq!(fastest(rows.iter()), Some(&total));
    }

    #[test]
    fn exports_every_series() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = MetricsStore::new();
        let key = SeriesKey::total(Family::MarchingCubes, "Toolkit", "with-resolution");
        metrics.record(key.clone(), 0.5);
        metrics.record(key.phase("generate"), 0.25);

        let csv_path = dir.path().join("series.csv");
        export_csv(&metrics, &csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("marching_cubes,Toolkit,with-resolution,generate,1"));

        let config = HarnessConfig::default();
        let json_path = dir.path().join("series.json");
        export_json(&RunReport::new(&config, &metrics), &json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["series"].as_array().unwrap().len(), 2);
        assert_eq!(value["config"]["trials"], 5);
    }
}
