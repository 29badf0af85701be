//! Backend adapters: the one seam through which the harness drives a
//! compute library.
//!
//! An adapter owns everything library-specific: how the dataset is handed
//! over, which sub-phases exist, and how they are timed. The trial runner
//! only sees [`BackendAdapter`].

mod native_adapter;
mod reference_adapter;
mod toolkit_adapter;

pub use native_adapter::NativeAdapter;
pub use reference_adapter::ReferenceAdapter;
pub use toolkit_adapter::ToolkitAdapter;

use serde::Serialize;
use std::time::{Duration, Instant};

use volbench_kernels::{HexMesh, KernelError, TriangleMesh};

use crate::config::{Family, VariantConfig};
use crate::dataset::Dataset;
use crate::events::{EventColor, EventHandle, EventLogger};
use crate::{BenchError, BenchResult};

// ────────────────────────────────────────────────────────────────────────────────
// Trial output
// ────────────────────────────────────────────────────────────────────────────────

/// Size of what one trial produced. Never validated, only logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputStats {
    pub cells: usize,
    pub points: usize,
}

impl From<&TriangleMesh> for OutputStats {
    fn from(mesh: &TriangleMesh) -> Self {
        Self {
            cells: mesh.triangle_count(),
            points: mesh.point_count(),
        }
    }
}

impl From<&HexMesh> for OutputStats {
    fn from(mesh: &HexMesh) -> Self {
        Self {
            cells: mesh.cell_count(),
            points: mesh.point_count(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrialTiming {
    pub elapsed: Duration,
    /// Separately timed sub-phases, in execution order.
    pub phases: Vec<(&'static str, Duration)>,
    pub output: OutputStats,
}

/// What the runner hands an adapter for one invocation.
pub struct TrialContext<'a> {
    pub events: &'a EventLogger,
    /// `None` for the discarded warm-up invocation.
    pub trial: Option<usize>,
}

impl<'a> TrialContext<'a> {
    pub fn warmup(events: &'a EventLogger) -> Self {
        Self { events, trial: None }
    }

    pub fn trial(events: &'a EventLogger, index: usize) -> Self {
        Self {
            events,
            trial: Some(index),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Adapter trait
// ────────────────────────────────────────────────────────────────────────────────

pub trait BackendAdapter: Send {
    /// Backend name as it appears in series keys ("Toolkit", "Native", ...).
    fn name(&self) -> &str;

    fn algorithm(&self) -> Family;

    fn variant(&self) -> &VariantConfig;

    /// Block label printed as the CSV header, e.g. `ToolkitNoResolution`.
    fn label(&self) -> String {
        match self.variant().point_resolution {
            Some(true) => format!("{}Resolution", self.name()),
            Some(false) => format!("{}NoResolution", self.name()),
            None => self.name().to_string(),
        }
    }

    /// One-time setup before the warm-up invocation. Registers phase event
    /// categories and checks the dataset can be adapted.
    fn prepare(&mut self, dataset: &Dataset, events: &EventLogger) -> BenchResult<()>;

    fn run_trial(&mut self, dataset: &Dataset, ctx: &TrialContext<'_>) -> BenchResult<TrialTiming>;
}

// ────────────────────────────────────────────────────────────────────────────────
// Phase timing
// ────────────────────────────────────────────────────────────────────────────────

/// Event categories for an adapter's sub-phases, registered once in
/// `prepare`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseHandle {
    name: &'static str,
    handle: EventHandle,
}

impl PhaseHandle {
    pub(crate) fn register(events: &EventLogger, backend: &str, name: &'static str, color: EventColor) -> Self {
        Self {
            name,
            handle: events.create_event_id(&format!("{backend} {name}"), color),
        }
    }
}

/// Brackets and times each sub-phase of one trial.
pub(crate) struct PhaseClock<'a> {
    events: &'a EventLogger,
    start: Instant,
    phases: Vec<(&'static str, Duration)>,
}

impl<'a> PhaseClock<'a> {
    pub(crate) fn start(events: &'a EventLogger) -> Self {
        Self {
            events,
            start: Instant::now(),
            phases: Vec::new(),
        }
    }

    pub(crate) fn phase<T>(&mut self, phase: PhaseHandle, f: impl FnOnce() -> T) -> T {
        let _bracket = self.events.start(phase.handle, phase.name);
        let t = Instant::now();
        let out = f();
        self.phases.push((phase.name, t.elapsed()));
        out
    }

    pub(crate) fn finish(self, output: OutputStats) -> TrialTiming {
        TrialTiming {
            elapsed: self.start.elapsed(),
            phases: self.phases,
            output,
        }
    }
}

pub(crate) fn kernel_error(backend: &str, err: KernelError) -> BenchError {
    BenchError::backend(backend, err)
}

/// Adapters are built per block; `prepare` must have run first.
pub(crate) fn not_prepared(backend: &str) -> BenchError {
    BenchError::backend(backend, "run_trial called before prepare")
}
