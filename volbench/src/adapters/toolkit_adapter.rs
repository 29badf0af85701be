//! Data-parallel toolkit backend: staged rayon pipelines.

use rayon::{ThreadPool, ThreadPoolBuilder};

use volbench_kernels::staged;

use super::{kernel_error, not_prepared, BackendAdapter, OutputStats, PhaseClock, PhaseHandle, TrialContext, TrialTiming};
use crate::config::{Family, VariantConfig};
use crate::dataset::Dataset;
use crate::events::{EventColor, EventLogger};
use crate::{BenchError, BenchResult};

const NAME: &str = "Toolkit";

struct Phases {
    classify: PhaseHandle,
    generate: PhaseHandle,
    normals: PhaseHandle,
}

/// Classify, generate and (for marching cubes) normals, each its own timed
/// phase, run inside a pool sized for the requested device.
pub struct ToolkitAdapter {
    family: Family,
    variant: VariantConfig,
    pool: Option<ThreadPool>,
    phases: Option<Phases>,
}

impl ToolkitAdapter {
    pub fn new(family: Family, variant: VariantConfig) -> Self {
        Self {
            family,
            variant,
            pool: None,
            phases: None,
        }
    }

    fn resolve_points(&self) -> bool {
        self.variant.point_resolution.unwrap_or(false)
    }
}

impl BackendAdapter for ToolkitAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn algorithm(&self) -> Family {
        self.family
    }

    fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    fn prepare(&mut self, dataset: &Dataset, events: &EventLogger) -> BenchResult<()> {
        dataset
            .volume()
            .require_cells()
            .map_err(|e| kernel_error(NAME, e))?;

        let device = self.variant.device.name().to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.variant.device.worker_threads().unwrap_or(0))
            .thread_name(move |i| format!("{device}-{i}"))
            .build()
            .map_err(|e| BenchError::backend(NAME, e))?;
        tracing::debug!(
            backend = NAME,
            device = %self.variant.device,
            threads = pool.current_num_threads(),
            "toolkit pool ready"
        );

        self.pool = Some(pool);
        self.phases = Some(Phases {
            classify: PhaseHandle::register(events, NAME, "classify", EventColor::GREEN),
            generate: PhaseHandle::register(events, NAME, "generate", EventColor::BLUE),
            normals: PhaseHandle::register(events, NAME, "normals", EventColor::ORANGE),
        });
        Ok(())
    }

    fn run_trial(&mut self, dataset: &Dataset, ctx: &TrialContext<'_>) -> BenchResult<TrialTiming> {
        let (Some(pool), Some(phases)) = (&self.pool, &self.phases) else {
            return Err(not_prepared(NAME));
        };
        let resolve = self.resolve_points();
        let volume = dataset.volume();
        let mut clock = PhaseClock::start(ctx.events);

        // brackets stay on the calling thread; only the kernels run on the pool
        let output = match self.family {
            Family::MarchingCubes => {
                let iso = self.variant.iso_value;
                let class = clock
                    .phase(phases.classify, || {
                        pool.install(|| staged::classify_marching_cubes(volume, iso))
                    })
                    .map_err(|e| kernel_error(NAME, e))?;
                let mut mesh = clock.phase(phases.generate, || {
                    pool.install(|| staged::generate_marching_cubes(volume, iso, &class, resolve))
                });
                mesh.normals = clock.phase(phases.normals, || pool.install(|| staged::face_normals(&mesh)));
                OutputStats::from(&mesh)
            }
            Family::Threshold => {
                let range = self.variant.threshold;
                let class = clock
                    .phase(phases.classify, || {
                        pool.install(|| staged::classify_threshold(volume, range.lower, range.upper))
                    })
                    .map_err(|e| kernel_error(NAME, e))?;
                let mesh = clock.phase(phases.generate, || {
                    pool.install(|| staged::generate_threshold(volume, &class, resolve))
                });
                OutputStats::from(&mesh)
            }
        };

        Ok(clock.finish(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Device, HarnessConfig};
    use volbench_kernels::Dims;

    fn dataset() -> Dataset {
        Dataset::synthetic(Dims::new(16, 16, 16), 7)
    }

    #[test]
    fn marching_cubes_times_three_phases() {
        let config = HarnessConfig::default();
        let mut adapter = ToolkitAdapter::new(Family::MarchingCubes, config.variant(Some(true)));
        let events = EventLogger::new();
        let data = dataset();
        adapter.prepare(&data, &events).unwrap();
        let timing = adapter.run_trial(&data, &TrialContext::trial(&events, 0)).unwrap();
        let names: Vec<_> = timing.phases.iter().map(|p| p.0).collect();
        assert_eq!(names, ["classify", "generate", "normals"]);
        assert!(timing.output.cells > 0);
        assert_eq!(adapter.label(), "ToolkitResolution");
        assert_eq!(events.ended(), 3);
    }

    #[test]
    fn phase_events_stay_on_the_calling_thread() {
        let mut config = HarnessConfig::default();
        config.device = Device::new("GPU");
        let mut adapter = ToolkitAdapter::new(Family::MarchingCubes, config.variant(Some(false)));
        let events = EventLogger::new();
        events.register_thread("Main");
        let data = dataset();
        adapter.prepare(&data, &events).unwrap();
        let round = events.create_event_id("Toolkit without-resolution", EventColor::GREEN);
        {
            let _bracket = events.start(round, "round 0");
            adapter.run_trial(&data, &TrialContext::trial(&events, 0)).unwrap();
        }

        let trace = events.teardown();
        let placed: Vec<_> = trace
            .events
            .iter()
            .map(|e| (e.label.as_str(), e.thread.as_str(), e.depth))
            .collect();
        assert_eq!(
            placed,
            [
                ("classify", "Main", 1),
                ("generate", "Main", 1),
                ("normals", "Main", 1),
                ("round 0", "Main", 0),
            ]
        );
    }

    #[test]
    fn threshold_has_no_normal_phase() {
        let config = HarnessConfig::default();
        let mut adapter = ToolkitAdapter::new(Family::Threshold, config.variant(Some(false)));
        let events = EventLogger::new();
        let data = dataset();
        adapter.prepare(&data, &events).unwrap();
        let timing = adapter.run_trial(&data, &TrialContext::warmup(&events)).unwrap();
        assert_eq!(timing.phases.len(), 2);
        assert_eq!(adapter.label(), "ToolkitNoResolution");
    }

    #[test]
    fn resolution_shrinks_the_point_list() {
        let config = HarnessConfig::default();
        let events = EventLogger::new();
        let data = dataset();
        let mut points = Vec::new();
        for resolve in [false, true] {
            let mut adapter = ToolkitAdapter::new(Family::Threshold, config.variant(Some(resolve)));
            adapter.prepare(&data, &events).unwrap();
            let timing = adapter.run_trial(&data, &TrialContext::trial(&events, 0)).unwrap();
            points.push(timing.output.points);
        }
        assert!(points[1] < points[0]);
    }

    #[test]
    fn serial_device_uses_one_worker() {
        let mut config = HarnessConfig::default();
        config.device = Device::serial();
        let mut adapter = ToolkitAdapter::new(Family::Threshold, config.variant(Some(false)));
        adapter.prepare(&dataset(), &EventLogger::new()).unwrap();
        assert_eq!(adapter.pool.as_ref().map(|p| p.current_num_threads()), Some(1));
    }

    #[test]
    fn flat_dataset_fails_prepare() {
        let config = HarnessConfig::default();
        let mut adapter = ToolkitAdapter::new(Family::Threshold, config.variant(Some(false)));
        let flat = Dataset::synthetic(Dims::new(8, 8, 1), 1);
        let err = adapter.prepare(&flat, &EventLogger::new()).unwrap_err();
        assert!(matches!(err, BenchError::Backend { .. }));
    }

    #[test]
    fn trial_before_prepare_is_a_backend_error() {
        let config = HarnessConfig::default();
        let mut adapter = ToolkitAdapter::new(Family::Threshold, config.variant(Some(false)));
        let events = EventLogger::new();
        assert!(adapter.run_trial(&dataset(), &TrialContext::warmup(&events)).is_err());
    }
}
