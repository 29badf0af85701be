//! GPU-native backend: the whole algorithm in one opaque call.

use volbench_kernels::{fused, serial};

use super::{kernel_error, not_prepared, BackendAdapter, OutputStats, PhaseClock, PhaseHandle, TrialContext, TrialTiming};
use crate::config::{Family, NormalStrategy, VariantConfig};
use crate::dataset::Dataset;
use crate::events::{EventColor, EventLogger};
use crate::{BenchError, BenchResult};

struct Phases {
    update: PhaseHandle,
    normals: PhaseHandle,
}

/// Single `update` dispatch. In its staged form, marching cubes is followed
/// by a separately timed normal pass chosen by [`NormalStrategy`].
pub struct NativeAdapter {
    family: Family,
    variant: VariantConfig,
    staged_normals: bool,
    phases: Option<Phases>,
}

impl NativeAdapter {
    pub fn new(family: Family, variant: VariantConfig) -> Self {
        Self {
            family,
            variant,
            staged_normals: false,
            phases: None,
        }
    }

    /// Marching cubes plus a separate normal pass.
    pub fn staged(variant: VariantConfig) -> Self {
        Self {
            staged_normals: true,
            ..Self::new(Family::MarchingCubes, variant)
        }
    }

    pub fn is_available() -> bool {
        cfg!(feature = "native-backend")
    }
}

impl BackendAdapter for NativeAdapter {
    fn name(&self) -> &str {
        if self.staged_normals {
            "NativeStaged"
        } else {
            "Native"
        }
    }

    fn algorithm(&self) -> Family {
        self.family
    }

    fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    fn prepare(&mut self, dataset: &Dataset, events: &EventLogger) -> BenchResult<()> {
        if !Self::is_available() {
            return Err(BenchError::backend(self.name(), "native backend not compiled in"));
        }
        dataset
            .volume()
            .require_cells()
            .map_err(|e| kernel_error(self.name(), e))?;

        let name = self.name().to_string();
        self.phases = Some(Phases {
            update: PhaseHandle::register(events, &name, "update", EventColor::BLUE),
            normals: PhaseHandle::register(events, &name, "normals", EventColor::ORANGE),
        });
        Ok(())
    }

    fn run_trial(&mut self, dataset: &Dataset, ctx: &TrialContext<'_>) -> BenchResult<TrialTiming> {
        let name = self.name();
        let Some(phases) = &self.phases else {
            return Err(not_prepared(name));
        };
        let volume = dataset.volume();
        let mut clock = PhaseClock::start(ctx.events);

        let output = match self.family {
            Family::MarchingCubes => {
                let iso = self.variant.iso_value;
                let mut mesh = clock
                    .phase(phases.update, || fused::marching_cubes(volume, iso))
                    .map_err(|e| kernel_error(name, e))?;
                if self.staged_normals {
                    match self.variant.normals {
                        NormalStrategy::Native => {
                            mesh.normals = clock.phase(phases.normals, || fused::point_normals(&mesh));
                        }
                        NormalStrategy::Reference => {
                            mesh.normals = clock.phase(phases.normals, || serial::polygon_point_normals(&mesh));
                        }
                        NormalStrategy::Skip => {}
                    }
                }
                OutputStats::from(&mesh)
            }
            Family::Threshold => {
                let range = self.variant.threshold;
                let mesh = clock
                    .phase(phases.update, || fused::threshold(volume, range.lower, range.upper))
                    .map_err(|e| kernel_error(name, e))?;
                OutputStats::from(&mesh)
            }
        };

        Ok(clock.finish(output))
    }
}

#[cfg(all(test, feature = "native-backend"))]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use volbench_kernels::Dims;

    fn run(adapter: &mut NativeAdapter) -> TrialTiming {
        let events = EventLogger::new();
        let data = Dataset::synthetic(Dims::new(16, 16, 16), 3);
        adapter.prepare(&data, &events).unwrap();
        adapter.run_trial(&data, &TrialContext::trial(&events, 0)).unwrap()
    }

    #[test]
    fn single_call_has_one_update_phase() {
        let config = HarnessConfig::default();
        let mut adapter = NativeAdapter::new(Family::MarchingCubes, config.variant(None));
        let timing = run(&mut adapter);
        assert_eq!(timing.phases.len(), 1);
        assert_eq!(timing.phases[0].0, "update");
        assert_eq!(adapter.label(), "Native");
    }

    #[test]
    fn staged_form_times_normals_separately() {
        let config = HarnessConfig::default();
        let mut adapter = NativeAdapter::staged(config.variant(None));
        let timing = run(&mut adapter);
        let names: Vec<_> = timing.phases.iter().map(|p| p.0).collect();
        assert_eq!(names, ["update", "normals"]);
        assert_eq!(adapter.label(), "NativeStaged");
    }

    #[test]
    fn reference_normals_are_still_a_normals_phase() {
        let config = HarnessConfig::default().with_normals(NormalStrategy::Reference);
        let timing = run(&mut NativeAdapter::staged(config.variant(None)));
        assert_eq!(timing.phases.len(), 2);
    }

    #[test]
    fn skipped_normals_time_the_contour_alone() {
        let config = HarnessConfig::default().with_normals(NormalStrategy::Skip);
        let timing = run(&mut NativeAdapter::staged(config.variant(None)));
        assert_eq!(timing.phases.len(), 1);
    }

    #[test]
    fn threshold_produces_cells() {
        let config = HarnessConfig::default();
        let timing = run(&mut NativeAdapter::new(Family::Threshold, config.variant(None)));
        assert!(timing.output.cells > 0);
        assert_eq!(timing.output.points, timing.output.cells * 8);
    }
}
