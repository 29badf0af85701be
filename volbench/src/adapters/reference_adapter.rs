//! Serial reference backend.

use volbench_kernels::serial;

use super::{kernel_error, BackendAdapter, OutputStats, TrialContext, TrialTiming};
use crate::config::{Family, VariantConfig};
use crate::dataset::Dataset;
use crate::events::EventLogger;
use crate::BenchResult;

const NAME: &str = "Reference";

/// One serial call per trial; marching cubes yields topology and gradient
/// normals together, so there are no sub-phases to time.
pub struct ReferenceAdapter {
    family: Family,
    variant: VariantConfig,
}

impl ReferenceAdapter {
    pub fn new(family: Family, variant: VariantConfig) -> Self {
        Self { family, variant }
    }
}

impl BackendAdapter for ReferenceAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn algorithm(&self) -> Family {
        self.family
    }

    fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    fn prepare(&mut self, dataset: &Dataset, _events: &EventLogger) -> BenchResult<()> {
        if !self.variant.device.is_serial() {
            tracing::debug!(device = %self.variant.device, "reference backend running off its Serial device");
        }
        dataset
            .volume()
            .require_cells()
            .map_err(|e| kernel_error(NAME, e))
    }

    fn run_trial(&mut self, dataset: &Dataset, _ctx: &TrialContext<'_>) -> BenchResult<TrialTiming> {
        let start = std::time::Instant::now();
        let volume = dataset.volume();
        let output = match self.family {
            Family::MarchingCubes => serial::marching_cubes_with_normals(volume, self.variant.iso_value)
                .map(|mesh| OutputStats::from(&mesh)),
            Family::Threshold => {
                let range = self.variant.threshold;
                serial::threshold(volume, range.lower, range.upper).map(|mesh| OutputStats::from(&mesh))
            }
        }
        .map_err(|e| kernel_error(NAME, e))?;

        Ok(TrialTiming {
            elapsed: start.elapsed(),
            phases: Vec::new(),
            output,
        })
    }
}
