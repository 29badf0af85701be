//! Run configuration: algorithm family, device, variants and capabilities.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use volbench_kernels::Dims;

use crate::BenchError;

/// Default number of timed trials per block.
pub const DEFAULT_TRIALS: usize = 5;
/// Default per-axis resample ratio applied at load.
pub const DEFAULT_RESAMPLE_RATIO: f64 = 0.1;
/// Default contour value for marching cubes.
pub const DEFAULT_ISO_VALUE: f32 = 0.07;
/// Default inclusive threshold range.
pub const DEFAULT_THRESHOLD: ThresholdRange = ThresholdRange {
    lower: 0.07,
    upper: 1.0,
};

// ────────────────────────────────────────────────────────────────────────────────
// Algorithm family
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Threshold,
    MarchingCubes,
}

impl Family {
    /// Pipeline selector from the command line: anything up to 1 selects
    /// thresholding, everything above it marching cubes.
    pub fn from_selector(selector: i64) -> Self {
        if selector <= 1 {
            Family::Threshold
        } else {
            Family::MarchingCubes
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Threshold => "threshold",
            Family::MarchingCubes => "marching_cubes",
        }
    }

    /// Section title used in logs and the summary.
    pub fn title(&self) -> &'static str {
        match self {
            Family::Threshold => "Threshold",
            Family::MarchingCubes => "Marching Cubes",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Device
// ────────────────────────────────────────────────────────────────────────────────

/// Accelerator name passed on the command line. Only `Serial` has fixed
/// meaning: it pins the data-parallel backends to one thread and enables the
/// serial reference backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Device(String);

impl Device {
    pub const SERIAL: &'static str = "Serial";

    pub fn new(name: impl Into<String>) -> Self {
        Device(name.into())
    }

    pub fn serial() -> Self {
        Device::new(Self::SERIAL)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_serial(&self) -> bool {
        self.0 == Self::SERIAL
    }

    /// Worker count for data-parallel backends; `None` means the default
    /// rayon width.
    pub fn worker_threads(&self) -> Option<usize> {
        self.is_serial().then_some(1)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Variants
// ────────────────────────────────────────────────────────────────────────────────

/// How the native backend computes marching-cubes normals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalStrategy {
    /// Separately timed area-weighted pass from the native library.
    #[default]
    Native,
    /// Delegate the normal pass to the serial reference routine.
    Reference,
    /// Time the contour alone.
    Skip,
}

impl FromStr for NormalStrategy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(NormalStrategy::Native),
            "reference" => Ok(NormalStrategy::Reference),
            "skip" | "none" => Ok(NormalStrategy::Skip),
            other => Err(BenchError::Config(format!(
                "unknown normal strategy '{other}' (expected native, reference or skip)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdRange {
    pub lower: f32,
    pub upper: f32,
}

/// Per-block knobs handed to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantConfig {
    /// `None` for backends without a point-resolution switch.
    pub point_resolution: Option<bool>,
    pub iso_value: f32,
    pub threshold: ThresholdRange,
    pub device: Device,
    pub normals: NormalStrategy,
}

impl VariantConfig {
    pub fn tag(&self) -> &'static str {
        match self.point_resolution {
            Some(true) => "with-resolution",
            Some(false) => "without-resolution",
            None => "default",
        }
    }

    /// Flag rendered into trial event labels.
    pub fn resolution_flag(&self) -> u8 {
        u8::from(self.point_resolution.unwrap_or(false))
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Capabilities
// ────────────────────────────────────────────────────────────────────────────────

/// Which optional backends this build can plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub native: bool,
    /// Native marching cubes followed by a separately timed normal pass.
    pub native_staged_normals: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        let native = cfg!(feature = "native-backend");
        Self {
            native,
            native_staged_normals: native,
        }
    }

    pub fn none() -> Self {
        Self {
            native: false,
            native_staged_normals: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Harness config
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DatasetSource {
    Nrrd(PathBuf),
    Synthetic { extent: [usize; 3], seed: u64 },
}

impl DatasetSource {
    pub fn synthetic(dims: Dims, seed: u64) -> Self {
        DatasetSource::Synthetic {
            extent: dims.as_array(),
            seed,
        }
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Nrrd(path) => write!(f, "{}", path.display()),
            DatasetSource::Synthetic {
                extent: [x, y, z],
                seed,
            } => write!(f, "synthetic {x}x{y}x{z} (seed {seed})"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    pub device: Device,
    pub source: DatasetSource,
    pub pipeline: i64,
    pub trials: usize,
    pub resample_ratio: f64,
    pub iso_value: f32,
    pub threshold: ThresholdRange,
    pub normals: NormalStrategy,
    pub capabilities: Capabilities,
    /// Block labels or backend names to leave out of the plan.
    pub skip: Vec<String>,
    /// Silent pass on the toolkit backend before any recorded block.
    pub machine_warmup: bool,
    pub print_summary: bool,
    pub export_dir: Option<PathBuf>,
    pub trace_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            device: Device::serial(),
            source: DatasetSource::synthetic(Dims::new(64, 64, 64), 42),
            pipeline: 1,
            trials: DEFAULT_TRIALS,
            resample_ratio: DEFAULT_RESAMPLE_RATIO,
            iso_value: DEFAULT_ISO_VALUE,
            threshold: DEFAULT_THRESHOLD,
            normals: NormalStrategy::default(),
            capabilities: Capabilities::detect(),
            skip: Vec::new(),
            machine_warmup: true,
            print_summary: true,
            export_dir: None,
            trace_path: None,
        }
    }
}

impl HarnessConfig {
    pub fn new(device: impl Into<String>, source: DatasetSource, pipeline: i64) -> Self {
        Self {
            device: Device::new(device),
            source,
            pipeline,
            ..Self::default()
        }
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_resample_ratio(mut self, ratio: f64) -> Self {
        self.resample_ratio = ratio;
        self
    }

    pub fn with_iso_value(mut self, iso: f32) -> Self {
        self.iso_value = iso;
        self
    }

    pub fn with_threshold(mut self, lower: f32, upper: f32) -> Self {
        self.threshold = ThresholdRange { lower, upper };
        self
    }

    pub fn with_normals(mut self, normals: NormalStrategy) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_skip(mut self, skip: Vec<String>) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_machine_warmup(mut self, enabled: bool) -> Self {
        self.machine_warmup = enabled;
        self
    }

    pub fn with_summary(mut self, enabled: bool) -> Self {
        self.print_summary = enabled;
        self
    }

    pub fn with_export_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.export_dir = dir;
        self
    }

    pub fn with_trace_path(mut self, path: Option<PathBuf>) -> Self {
        self.trace_path = path;
        self
    }

    pub fn family(&self) -> Family {
        Family::from_selector(self.pipeline)
    }

    pub fn variant(&self, point_resolution: Option<bool>) -> VariantConfig {
        VariantConfig {
            point_resolution,
            iso_value: self.iso_value,
            threshold: self.threshold,
            device: self.device.clone(),
            normals: self.normals,
        }
    }

    /// Reject values no backend could run with.
    pub fn validate(&self) -> Result<(), BenchError> {
        if !self.resample_ratio.is_finite() || self.resample_ratio <= 0.0 {
            return Err(BenchError::Config(format!(
                "resample ratio must be positive, got {}",
                self.resample_ratio
            )));
        }
        if !self.iso_value.is_finite() {
            return Err(BenchError::Config(format!("iso value must be finite, got {}", self.iso_value)));
        }
        if !self.threshold.lower.is_finite() || !self.threshold.upper.is_finite() {
            return Err(BenchError::Config(format!(
                "threshold bounds must be finite, got [{}, {}]",
                self.threshold.lower, self.threshold.upper
            )));
        }
        if self.threshold.lower > self.threshold.upper {
            return Err(BenchError::Config(format!(
                "threshold range [{}, {}] is empty",
                self.threshold.lower, self.threshold.upper
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_up_to_one_is_threshold() {
        assert_eq!(Family::from_selector(-3), Family::Threshold);
        assert_eq!(Family::from_selector(0), Family::Threshold);
        assert_eq!(Family::from_selector(1), Family::Threshold);
        assert_eq!(Family::from_selector(2), Family::MarchingCubes);
        assert_eq!(Family::from_selector(99), Family::MarchingCubes);
    }

    #[test]
    fn resolution_states_have_distinct_tags() {
        let config = HarnessConfig::default();
        let with = config.variant(Some(true));
        let without = config.variant(Some(false));
        assert_ne!(with.tag(), without.tag());
        assert_eq!(config.variant(None).tag(), "default");
        assert_eq!(with.resolution_flag(), 1);
        assert_eq!(without.resolution_flag(), 0);
    }

    #[test]
    fn only_serial_pins_one_worker() {
        assert_eq!(Device::serial().worker_threads(), Some(1));
        assert_eq!(Device::new("GPU").worker_threads(), None);
        assert!(!Device::new("serial").is_serial());
    }

    #[test]
    fn defaults_match_the_standard_run() {
        let config = HarnessConfig::default();
        assert_eq!(config.trials, 5);
        assert_eq!(config.resample_ratio, 0.1);
        assert_eq!(config.iso_value, 0.07);
        assert_eq!(config.threshold, ThresholdRange { lower: 0.07, upper: 1.0 });
        assert_eq!(config.normals, NormalStrategy::Native);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_normal_strategies() {
        assert_eq!("Reference".parse::<NormalStrategy>().unwrap(), NormalStrategy::Reference);
        assert_eq!("skip".parse::<NormalStrategy>().unwrap(), NormalStrategy::Skip);
        assert!("fast".parse::<NormalStrategy>().is_err());
    }

    #[test]
    fn inverted_threshold_is_a_config_error() {
        let config = HarnessConfig::default().with_threshold(1.0, 0.0);
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn non_finite_contour_values_are_config_errors() {
        assert!(HarnessConfig::default().validate().is_ok());
        for config in [
            HarnessConfig::default().with_iso_value(f32::NAN),
            HarnessConfig::default().with_threshold(f32::NAN, 1.0),
            HarnessConfig::default().with_threshold(0.0, f32::NAN),
            HarnessConfig::default().with_threshold(0.0, f32::INFINITY),
        ] {
            assert_eq!(config.validate().unwrap_err().exit_code(), 2);
        }
    }
}
