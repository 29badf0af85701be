//! The immutable volume every backend in a run is measured against.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::Path;

use volbench_kernels::resample::resample;
use volbench_kernels::{Dims, UniformGrid, Vec3, Volume};

use crate::config::DatasetSource;
use crate::nrrd::load_nrrd;
use crate::{BenchError, BenchResult};

#[derive(Debug, Clone)]
pub struct Dataset {
    volume: Volume,
    source: String,
}

impl Dataset {
    /// Wrap an already-built volume without any checks.
    pub fn from_volume(volume: Volume, source: impl Into<String>) -> Self {
        Self {
            volume,
            source: source.into(),
        }
    }

    /// Load an NRRD volume and resample every axis by `ratio`.
    pub fn load(path: &Path, ratio: f64) -> BenchResult<Self> {
        let raw = load_nrrd(path)?;
        Self::resampled(raw, ratio, path.display().to_string())
    }

    /// Resample `volume` by `ratio`, rejecting results that would contain no
    /// cells.
    pub fn resampled(volume: Volume, ratio: f64, source: impl Into<String>) -> BenchResult<Self> {
        let source = source.into();
        let original = volume.dims();
        let volume = resample(&volume, ratio).map_err(|e| BenchError::Data(format!("{source}: {e}")))?;
        let dims = volume.dims();
        if dims.min_extent() <= 1 {
            return Err(BenchError::Data(format!(
                "{source}: resampled extents {dims} (from {original} at ratio {ratio}) contain no cells"
            )));
        }
        tracing::info!(%source, %original, resampled = %dims, ratio, "dataset ready");
        Ok(Self { volume, source })
    }

    /// Deterministic noisy ball: roughly 1 at the center falling to 0 at the
    /// inscribed sphere, so the default iso value and threshold range cut
    /// through it.
    pub fn synthetic(dims: Dims, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let [nx, ny, nz] = dims.as_array();
        let center = Vec3::new(nx as f32 - 1.0, ny as f32 - 1.0, nz as f32 - 1.0) * 0.5;
        let radius = center.min_element().max(1.0);
        let volume = Volume::from_fn(UniformGrid::new(dims), |p| {
            let falloff = 1.0 - p.distance(center) / radius;
            falloff.max(0.0) + rng.gen_range(-0.005..0.005)
        });
        Self {
            volume,
            source: format!("synthetic {dims} seed {seed}"),
        }
    }

    /// Materialise a configured source. Synthetic volumes are generated at
    /// their final size and not resampled.
    pub fn from_source(source: &DatasetSource, ratio: f64) -> BenchResult<Self> {
        match source {
            DatasetSource::Nrrd(path) => Self::load(path, ratio),
            DatasetSource::Synthetic {
                extent: [x, y, z],
                seed,
            } => {
                let dims = Dims::new(*x, *y, *z);
                if dims.min_extent() <= 1 {
                    return Err(BenchError::Data(format!("{source}: contains no cells")));
                }
                if dims.checked_point_count().is_none() {
                    return Err(BenchError::Data(format!("{source}: extents are too large")));
                }
                Ok(Self::synthetic(dims, *seed))
            }
        }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn dims(&self) -> Dims {
        self.volume.dims()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nrrd::{write_nrrd, Encoding};

    #[test]
    fn hundred_cubed_at_a_tenth_is_ten_cubed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.nrrd");
        let vol = Dataset::synthetic(Dims::new(100, 100, 100), 1).volume;
        write_nrrd(&path, &vol, Encoding::Raw).unwrap();
        let data = Dataset::load(&path, 0.1).unwrap();
        assert_eq!(data.dims(), Dims::new(10, 10, 10));
    }

    #[test]
    fn collapsing_extent_is_a_data_error() {
        let vol = Dataset::synthetic(Dims::new(40, 40, 5), 1).volume;
        let err = Dataset::resampled(vol, 0.1, "thin").unwrap_err();
        assert!(matches!(err, BenchError::Data(_)));
        assert!(err.to_string().contains("40x40x5") || err.to_string().contains("4x4x1"));
    }

    #[test]
    fn synthetic_is_deterministic_per_seed() {
        let a = Dataset::synthetic(Dims::new(8, 8, 8), 9);
        let b = Dataset::synthetic(Dims::new(8, 8, 8), 9);
        let c = Dataset::synthetic(Dims::new(8, 8, 8), 10);
        assert_eq!(a.volume.values(), b.volume.values());
        assert_ne!(a.volume.values(), c.volume.values());
    }

    #[test]
    fn synthetic_spans_the_default_iso_value() {
        let data = Dataset::synthetic(Dims::new(16, 16, 16), 2);
        let (lo, hi) = data.volume().value_range();
        assert!(lo < 0.07 && hi > 0.5);
    }

    #[test]
    fn oversized_output_is_a_data_error() {
        let vol = Dataset::synthetic(Dims::new(4, 4, 4), 1).volume;
        let err = Dataset::resampled(vol, 1e300, "tiny").unwrap_err();
        assert!(matches!(err, BenchError::Data(_)));

        let source = DatasetSource::synthetic(Dims::new(1 << 22, 1 << 22, 1 << 22), 0);
        assert_eq!(Dataset::from_source(&source, 0.1).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn flat_synthetic_source_is_rejected() {
        let source = DatasetSource::synthetic(Dims::new(1, 30, 30), 0);
        assert_eq!(Dataset::from_source(&source, 0.1).unwrap_err().exit_code(), 3);
    }
}
