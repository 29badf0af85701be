//! Trilinear resampling by a per-axis magnification factor.

use glam::Vec3;
use rayon::prelude::*;

use crate::grid::{Dims, UniformGrid, Volume};
use crate::{KernelError, KernelResult, Scalar};

/// Output extent for an axis of `n` points magnified by `ratio`.
pub fn resampled_extent(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).round() as usize).max(1)
}

/// Resample `volume` so every axis holds `round(n * ratio)` points (at least
/// one). The physical bounds are preserved by stretching the spacing.
pub fn resample(volume: &Volume, ratio: f64) -> KernelResult<Volume> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(KernelError::Ratio(ratio));
    }
    if volume.dims().point_count() == 0 {
        return Err(KernelError::NoCells(volume.dims()));
    }
    let src = volume.grid();
    let src_dims = src.dims.as_array();
    let out_dims = src_dims.map(|n| resampled_extent(n, ratio));
    let out_points = Dims::new(out_dims[0], out_dims[1], out_dims[2])
        .checked_point_count()
        .ok_or(KernelError::Ratio(ratio))?;

    // source index step between consecutive output samples, per axis
    let step: [f32; 3] = std::array::from_fn(|a| {
        if out_dims[a] > 1 {
            (src_dims[a] - 1) as f32 / (out_dims[a] - 1) as f32
        } else {
            0.0
        }
    });
    let spacing = src.spacing * Vec3::from_array(step.map(|s| if s > 0.0 { s } else { 1.0 }));
    let grid = UniformGrid::new(Dims::new(out_dims[0], out_dims[1], out_dims[2]))
        .with_origin(src.origin)
        .with_spacing(spacing);

    let slice = out_dims[0] * out_dims[1];
    let mut values = vec![0.0 as Scalar; out_points];
    values.par_chunks_mut(slice).enumerate().for_each(|(k, out)| {
        let z = k as f32 * step[2];
        for j in 0..out_dims[1] {
            let y = j as f32 * step[1];
            for i in 0..out_dims[0] {
                out[i + out_dims[0] * j] = trilinear(volume, [i as f32 * step[0], y, z]);
            }
        }
    });

    Volume::new(grid, values)
}

fn trilinear(volume: &Volume, at: [f32; 3]) -> Scalar {
    let dims = volume.dims().as_array();
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut t = [0.0f32; 3];
    for a in 0..3 {
        let max = dims[a] - 1;
        let base = (at[a].floor() as usize).min(max);
        lo[a] = base;
        hi[a] = (base + 1).min(max);
        t[a] = (at[a] - base as f32).clamp(0.0, 1.0);
    }
    let v = |i: usize, j: usize, k: usize| volume.at(i, j, k);
    let lerp = |a: Scalar, b: Scalar, t: f32| a + (b - a) * t;

    let c00 = lerp(v(lo[0], lo[1], lo[2]), v(hi[0], lo[1], lo[2]), t[0]);
    let c10 = lerp(v(lo[0], hi[1], lo[2]), v(hi[0], hi[1], lo[2]), t[0]);
    let c01 = lerp(v(lo[0], lo[1], hi[2]), v(hi[0], lo[1], hi[2]), t[0]);
    let c11 = lerp(v(lo[0], hi[1], hi[2]), v(hi[0], hi[1], hi[2]), t[0]);
    lerp(lerp(c00, c10, t[1]), lerp(c01, c11, t[1]), t[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenth_of_a_hundred_is_ten() {
        assert_eq!(resampled_extent(100, 0.1), 10);
        assert_eq!(resampled_extent(4, 0.1), 1);
        assert_eq!(resampled_extent(64, 1.0), 64);
    }

    #[test]
    fn linear_field_survives_resampling() {
        let grid = UniformGrid::new(Dims::new(21, 11, 5));
        let vol = Volume::from_fn(grid, |p| 2.0 * p.x + p.y - p.z);
        let out = resample(&vol, 0.5).unwrap();
        assert_eq!(out.dims(), Dims::new(11, 6, 3));
        let g = *out.grid();
        for k in 0..3 {
            for j in 0..6 {
                for i in 0..11 {
                    let p = g.position(i, j, k);
                    let expected = 2.0 * p.x + p.y - p.z;
                    assert!((out.at(i, j, k) - expected).abs() < 1e-3);
                }
            }
        }
    }

    #[test]
    fn bounds_are_preserved() {
        let grid = UniformGrid::new(Dims::new(100, 100, 100));
        let vol = Volume::from_fn(grid, |_| 0.0);
        let out = resample(&vol, 0.1).unwrap();
        assert_eq!(out.dims(), Dims::new(10, 10, 10));
        let far = out.grid().position(9, 9, 9);
        assert!((far - Vec3::splat(99.0)).length() < 1e-3);
    }

    #[test]
    fn non_positive_ratio_is_rejected() {
        let vol = Volume::from_fn(UniformGrid::new(Dims::new(2, 2, 2)), |_| 0.0);
        assert_eq!(resample(&vol, 0.0).unwrap_err(), KernelError::Ratio(0.0));
        assert!(resample(&vol, f64::NAN).is_err());
    }

    #[test]
    fn ratio_overflowing_the_output_is_rejected() {
        let vol = Volume::from_fn(UniformGrid::new(Dims::new(2, 2, 2)), |_| 0.0);
        assert_eq!(resample(&vol, 1e300).unwrap_err(), KernelError::Ratio(1e300));
    }
}
