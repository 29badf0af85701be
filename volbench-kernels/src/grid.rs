//! Uniform grid description and the scalar volume sampled on it.

use glam::Vec3;
use std::fmt;

use crate::{KernelError, KernelResult, Scalar};

/// Point extents of a uniform grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn point_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Point count, or `None` when the extents overflow `usize`.
    pub fn checked_point_count(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// Number of hexahedral cells; zero when any axis has fewer than two points.
    pub fn cell_count(&self) -> usize {
        let [cx, cy, cz] = self.cell_dims();
        cx * cy * cz
    }

    pub fn cell_dims(&self) -> [usize; 3] {
        [
            self.nx.saturating_sub(1),
            self.ny.saturating_sub(1),
            self.nz.saturating_sub(1),
        ]
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    /// Smallest extent along any axis.
    pub fn min_extent(&self) -> usize {
        self.nx.min(self.ny).min(self.nz)
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Grid description shared by every phase of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGrid {
    pub dims: Dims,
    pub origin: Vec3,
    pub spacing: Vec3,
}

impl UniformGrid {
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            origin: Vec3::ZERO,
            spacing: Vec3::ONE,
        }
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_spacing(mut self, spacing: Vec3) -> Self {
        self.spacing = spacing;
        self
    }

    #[inline]
    pub fn point_id(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims.nx * (j + self.dims.ny * k)
    }

    /// Lower corner `(i, j, k)` of a cell id.
    #[inline]
    pub fn cell_ijk(&self, cell: usize) -> [usize; 3] {
        let [cx, cy, _] = self.dims.cell_dims();
        [cell % cx, (cell / cx) % cy, cell / (cx * cy)]
    }

    /// Point ids of the eight corners of a cell, corner `c` at offset
    /// `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
    #[inline]
    pub fn cell_points(&self, cell: usize) -> [usize; 8] {
        let [i, j, k] = self.cell_ijk(cell);
        let base = self.point_id(i, j, k);
        let sx = 1;
        let sy = self.dims.nx;
        let sz = self.dims.nx * self.dims.ny;
        [
            base,
            base + sx,
            base + sy,
            base + sx + sy,
            base + sz,
            base + sx + sz,
            base + sy + sz,
            base + sx + sy + sz,
        ]
    }

    /// World position of the point with index `(i, j, k)`.
    #[inline]
    pub fn position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.origin + self.spacing * Vec3::new(i as f32, j as f32, k as f32)
    }

    #[inline]
    pub fn point_position(&self, point: usize) -> Vec3 {
        let nx = self.dims.nx;
        let ny = self.dims.ny;
        self.position(point % nx, (point / nx) % ny, point / (nx * ny))
    }
}

/// Scalar field sampled on a uniform grid, x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    grid: UniformGrid,
    values: Vec<Scalar>,
}

impl Volume {
    pub fn new(grid: UniformGrid, values: Vec<Scalar>) -> KernelResult<Self> {
        match grid.dims.checked_point_count() {
            Some(expected) if expected == values.len() => Ok(Self { grid, values }),
            expected => Err(KernelError::SampleCount {
                dims: grid.dims,
                expected: expected.unwrap_or(usize::MAX),
                actual: values.len(),
            }),
        }
    }

    /// Build a volume by evaluating `f` at every point's world position.
    pub fn from_fn(grid: UniformGrid, mut f: impl FnMut(Vec3) -> Scalar) -> Self {
        let mut values = Vec::with_capacity(grid.dims.point_count());
        for k in 0..grid.dims.nz {
            for j in 0..grid.dims.ny {
                for i in 0..grid.dims.nx {
                    values.push(f(grid.position(i, j, k)));
                }
            }
        }
        Self { grid, values }
    }

    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    pub fn dims(&self) -> Dims {
        self.grid.dims
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> Scalar {
        self.values[self.grid.point_id(i, j, k)]
    }

    /// Fails when the volume has no cells to run a cell-based kernel over.
    pub fn require_cells(&self) -> KernelResult<()> {
        if self.grid.dims.cell_count() == 0 {
            return Err(KernelError::NoCells(self.grid.dims));
        }
        Ok(())
    }

    pub fn value_range(&self) -> (Scalar, Scalar) {
        self.values
            .iter()
            .fold((Scalar::INFINITY, Scalar::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_count_is_zero_for_flat_extents() {
        assert_eq!(Dims::new(10, 10, 10).cell_count(), 729);
        assert_eq!(Dims::new(10, 1, 10).cell_count(), 0);
        assert_eq!(Dims::new(0, 5, 5).cell_count(), 0);
    }

    #[test]
    fn overflowing_extents_have_no_point_count() {
        assert_eq!(Dims::new(4, 5, 6).checked_point_count(), Some(120));
        assert_eq!(Dims::new(usize::MAX, 2, 2).checked_point_count(), None);

        let grid = UniformGrid::new(Dims::new(usize::MAX, 2, 2));
        let err = Volume::new(grid, vec![0.0; 4]).unwrap_err();
        assert!(matches!(err, KernelError::SampleCount { expected: usize::MAX, actual: 4, .. }));
    }

    #[test]
    fn cell_points_follow_corner_bits() {
        let grid = UniformGrid::new(Dims::new(3, 3, 3));
        // cell (1,1,1) in a 2x2x2 cell grid has id 7
        let cell7 = grid.cell_points(7);
        assert_eq!(cell7[0], grid.point_id(1, 1, 1));
        assert_eq!(cell7[7], grid.point_id(2, 2, 2));
        for (c, &p) in grid.cell_points(0).iter().enumerate() {
            assert_eq!(p, grid.point_id(c & 1, (c >> 1) & 1, (c >> 2) & 1));
        }
    }

    #[test]
    fn volume_rejects_wrong_sample_count() {
        let grid = UniformGrid::new(Dims::new(2, 2, 2));
        let err = Volume::new(grid, vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, KernelError::SampleCount { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn from_fn_uses_world_positions() {
        let grid = UniformGrid::new(Dims::new(2, 3, 4)).with_spacing(Vec3::splat(2.0));
        let vol = Volume::from_fn(grid, |p| p.z);
        assert_eq!(vol.at(1, 2, 3), 6.0);
        assert_eq!(vol.value_range(), (0.0, 6.0));
    }
}
