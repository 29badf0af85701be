//! Volumetric kernels benchmarked by the `volbench` harness.
//!
//! Three families of implementations of the same two algorithms live here:
//! - [`staged`]: data-parallel pipelines split into classify / generate /
//!   normals phases (rayon)
//! - [`fused`]: single-call kernels that do the whole algorithm in one
//!   dispatch
//! - [`serial`]: straightforward single-threaded reference kernels
//!
//! All of them share the [`grid`] description and the marching-cubes
//! [`cases`] table.

pub mod cases;
pub mod fused;
pub mod grid;
pub mod mesh;
pub mod resample;
pub mod serial;
pub mod staged;

/// Scalar type of every sample in a [`grid::Volume`].
pub type Scalar = f32;

const _: () = assert!(core::mem::size_of::<Scalar>() == 4);

pub use glam::Vec3;
pub use grid::{Dims, UniformGrid, Volume};
pub use mesh::{HexMesh, TriangleMesh};

/// Errors raised when a volume cannot be turned into a kernel input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("sample count {actual} does not match extents {dims} ({expected} points)")]
    SampleCount {
        dims: Dims,
        expected: usize,
        actual: usize,
    },
    #[error("extents {0} contain no cells")]
    NoCells(Dims),
    #[error("invalid resample ratio {0}")]
    Ratio(f64),
}

pub type KernelResult<T> = std::result::Result<T, KernelError>;
