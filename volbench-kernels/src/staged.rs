//! Data-parallel pipelines split into explicitly scheduled phases.
//!
//! Marching cubes runs as classify → generate (→ optional point resolution)
//! → normals; threshold runs as classify → generate. Every phase is a rayon
//! data-parallel pass over the same [`UniformGrid`](crate::UniformGrid), so the
//! caller decides the pool width by installing a `rayon::ThreadPool`.

use glam::Vec3;
use rayon::prelude::*;

use crate::cases::{case_index, cell_samples, edge_key, edge_point, CaseTable};
use crate::mesh::{HexMesh, TriangleMesh};
use crate::{KernelResult, Scalar, Volume};

/// Per-cell output counts produced by a classify phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    counts: Vec<u32>,
}

impl Classification {
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.par_iter().map(|&c| c as usize).sum()
    }

    /// Number of cells with a non-zero count.
    pub fn active_count(&self) -> usize {
        self.counts.par_iter().filter(|&&c| c > 0).count()
    }

    fn active_cells(&self) -> Vec<usize> {
        self.counts
            .par_iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(cell, _)| cell)
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Marching cubes
// ────────────────────────────────────────────────────────────────────────────────

/// Number of triangles each cell will emit for `iso`.
pub fn classify_marching_cubes(volume: &Volume, iso: Scalar) -> KernelResult<Classification> {
    volume.require_cells()?;
    let table = CaseTable::get();
    let counts = (0..volume.dims().cell_count())
        .into_par_iter()
        .map(|cell| table.triangle_count(case_index(&cell_samples(volume, cell), iso)) as u32)
        .collect();
    Ok(Classification { counts })
}

/// Interpolated triangles for every cell the classification marked active.
///
/// With `resolve_points` coincident vertices generated by neighbouring cells
/// are merged into one point; otherwise every triangle owns three points.
pub fn generate_marching_cubes(
    volume: &Volume,
    iso: Scalar,
    classification: &Classification,
    resolve_points: bool,
) -> TriangleMesh {
    let grid = volume.grid();
    let table = CaseTable::get();
    let active = classification.active_cells();

    let vertices: Vec<(u64, Vec3)> = active
        .par_iter()
        .flat_map_iter(|&cell| {
            let ijk = grid.cell_ijk(cell);
            let samples = cell_samples(volume, cell);
            let case = case_index(&samples, iso);
            table.triangles(case).iter().flat_map(move |&tri| {
                tri.map(|edge| (edge_key(grid, ijk, edge), edge_point(grid, ijk, &samples, edge, iso)))
            })
        })
        .collect();
    debug_assert_eq!(vertices.len(), classification.total() * 3);

    if resolve_points {
        resolve_vertices(vertices)
    } else {
        let triangles = (0..vertices.len() as u32 / 3)
            .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
            .collect();
        TriangleMesh {
            points: vertices.into_iter().map(|(_, p)| p).collect(),
            triangles,
            normals: Vec::new(),
        }
    }
}

fn resolve_vertices(vertices: Vec<(u64, Vec3)>) -> TriangleMesh {
    let mut unique = vertices.clone();
    unique.par_sort_unstable_by_key(|&(key, _)| key);
    unique.dedup_by_key(|&mut (key, _)| key);

    let ids: Vec<u32> = vertices
        .par_iter()
        .map(|(key, _)| {
            unique
                .binary_search_by_key(key, |&(k, _)| k)
                .map(|i| i as u32)
                .unwrap_or_default()
        })
        .collect();

    TriangleMesh {
        points: unique.into_iter().map(|(_, p)| p).collect(),
        triangles: ids.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect(),
        normals: Vec::new(),
    }
}

/// Unit normal of every triangle from the cross product of two of its edges.
pub fn face_normals(mesh: &TriangleMesh) -> Vec<Vec3> {
    mesh.triangles
        .par_iter()
        .map(|&[a, b, c]| {
            let p0 = mesh.points[a as usize];
            (mesh.points[b as usize] - p0)
                .cross(mesh.points[c as usize] - p0)
                .normalize_or_zero()
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────────
// Threshold
// ────────────────────────────────────────────────────────────────────────────────

/// Marks cells whose eight corner samples all lie in `[lower, upper]`.
pub fn classify_threshold(volume: &Volume, lower: Scalar, upper: Scalar) -> KernelResult<Classification> {
    volume.require_cells()?;
    let counts = (0..volume.dims().cell_count())
        .into_par_iter()
        .map(|cell| {
            cell_samples(volume, cell)
                .iter()
                .all(|v| (lower..=upper).contains(v)) as u32
        })
        .collect();
    Ok(Classification { counts })
}

/// Hexahedra for every kept cell.
///
/// Without point resolution the output shares the full input point set;
/// with it only the referenced points survive and connectivity is remapped.
pub fn generate_threshold(volume: &Volume, classification: &Classification, resolve_points: bool) -> HexMesh {
    let grid = volume.grid();
    let cells: Vec<[u32; 8]> = classification
        .active_cells()
        .par_iter()
        .map(|&cell| grid.cell_points(cell).map(|p| p as u32))
        .collect();

    if !resolve_points {
        let points = (0..grid.dims.point_count())
            .into_par_iter()
            .map(|p| grid.point_position(p))
            .collect();
        return HexMesh { points, cells };
    }

    let mut used: Vec<u32> = cells.par_iter().flat_map_iter(|c| c.iter().copied()).collect();
    used.par_sort_unstable();
    used.dedup();

    let remapped = cells
        .par_iter()
        .map(|cell| cell.map(|p| used.binary_search(&p).map(|i| i as u32).unwrap_or_default()))
        .collect();
    HexMesh {
        points: used.par_iter().map(|&p| grid.point_position(p as usize)).collect(),
        cells: remapped,
    }
}
