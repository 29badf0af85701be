//! Single-call kernels: the whole algorithm in one dispatch.
//!
//! No separate classify pass and no point resolution; each z-slab of cells
//! is processed by one task that emits its output directly, and the slabs are
//! concatenated in order.

use glam::Vec3;
use rayon::prelude::*;

use crate::cases::{case_index, cell_samples, edge_point, CaseTable};
use crate::mesh::{HexMesh, TriangleMesh};
use crate::{KernelResult, Scalar, Volume};

/// Triangle soup of the `iso` contour.
pub fn marching_cubes(volume: &Volume, iso: Scalar) -> KernelResult<TriangleMesh> {
    volume.require_cells()?;
    let grid = volume.grid();
    let table = CaseTable::get();
    let [cx, cy, cz] = grid.dims.cell_dims();

    let slabs: Vec<Vec<Vec3>> = (0..cz)
        .into_par_iter()
        .map(|k| {
            let mut out = Vec::new();
            for j in 0..cy {
                for i in 0..cx {
                    let samples = cell_samples(volume, i + cx * (j + cy * k));
                    for tri in table.triangles(case_index(&samples, iso)) {
                        for &edge in tri {
                            out.push(edge_point(grid, [i, j, k], &samples, edge, iso));
                        }
                    }
                }
            }
            out
        })
        .collect();

    let points = slabs.concat();
    let triangles = (0..points.len() as u32 / 3)
        .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
        .collect();
    Ok(TriangleMesh {
        points,
        triangles,
        normals: Vec::new(),
    })
}

/// Hexahedra whose corners all lie in `[lower, upper]`, each owning its eight points.
pub fn threshold(volume: &Volume, lower: Scalar, upper: Scalar) -> KernelResult<HexMesh> {
    volume.require_cells()?;
    let grid = volume.grid();
    let [cx, cy, cz] = grid.dims.cell_dims();

    let slabs: Vec<Vec<Vec3>> = (0..cz)
        .into_par_iter()
        .map(|k| {
            let mut out = Vec::new();
            for j in 0..cy {
                for i in 0..cx {
                    let cell = i + cx * (j + cy * k);
                    if cell_samples(volume, cell).iter().all(|v| (lower..=upper).contains(v)) {
                        out.extend(grid.cell_points(cell).map(|p| grid.point_position(p)));
                    }
                }
            }
            out
        })
        .collect();

    let points = slabs.concat();
    let cells = (0..points.len() as u32 / 8)
        .map(|c| std::array::from_fn(|corner| 8 * c + corner as u32))
        .collect();
    Ok(HexMesh { points, cells })
}

/// Area-weighted point normals, computed as a separate pass over a mesh.
pub fn point_normals(mesh: &TriangleMesh) -> Vec<Vec3> {
    let weighted: Vec<Vec3> = mesh
        .triangles
        .par_iter()
        .map(|&[a, b, c]| {
            let p0 = mesh.points[a as usize];
            (mesh.points[b as usize] - p0).cross(mesh.points[c as usize] - p0)
        })
        .collect();

    let mut normals = vec![Vec3::ZERO; mesh.points.len()];
    for (tri, n) in mesh.triangles.iter().zip(&weighted) {
        for &p in tri {
            normals[p as usize] += *n;
        }
    }
    normals.par_iter_mut().for_each(|n| *n = n.normalize_or_zero());
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{staged, Dims, UniformGrid};

    fn blob() -> Volume {
        Volume::from_fn(UniformGrid::new(Dims::new(12, 10, 9)), |p| {
            4.0 - p.distance(Vec3::new(5.5, 4.5, 4.0))
        })
    }

    #[test]
    fn fused_contour_matches_staged_triangle_count() {
        let vol = blob();
        let fused = marching_cubes(&vol, 1.0).unwrap();
        let class = staged::classify_marching_cubes(&vol, 1.0).unwrap();
        assert_eq!(fused.triangle_count(), class.total());
        assert_eq!(fused.point_count(), 3 * fused.triangle_count());
    }

    #[test]
    fn fused_threshold_matches_staged_cell_count() {
        let vol = blob();
        let fused = threshold(&vol, 0.0, 10.0).unwrap();
        let class = staged::classify_threshold(&vol, 0.0, 10.0).unwrap();
        assert_eq!(fused.cell_count(), class.total());
        assert_eq!(fused.point_count(), 8 * fused.cell_count());
    }

    #[test]
    fn point_normals_cover_every_point() {
        let vol = blob();
        let mesh = marching_cubes(&vol, 1.0).unwrap();
        let normals = point_normals(&mesh);
        assert_eq!(normals.len(), mesh.point_count());
        assert!(normals.iter().any(|n| n.length() > 0.5));
    }
}
