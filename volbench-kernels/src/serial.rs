//! Single-threaded reference kernels.
//!
//! Marching cubes here produces merged points and per-point gradient normals
//! in one pass, the way a classic visualization library's filter does.

use glam::Vec3;
use std::collections::HashMap;

use crate::cases::{case_index, cell_samples, corner_offset, edge_key, edge_point, CaseTable, CASE_EDGES};
use crate::mesh::{HexMesh, TriangleMesh};
use crate::{KernelResult, Scalar, Volume};

/// Contour with merged points and gradient normals.
pub fn marching_cubes_with_normals(volume: &Volume, iso: Scalar) -> KernelResult<TriangleMesh> {
    volume.require_cells()?;
    let grid = volume.grid();
    let table = CaseTable::get();
    let [cx, cy, cz] = grid.dims.cell_dims();

    let mut locator: HashMap<u64, u32> = HashMap::new();
    let mut mesh = TriangleMesh::default();

    for k in 0..cz {
        for j in 0..cy {
            for i in 0..cx {
                let ijk = [i, j, k];
                let samples = cell_samples(volume, i + cx * (j + cy * k));
                for &tri in table.triangles(case_index(&samples, iso)) {
                    let ids = tri.map(|edge| {
                        *locator.entry(edge_key(grid, ijk, edge)).or_insert_with(|| {
                            mesh.points.push(edge_point(grid, ijk, &samples, edge, iso));
                            mesh.normals.push(edge_normal(volume, ijk, &samples, edge, iso));
                            (mesh.points.len() - 1) as u32
                        })
                    });
                    mesh.triangles.push(ids);
                }
            }
        }
    }
    Ok(mesh)
}

/// Hexahedra whose corners all lie in `[lower, upper]`, sharing merged points.
pub fn threshold(volume: &Volume, lower: Scalar, upper: Scalar) -> KernelResult<HexMesh> {
    volume.require_cells()?;
    let grid = volume.grid();
    let mut locator: HashMap<usize, u32> = HashMap::new();
    let mut mesh = HexMesh::default();

    for cell in 0..grid.dims.cell_count() {
        if !cell_samples(volume, cell).iter().all(|v| (lower..=upper).contains(v)) {
            continue;
        }
        let ids = grid.cell_points(cell).map(|p| {
            *locator.entry(p).or_insert_with(|| {
                mesh.points.push(grid.point_position(p));
                (mesh.points.len() - 1) as u32
            })
        });
        mesh.cells.push(ids);
    }
    Ok(mesh)
}

/// Point normals averaged from polygon normals, one serial sweep.
pub fn polygon_point_normals(mesh: &TriangleMesh) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; mesh.points.len()];
    for &[a, b, c] in &mesh.triangles {
        let p0 = mesh.points[a as usize];
        let n = (mesh.points[b as usize] - p0)
            .cross(mesh.points[c as usize] - p0)
            .normalize_or_zero();
        for p in [a, b, c] {
            normals[p as usize] += n;
        }
    }
    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}

/// Central-difference gradient at a grid point, one-sided on the boundary.
fn gradient(volume: &Volume, ijk: [usize; 3]) -> Vec3 {
    let grid = volume.grid();
    let dims = grid.dims.as_array();
    let spacing = grid.spacing.to_array();
    let mut g = [0.0f32; 3];
    for axis in 0..3 {
        let mut lo = ijk;
        let mut hi = ijk;
        if ijk[axis] > 0 {
            lo[axis] -= 1;
        }
        if ijk[axis] + 1 < dims[axis] {
            hi[axis] += 1;
        }
        let steps = (hi[axis] - lo[axis]) as f32;
        if steps > 0.0 {
            g[axis] = (volume.at(hi[0], hi[1], hi[2]) - volume.at(lo[0], lo[1], lo[2]))
                / (steps * spacing[axis]);
        }
    }
    Vec3::from_array(g)
}

fn edge_normal(volume: &Volume, ijk: [usize; 3], samples: &[f32; 8], edge: u8, iso: Scalar) -> Vec3 {
    let (a, b) = CASE_EDGES[edge as usize];
    let (va, vb) = (samples[a as usize], samples[b as usize]);
    let t = if (vb - va).abs() > f32::EPSILON {
        (iso - va) / (vb - va)
    } else {
        0.5
    };
    let at = |corner: u8| {
        let o = corner_offset(corner);
        [ijk[0] + o[0], ijk[1] + o[1], ijk[2] + o[2]]
    };
    // normals point down the gradient, away from the inside region
    (-gradient(volume, at(a)).lerp(gradient(volume, at(b)), t)).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{staged, Dims, UniformGrid};

    fn ball(n: usize) -> Volume {
        let c = (n as f32 - 1.0) / 2.0;
        Volume::from_fn(UniformGrid::new(Dims::new(n, n, n)), |p| c - p.distance(Vec3::splat(c)))
    }

    #[test]
    fn reference_contour_matches_resolved_staged_contour() {
        let vol = ball(14);
        let reference = marching_cubes_with_normals(&vol, 3.0).unwrap();
        let class = staged::classify_marching_cubes(&vol, 3.0).unwrap();
        let staged = staged::generate_marching_cubes(&vol, 3.0, &class, true);
        assert_eq!(reference.triangle_count(), staged.triangle_count());
        assert_eq!(reference.point_count(), staged.point_count());
        assert_eq!(reference.normals.len(), reference.point_count());
        assert_eq!(reference.open_edge_count(), 0);
    }

    #[test]
    fn gradient_normals_point_outward_on_a_ball() {
        let vol = ball(14);
        let mesh = marching_cubes_with_normals(&vol, 3.0).unwrap();
        let center = Vec3::splat(6.5);
        for (p, n) in mesh.points.iter().zip(&mesh.normals) {
            assert!((*p - center).dot(*n) > 0.0);
        }
    }

    #[test]
    fn threshold_merges_shared_corners() {
        let vol = Volume::from_fn(UniformGrid::new(Dims::new(3, 2, 2)), |_| 1.0);
        let mesh = threshold(&vol, 0.0, 2.0).unwrap();
        assert_eq!(mesh.cell_count(), 2);
        assert_eq!(mesh.point_count(), 12);
    }

    #[test]
    fn polygon_normals_are_unit_or_zero() {
        let vol = ball(10);
        let mesh = marching_cubes_with_normals(&vol, 2.0).unwrap();
        for n in polygon_point_normals(&mesh) {
            assert!((n.length() - 1.0).abs() < 1e-3 || n == Vec3::ZERO);
        }
    }
}
