//! Marching-cubes case table.
//!
//! Corner `c` of a cell sits at offset `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
//! A corner is *inside* when its sample is `>= iso`; the case index has bit
//! `c` set for every inside corner.
//!
//! The table is built once by tracing the iso-contour over the six faces of
//! the cube. On each face a segment runs from every edge where the contour
//! leaves the inside region to the edge where it entered it, walking the face
//! counter-clockwise as seen from outside. Ambiguous faces therefore always
//! separate their inside corners, and since that choice depends only on the
//! face's four corners the neighbouring cell makes the same one.

use glam::Vec3;
use std::sync::OnceLock;

use crate::grid::{UniformGrid, Volume};

/// Corner pair joined by each of the twelve cube edges.
pub const CASE_EDGES: [(u8, u8); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Axis (0 = x, 1 = y, 2 = z) each edge runs along.
pub const EDGE_AXIS: [u8; 12] = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];

/// Cube faces, corners counter-clockwise as seen from outside the cell.
const FACES: [[u8; 4]; 6] = [
    [0, 4, 6, 2],
    [1, 3, 7, 5],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 2, 3, 1],
    [4, 5, 7, 6],
];

#[inline]
pub fn corner_offset(corner: u8) -> [usize; 3] {
    [
        (corner & 1) as usize,
        ((corner >> 1) & 1) as usize,
        ((corner >> 2) & 1) as usize,
    ]
}

/// Case index of a cell from its eight corner samples.
#[inline]
pub fn case_index(samples: &[f32; 8], iso: f32) -> u8 {
    let mut case = 0u8;
    for (c, &v) in samples.iter().enumerate() {
        if v >= iso {
            case |= 1 << c;
        }
    }
    case
}

/// The eight corner samples of a cell, in corner order.
#[inline]
pub fn cell_samples(volume: &Volume, cell: usize) -> [f32; 8] {
    let values = volume.values();
    volume.grid().cell_points(cell).map(|p| values[p])
}

/// Key of a grid edge, shared by every cell that touches it:
/// `3 * point_id + axis` of the edge's lower endpoint.
#[inline]
pub fn edge_key(grid: &UniformGrid, ijk: [usize; 3], edge: u8) -> u64 {
    let (lower, _) = CASE_EDGES[edge as usize];
    let o = corner_offset(lower);
    let point = grid.point_id(ijk[0] + o[0], ijk[1] + o[1], ijk[2] + o[2]);
    point as u64 * 3 + EDGE_AXIS[edge as usize] as u64
}

/// Position where the iso-contour crosses `edge` of the cell at `ijk`.
///
/// Always interpolates from the lower endpoint so that neighbouring cells
/// produce bit-identical points for a shared edge.
#[inline]
pub fn edge_point(grid: &UniformGrid, ijk: [usize; 3], samples: &[f32; 8], edge: u8, iso: f32) -> Vec3 {
    let (a, b) = CASE_EDGES[edge as usize];
    let (va, vb) = (samples[a as usize], samples[b as usize]);
    let t = if (vb - va).abs() > f32::EPSILON {
        (iso - va) / (vb - va)
    } else {
        0.5
    };
    let oa = corner_offset(a);
    let ob = corner_offset(b);
    let pa = grid.position(ijk[0] + oa[0], ijk[1] + oa[1], ijk[2] + oa[2]);
    let pb = grid.position(ijk[0] + ob[0], ijk[1] + ob[1], ijk[2] + ob[2]);
    pa.lerp(pb, t)
}

/// Triangles (as triples of edge ids) for each of the 256 cases.
pub struct CaseTable {
    triangles: Vec<Vec<[u8; 3]>>,
}

impl CaseTable {
    /// The process-wide table, built on first use.
    pub fn get() -> &'static CaseTable {
        static TABLE: OnceLock<CaseTable> = OnceLock::new();
        TABLE.get_or_init(CaseTable::build)
    }

    #[inline]
    pub fn triangles(&self, case: u8) -> &[[u8; 3]] {
        &self.triangles[case as usize]
    }

    #[inline]
    pub fn triangle_count(&self, case: u8) -> usize {
        self.triangles[case as usize].len()
    }

    /// Largest triangle count over all cases.
    pub fn max_triangles(&self) -> usize {
        self.triangles.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn build() -> Self {
        Self {
            triangles: (0..=255u8).map(triangulate_case).collect(),
        }
    }
}

fn edge_between(a: u8, b: u8) -> u8 {
    CASE_EDGES
        .iter()
        .position(|&(x, y)| (x == a && y == b) || (x == b && y == a))
        .expect("face corners are always joined by a cube edge") as u8
}

fn triangulate_case(case: u8) -> Vec<[u8; 3]> {
    let inside = |corner: u8| case & (1 << corner) != 0;

    // successor of each crossed edge along its contour loop
    let mut next: [Option<u8>; 12] = [None; 12];
    for face in FACES {
        let edges: [u8; 4] = std::array::from_fn(|k| edge_between(face[k], face[(k + 1) % 4]));
        let exits = |k: usize| inside(face[k]) && !inside(face[(k + 1) % 4]);
        let entries = |k: usize| !inside(face[k]) && inside(face[(k + 1) % 4]);
        for k in 0..4 {
            if !exits(k) {
                continue;
            }
            let mut j = (k + 3) % 4;
            while !entries(j) {
                j = (j + 3) % 4;
            }
            next[edges[k] as usize] = Some(edges[j]);
        }
    }

    let mut visited = [false; 12];
    let mut triangles = Vec::new();
    for start in 0..12u8 {
        if visited[start as usize] || next[start as usize].is_none() {
            continue;
        }
        let mut polygon = Vec::with_capacity(6);
        let mut edge = start;
        while !visited[edge as usize] {
            visited[edge as usize] = true;
            polygon.push(edge);
            match next[edge as usize] {
                Some(n) => edge = n,
                None => break,
            }
        }
        for i in 1..polygon.len().saturating_sub(1) {
            triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn crossed_edges(case: u8) -> BTreeSet<u8> {
        CASE_EDGES
            .iter()
            .enumerate()
            .filter(|(_, &(a, b))| ((case >> a) & 1) != ((case >> b) & 1))
            .map(|(e, _)| e as u8)
            .collect()
    }

    #[test]
    fn empty_and_full_cases_have_no_triangles() {
        let table = CaseTable::get();
        assert!(table.triangles(0).is_empty());
        assert!(table.triangles(255).is_empty());
    }

    #[test]
    fn single_corner_case_is_one_triangle() {
        let table = CaseTable::get();
        let tris = table.triangles(0b0000_0001);
        assert_eq!(tris.len(), 1);
        let edges: BTreeSet<u8> = tris[0].iter().copied().collect();
        assert_eq!(edges, BTreeSet::from([0, 4, 8]));
    }

    #[test]
    fn every_case_touches_exactly_its_crossed_edges() {
        let table = CaseTable::get();
        for case in 0..=255u8 {
            let used: BTreeSet<u8> = table
                .triangles(case)
                .iter()
                .flat_map(|t| t.iter().copied())
                .collect();
            assert_eq!(used, crossed_edges(case), "case {case:#010b}");
        }
    }

    #[test]
    fn half_cube_case_is_a_quad() {
        // corners 0..3 inside: the plane z = 1/2
        let table = CaseTable::get();
        assert_eq!(table.triangle_count(0b0000_1111), 2);
        assert!(table.max_triangles() <= 10);
    }

    #[test]
    fn case_index_sets_inside_bits() {
        let samples = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0];
        assert_eq!(case_index(&samples, 0.5), 0b1000_0001);
    }
}
