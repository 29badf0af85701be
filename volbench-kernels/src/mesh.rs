//! Output geometry produced by the kernels.

use glam::Vec3;
use std::collections::HashMap;

/// Triangle soup or indexed triangle mesh produced by marching cubes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub points: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-triangle or per-point normals, empty until a normal pass ran.
    pub normals: Vec<Vec3>,
}

impl TriangleMesh {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of undirected edges used by exactly one triangle.
    ///
    /// Zero for a closed surface with merged points.
    pub fn open_edge_count(&self) -> usize {
        let mut uses: HashMap<(u32, u32), usize> = HashMap::new();
        for t in &self.triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *uses.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        uses.values().filter(|&&n| n == 1).count()
    }

    /// Number of directed edges that appear more than once.
    ///
    /// Zero when every triangle is wound consistently with its neighbours.
    pub fn misoriented_edge_count(&self) -> usize {
        let mut uses: HashMap<(u32, u32), usize> = HashMap::new();
        for t in &self.triangles {
            for e in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *uses.entry(e).or_default() += 1;
            }
        }
        uses.values().filter(|&&n| n > 1).count()
    }
}

/// Hexahedral cells kept by a threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HexMesh {
    pub points: Vec<Vec3>,
    pub cells: Vec<[u32; 8]>,
}

impl HexMesh {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}
