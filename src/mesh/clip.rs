// src/mesh/clip.rs
// Plane/triangle clipping shared by both mesh variants.

use std::collections::HashMap;

use crate::geometry::{Axis, Vertex2, Vertex3, EPSILON};

/// Which side of a split plane a vertex lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    Low,
    On,
    High,
}

impl PlaneSide {
    /// Classifies a signed offset from the plane using the `EPSILON` band.
    pub fn classify(offset: f64) -> Self {
        if offset < -EPSILON {
            PlaneSide::Low
        } else if offset > EPSILON {
            PlaneSide::High
        } else {
            PlaneSide::On
        }
    }
}

/// One triangle corner in the parent mesh: a position index and, for
/// textured meshes, a UV index.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Corner {
    pub vertex: usize,
    pub uv: Option<usize>,
}

/// A corner of an output triangle: either carried over from the parent or
/// introduced where an edge crosses the plane.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ClipPoint {
    Existing(Corner),
    Created {
        position: Vertex3,
        uv: Option<Vertex2>,
    },
}

#[derive(Debug)]
pub(crate) struct BuiltFace {
    pub vertices: [usize; 3],
    pub uvs: Option<[usize; 3]>,
    pub material: Option<usize>,
}

/// Accumulates the geometry of one child. Parent vertices are copied in on
/// first use; created vertices are always appended.
pub(crate) struct SideBuilder<'a> {
    src_vertices: &'a [Vertex3],
    src_uvs: &'a [Vertex2],
    vertex_map: HashMap<usize, usize>,
    uv_map: HashMap<usize, usize>,
    pub vertices: Vec<Vertex3>,
    pub uvs: Vec<Vertex2>,
    pub faces: Vec<BuiltFace>,
}

impl<'a> SideBuilder<'a> {
    pub fn new(src_vertices: &'a [Vertex3], src_uvs: &'a [Vertex2]) -> Self {
        SideBuilder {
            src_vertices,
            src_uvs,
            vertex_map: HashMap::new(),
            uv_map: HashMap::new(),
            vertices: Vec::new(),
            uvs: Vec::new(),
            faces: Vec::new(),
        }
    }

    fn add_point(&mut self, point: ClipPoint) -> (usize, Option<usize>) {
        match point {
            ClipPoint::Existing(corner) => {
                let vertex = match self.vertex_map.get(&corner.vertex) {
                    Some(&index) => index,
                    None => {
                        self.vertices.push(self.src_vertices[corner.vertex]);
                        let index = self.vertices.len() - 1;
                        self.vertex_map.insert(corner.vertex, index);
                        index
                    }
                };
                let uv = corner.uv.map(|src| match self.uv_map.get(&src) {
                    Some(&index) => index,
                    None => {
                        self.uvs.push(self.src_uvs[src]);
                        let index = self.uvs.len() - 1;
                        self.uv_map.insert(src, index);
                        index
                    }
                });
                (vertex, uv)
            }
            ClipPoint::Created { position, uv } => {
                self.vertices.push(position);
                let vertex = self.vertices.len() - 1;
                let uv = uv.map(|uv| {
                    self.uvs.push(uv);
                    self.uvs.len() - 1
                });
                (vertex, uv)
            }
        }
    }

    pub fn push(&mut self, triangle: [ClipPoint; 3], material: Option<usize>) {
        let (a, ta) = self.add_point(triangle[0]);
        let (b, tb) = self.add_point(triangle[1]);
        let (c, tc) = self.add_point(triangle[2]);
        let uvs = match (ta, tb, tc) {
            (Some(ta), Some(tb), Some(tc)) => Some([ta, tb, tc]),
            _ => None,
        };
        self.faces.push(BuiltFace {
            vertices: [a, b, c],
            uvs,
            material,
        });
    }
}

/// Clips one triangle against the plane `axis = coordinate`, pushing the
/// pieces into `low` and `high`. Returns the number of crossing vertices
/// introduced (0, 1 or 2). Corner order, and so winding, is preserved.
///
/// Indices in `corners` must be valid for the builders' source slices.
pub(crate) fn clip_triangle(
    corners: [Corner; 3],
    material: Option<usize>,
    axis: Axis,
    coordinate: f64,
    low: &mut SideBuilder<'_>,
    high: &mut SideBuilder<'_>,
) -> usize {
    let positions = low.src_vertices;
    let uvs = low.src_uvs;
    let offsets = corners.map(|c| positions[c.vertex].get(axis) - coordinate);
    let sides = offsets.map(PlaneSide::classify);

    let has_low = sides.contains(&PlaneSide::Low);
    let has_high = sides.contains(&PlaneSide::High);
    let existing = corners.map(ClipPoint::Existing);

    if !has_high {
        low.push(existing, material);
        return 0;
    }
    if !has_low {
        high.push(existing, material);
        return 0;
    }

    // Crossing point on the edge between corners i and j, which lie on
    // opposite sides. The low endpoint always drives the interpolation so
    // that neighbouring triangles sharing the edge produce the same point.
    let crossing = |i: usize, j: usize| -> ClipPoint {
        let (from, to) = if sides[i] == PlaneSide::Low { (i, j) } else { (j, i) };
        let t = offsets[from] / (offsets[from] - offsets[to]);
        let position = positions[corners[from].vertex]
            .lerp(&positions[corners[to].vertex], t)
            .with(axis, coordinate);
        let uv = match (corners[from].uv, corners[to].uv) {
            (Some(a), Some(b)) => Some(uvs[a].lerp(&uvs[b], t)),
            _ => None,
        };
        ClipPoint::Created { position, uv }
    };

    let mut push_to = |side: PlaneSide, triangle: [ClipPoint; 3]| {
        if side == PlaneSide::Low {
            low.push(triangle, material);
        } else {
            high.push(triangle, material);
        }
    };

    if let Some(o) = sides.iter().position(|s| *s == PlaneSide::On) {
        // One corner on the plane, the other two on opposite sides: a single
        // edge crosses and each side gets one triangle.
        let (i1, i2) = ((o + 1) % 3, (o + 2) % 3);
        let p = crossing(i1, i2);
        push_to(sides[i1], [existing[o], existing[i1], p]);
        push_to(sides[i2], [existing[o], p, existing[i2]]);
        return 1;
    }

    // Two edges cross: the lone corner keeps one triangle, the opposite
    // side gets the remaining quad as two triangles.
    let alone = (0..3)
        .find(|&i| sides[i] != sides[(i + 1) % 3] && sides[i] != sides[(i + 2) % 3])
        .unwrap_or(0);
    let (i1, i2) = ((alone + 1) % 3, (alone + 2) % 3);
    let p = crossing(alone, i1);
    let q = crossing(i2, alone);

    push_to(sides[alone], [existing[alone], p, q]);
    push_to(sides[i1], [p, existing[i1], existing[i2]]);
    push_to(sides[i1], [p, existing[i2], q]);
    2
}
