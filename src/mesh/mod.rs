// src/mesh/mod.rs
// Triangle meshes, plain or textured, and clipping them against an
// axis-aligned plane.

pub(crate) mod clip;
mod textured;

pub use clip::PlaneSide;
pub use textured::{Material, TexturedFace, TexturedMesh, TexturesStrategy};

use crate::error::{Result, TilerError};
use crate::geometry::{triangle_area, Axis, Box3, Vertex3};
use clip::{clip_triangle, Corner, SideBuilder};

/// Name given to a freshly loaded mesh; tiles extend it with their path.
pub const ROOT_NAME: &str = "Mesh";

/// A triangle of a geometry-only mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub vertices: [usize; 3],
}

impl Face {
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Face { vertices: [a, b, c] }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex3>,
    pub faces: Vec<Face>,
}

impl MeshData {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex3>, faces: Vec<Face>) -> Self {
        MeshData {
            name: name.into(),
            vertices,
            faces,
        }
    }
}

/// A mesh is either geometry only or textured; clipping and the derived
/// quantities are shared, the repack strategy only exists on textured meshes.
#[derive(Debug, Clone, PartialEq)]
pub enum Mesh {
    Plain(MeshData),
    Textured(TexturedMesh),
}

/// The two halves of a mesh clipped against a plane.
#[derive(Debug)]
pub struct ClipOutput {
    pub low: Mesh,
    pub high: Mesh,
    /// Vertices introduced where edges crossed the plane.
    pub edge_splits: usize,
}

impl Mesh {
    pub fn name(&self) -> &str {
        match self {
            Mesh::Plain(m) => &m.name,
            Mesh::Textured(m) => &m.name,
        }
    }

    pub fn vertices(&self) -> &[Vertex3] {
        match self {
            Mesh::Plain(m) => &m.vertices,
            Mesh::Textured(m) => &m.vertices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices().len()
    }

    pub fn face_count(&self) -> usize {
        match self {
            Mesh::Plain(m) => m.faces.len(),
            Mesh::Textured(m) => m.faces.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.face_count() == 0
    }

    pub fn is_textured(&self) -> bool {
        matches!(self, Mesh::Textured(_))
    }

    /// Sets the repack strategy; geometry-only meshes have no textures and
    /// ignore it.
    pub fn set_textures_strategy(&mut self, strategy: TexturesStrategy) {
        if let Mesh::Textured(m) = self {
            m.textures_strategy = strategy;
        }
    }

    /// Position triples of every face, in face order.
    pub fn triangles(&self) -> impl Iterator<Item = [Vertex3; 3]> + '_ {
        let vertices = self.vertices();
        let faces: Box<dyn Iterator<Item = [usize; 3]> + '_> = match self {
            Mesh::Plain(m) => Box::new(m.faces.iter().map(|f| f.vertices)),
            Mesh::Textured(m) => Box::new(m.faces.iter().map(|f| f.vertices)),
        };
        faces.map(move |[a, b, c]| [vertices[a], vertices[b], vertices[c]])
    }

    /// Bounding box of the vertices, computed on every call.
    pub fn bounds(&self) -> Option<Box3> {
        Box3::from_points(self.vertices())
    }

    /// Mean vertex position.
    pub fn barycenter(&self) -> Option<Vertex3> {
        let vertices = self.vertices();
        if vertices.is_empty() {
            return None;
        }
        let n = vertices.len() as f64;
        let sum = vertices.iter().fold(Vertex3::default(), |acc, v| {
            Vertex3::new(acc.x + v.x, acc.y + v.y, acc.z + v.z)
        });
        Some(Vertex3::new(sum.x / n, sum.y / n, sum.z / n))
    }

    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|[a, b, c]| triangle_area(&a, &b, &c)).sum()
    }

    /// Checks every face index (and UV/material index) against its table.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertex_count();
        let check = |kind: &str, face: usize, index: usize, len: usize| -> Result<()> {
            if index >= len {
                return Err(TilerError::Topology(format!(
                    "face {face} of '{}' references {kind} {index} but only {len} exist",
                    self.name()
                )));
            }
            Ok(())
        };

        match self {
            Mesh::Plain(m) => {
                for (i, face) in m.faces.iter().enumerate() {
                    for &v in &face.vertices {
                        check("vertex", i, v, vertex_count)?;
                    }
                }
            }
            Mesh::Textured(m) => {
                for (i, face) in m.faces.iter().enumerate() {
                    for &v in &face.vertices {
                        check("vertex", i, v, vertex_count)?;
                    }
                    for &t in &face.uvs {
                        check("uv", i, t, m.uvs.len())?;
                    }
                    check("material", i, face.material, m.materials.len())?;
                }
            }
        }
        Ok(())
    }

    /// Clips the mesh against the plane `axis = coordinate`. The low child
    /// holds everything at or below the plane, the high child everything at
    /// or above it; children are named `<name>-<axis>L` and `<name>-<axis>R`.
    pub fn clip(&self, axis: Axis, coordinate: f64) -> Result<ClipOutput> {
        self.validate()?;

        let low_name = format!("{}-{}L", self.name(), axis.tag());
        let high_name = format!("{}-{}R", self.name(), axis.tag());

        match self {
            Mesh::Plain(m) => {
                let mut low = SideBuilder::new(&m.vertices, &[]);
                let mut high = SideBuilder::new(&m.vertices, &[]);
                let mut edge_splits = 0;
                for face in &m.faces {
                    let corners = face.vertices.map(|vertex| Corner { vertex, uv: None });
                    edge_splits +=
                        clip_triangle(corners, None, axis, coordinate, &mut low, &mut high);
                }
                Ok(ClipOutput {
                    low: Mesh::Plain(plain_from(low, low_name)),
                    high: Mesh::Plain(plain_from(high, high_name)),
                    edge_splits,
                })
            }
            Mesh::Textured(m) => {
                let mut low = SideBuilder::new(&m.vertices, &m.uvs);
                let mut high = SideBuilder::new(&m.vertices, &m.uvs);
                let mut edge_splits = 0;
                for face in &m.faces {
                    let corners = [0, 1, 2].map(|k| Corner {
                        vertex: face.vertices[k],
                        uv: Some(face.uvs[k]),
                    });
                    edge_splits += clip_triangle(
                        corners,
                        Some(face.material),
                        axis,
                        coordinate,
                        &mut low,
                        &mut high,
                    );
                }
                Ok(ClipOutput {
                    low: Mesh::Textured(textured_from(low, low_name, m)?),
                    high: Mesh::Textured(textured_from(high, high_name, m)?),
                    edge_splits,
                })
            }
        }
    }
}

fn plain_from(side: SideBuilder<'_>, name: String) -> MeshData {
    let faces = side
        .faces
        .iter()
        .map(|f| Face {
            vertices: f.vertices,
        })
        .collect();
    MeshData::new(name, side.vertices, faces)
}

fn textured_from(side: SideBuilder<'_>, name: String, parent: &TexturedMesh) -> Result<TexturedMesh> {
    let mut faces = Vec::with_capacity(side.faces.len());
    for f in &side.faces {
        match (f.uvs, f.material) {
            (Some(uvs), Some(material)) => faces.push(TexturedFace::new(f.vertices, uvs, material)),
            _ => {
                return Err(TilerError::Topology(format!(
                    "textured face of '{name}' lost its uv or material while clipping"
                )))
            }
        }
    }

    let mut mesh = TexturedMesh::new(name, side.vertices, side.uvs, faces, parent.materials.clone());
    mesh.textures_strategy = parent.textures_strategy;
    mesh.compact_materials();
    Ok(mesh)
}
