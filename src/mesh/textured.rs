// src/mesh/textured.rs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{Vertex2, Vertex3};

/// How a textured tile's images are re-encoded when it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TexturesStrategy {
    /// Keep full quality (lossless re-encode).
    #[default]
    Repack,
    /// Trade quality for payload size (lossy re-encode).
    RepackCompressed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Diffuse texture, resolved against the source file's directory.
    pub texture: Option<PathBuf>,
    /// Diffuse colour (`Kd`).
    pub diffuse: Option<[f64; 3]>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Material {
            name: name.into(),
            texture: None,
            diffuse: None,
        }
    }
}

/// A triangle of a textured mesh: three position indices, three UV indices
/// and the material it is painted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturedFace {
    pub vertices: [usize; 3],
    pub uvs: [usize; 3],
    pub material: usize,
}

impl TexturedFace {
    pub fn new(vertices: [usize; 3], uvs: [usize; 3], material: usize) -> Self {
        TexturedFace {
            vertices,
            uvs,
            material,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TexturedMesh {
    pub name: String,
    pub vertices: Vec<Vertex3>,
    pub uvs: Vec<Vertex2>,
    pub faces: Vec<TexturedFace>,
    pub materials: Vec<Material>,
    /// Chosen by the orchestrator right before the tile is written.
    pub textures_strategy: TexturesStrategy,
}

impl TexturedMesh {
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<Vertex3>,
        uvs: Vec<Vertex2>,
        faces: Vec<TexturedFace>,
        materials: Vec<Material>,
    ) -> Self {
        TexturedMesh {
            name: name.into(),
            vertices,
            uvs,
            faces,
            materials,
            textures_strategy: TexturesStrategy::default(),
        }
    }

    /// Drops materials no face references and renumbers the rest, keeping
    /// their relative order.
    pub fn compact_materials(&mut self) {
        let mut used = vec![false; self.materials.len()];
        for face in &self.faces {
            if let Some(slot) = used.get_mut(face.material) {
                *slot = true;
            }
        }
        if used.iter().all(|u| *u) {
            return;
        }

        let mut remap = vec![usize::MAX; self.materials.len()];
        let mut kept = Vec::new();
        for (index, material) in self.materials.drain(..).enumerate() {
            if used[index] {
                remap[index] = kept.len();
                kept.push(material);
            }
        }
        for face in &mut self.faces {
            face.material = remap[face.material];
        }
        self.materials = kept;
    }
}
