// src/codec/mod.rs
// Collaborators the orchestrator delegates file work to.

mod obj;
mod texture;

pub use obj::ObjCodec;
pub use texture::{ImageRepacker, DEFAULT_JPEG_QUALITY};

use std::path::Path;

use crate::error::Result;
use crate::mesh::{Mesh, TexturesStrategy};

/// Reads source meshes and writes tiles.
pub trait MeshCodec: Send + Sync {
    /// Fails with `TilerError::Decode` on malformed input.
    fn load(&self, path: &Path) -> Result<Mesh>;

    /// Creates or overwrites `path`. The parent directory must exist.
    fn write(&self, mesh: &Mesh, path: &Path) -> Result<()>;

    /// File extension of written tiles.
    fn extension(&self) -> &str {
        "obj"
    }
}

/// Re-encodes the textures of a textured tile.
pub trait TextureRepacker: Send + Sync {
    /// Writes a repacked copy of `source` into `dest_dir` using `stem` as the
    /// file stem and returns the written file name.
    fn repack(
        &self,
        source: &Path,
        strategy: TexturesStrategy,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<String>;
}
