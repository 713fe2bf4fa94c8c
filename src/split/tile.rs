// src/split/tile.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, TilerError};
use crate::geometry::Box3;
use crate::mesh::Mesh;

/// A leaf of the subdivision: the clipped mesh, its tree-path name and the
/// region of space it was cut from.
#[derive(Debug, Clone)]
pub struct Tile {
    pub name: String,
    pub mesh: Mesh,
    pub bounds: Box3,
}

/// Append-only tile sink shared by concurrent recursion branches.
#[derive(Debug, Default)]
pub struct TileCollector {
    tiles: Mutex<Vec<Tile>>,
}

impl TileCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tile: Tile) {
        self.tiles.lock().push(tile);
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }

    /// Consumes the collector, returning the tiles sorted by name.
    pub fn into_tiles(self) -> Vec<Tile> {
        let mut tiles = self.tiles.into_inner();
        tiles.sort_by(|a, b| a.name.cmp(&b.name));
        tiles
    }
}

/// Cooperative cancellation flag shared between pipelines. A child token
/// observes its parent but cancelling the child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.parent.as_ref().map_or(false, |p| p.is_cancelled())
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TilerError::Cancelled)
        } else {
            Ok(())
        }
    }
}
