// src/split/mod.rs
// Recursive subdivision of a mesh into tiles.

mod splitter;
mod tile;

pub use splitter::{RecursiveSplitter, SplitStats};
pub use tile::{CancelToken, Tile, TileCollector};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TilerError;
use crate::geometry::{Axis, Box3};

/// Deepest subdivision accepted from configuration (8^8 tiles in XYZ mode).
pub const MAX_DIVISIONS: u32 = 8;

/// Where a node is cut when no fixed bounds are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitPointStrategy {
    /// Midpoint of the node mesh's bounding box.
    AbsoluteCenter,
    /// Mean of the node mesh's vertex positions.
    #[default]
    VertexBaricenter,
}

impl FromStr for SplitPointStrategy {
    type Err = TilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AbsoluteCenter" => Ok(SplitPointStrategy::AbsoluteCenter),
            "VertexBaricenter" => Ok(SplitPointStrategy::VertexBaricenter),
            other => Err(TilerError::Config(format!(
                "unknown split point strategy '{other}' (expected AbsoluteCenter or VertexBaricenter)"
            ))),
        }
    }
}

impl fmt::Display for SplitPointStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitPointStrategy::AbsoluteCenter => "AbsoluteCenter",
            SplitPointStrategy::VertexBaricenter => "VertexBaricenter",
        };
        f.write_str(name)
    }
}

/// Axes cut at every recursion level, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisMode {
    #[default]
    XY,
    XYZ,
}

impl AxisMode {
    pub fn from_z_split(z_split: bool) -> Self {
        if z_split {
            AxisMode::XYZ
        } else {
            AxisMode::XY
        }
    }

    pub fn axes(&self) -> &'static [Axis] {
        match self {
            AxisMode::XY => &[Axis::X, Axis::Y],
            AxisMode::XYZ => &[Axis::X, Axis::Y, Axis::Z],
        }
    }

    /// Number of leaves produced by `divisions` levels.
    pub fn leaf_count(&self, divisions: u32) -> usize {
        1usize << (divisions as usize * self.axes().len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitOptions {
    pub divisions: u32,
    pub axis_mode: AxisMode,
    pub strategy: SplitPointStrategy,
    /// Shared region for every LOD; when set it alone decides the cuts.
    pub bounds: Option<Box3>,
}

impl SplitOptions {
    pub fn new(divisions: u32, z_split: bool) -> Self {
        SplitOptions {
            divisions,
            axis_mode: AxisMode::from_z_split(z_split),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SplitPointStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_bounds(mut self, bounds: Option<Box3>) -> Self {
        self.bounds = bounds;
        self
    }
}
