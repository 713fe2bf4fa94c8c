// src/error.rs

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::Axis;

/// Which part of a LOD pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Split,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Split => "split",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TilerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {} at line {line}: {message}", .path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("cannot repack texture {}: {source}", .path.display())]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("split coordinate {coordinate} on {axis} lies outside [{min}, {max}]")]
    SplitOutOfRange {
        axis: Axis,
        coordinate: f64,
        min: f64,
        max: f64,
    },

    #[error("mesh topology violated: {0}")]
    Topology(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("LOD {lod} ({}) failed during {stage}: {source}", .source_file.display())]
    Pipeline {
        lod: usize,
        source_file: PathBuf,
        stage: Stage,
        #[source]
        source: Box<TilerError>,
    },
}

impl TilerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TilerError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when this error (or the pipeline failure it wraps) is only a
    /// consequence of another pipeline cancelling the run.
    pub fn is_cancelled(&self) -> bool {
        match self {
            TilerError::Cancelled => true,
            TilerError::Pipeline { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TilerError>;
