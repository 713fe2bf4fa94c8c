// src/config.rs
// JSON run configuration for the tiler binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::error::{Result, TilerError};
use crate::geometry::{Box3, GpsCoords};
use crate::split::{AxisMode, SplitOptions, SplitPointStrategy, MAX_DIVISIONS};

fn default_divisions() -> u32 {
    2
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilerConfig {
    /// One source mesh per LOD, highest fidelity first.
    pub sources: Vec<PathBuf>,
    /// Destination folder; tiles go to `<output>/LOD-<n>/`.
    pub output: PathBuf,
    #[serde(default = "default_divisions")]
    pub divisions: u32,
    #[serde(default)]
    pub z_split: bool,
    /// Shared region for all LODs.
    #[serde(default)]
    pub bounds: Option<Box3>,
    #[serde(default)]
    pub split_point: SplitPointStrategy,
    #[serde(default)]
    pub keep_empty_tiles: bool,
    /// Geographic position of the model origin.
    #[serde(default)]
    pub origin: Option<GpsCoords>,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl TilerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| TilerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| TilerError::io(path, e))?;
        let config = Self::from_json(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(TilerError::Config("at least one source mesh is required".into()));
        }
        if self.divisions > MAX_DIVISIONS {
            return Err(TilerError::Config(format!(
                "divisions {} exceeds the maximum of {}",
                self.divisions, MAX_DIVISIONS
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(TilerError::Config(format!(
                "jpeg_quality {} must lie in 1..=100",
                self.jpeg_quality
            )));
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.is_valid() {
                return Err(TilerError::Config(format!(
                    "bounds min {:?} exceeds max {:?}",
                    bounds.min, bounds.max
                )));
            }
        }
        if let Some(origin) = &self.origin {
            if !origin.is_valid() {
                return Err(TilerError::Config(format!("origin {origin} is out of range")));
            }
        }
        Ok(())
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            divisions: self.divisions,
            axis_mode: AxisMode::from_z_split(self.z_split),
            strategy: self.split_point,
            bounds: self.bounds,
        }
    }
}
