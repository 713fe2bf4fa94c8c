#![warn(non_snake_case)]
//! # mesh_tiler
//!
//! Splits one mesh per level of detail into spatial tiles ready for a
//! streaming tileset. Usage:
//!
//! ```text
//! mesh_tiler <config.json>
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=info` (or `debug`) to
//! follow progress.

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::Serialize;

use mesh_tiler::codec::{ImageRepacker, ObjCodec};
use mesh_tiler::config::TilerConfig;
use mesh_tiler::geometry::GpsCoords;
use mesh_tiler::lod::{LodOrchestrator, LodResult, TileBounds};
use mesh_tiler::TilerError;

/// Per-LOD tile bounds handed to manifest generation.
#[derive(Serialize)]
struct TileIndex<'a> {
    origin: Option<GpsCoords>,
    origin_ecef: Option<[f64; 3]>,
    lods: Vec<LodEntry<'a>>,
}

#[derive(Serialize)]
struct LodEntry<'a> {
    lod: usize,
    source: &'a Path,
    edge_splits: usize,
    tiles: &'a TileBounds,
}

fn write_index(path: &Path, origin: Option<GpsCoords>, results: &[LodResult]) -> Result<(), TilerError> {
    let index = TileIndex {
        origin,
        origin_ecef: origin.map(|o| o.to_ecef()),
        lods: results
            .iter()
            .map(|r| LodEntry {
                lod: r.lod,
                source: &r.source,
                edge_splits: r.stats.edge_splits,
                tiles: &r.tiles,
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&index)
        .map_err(|e| TilerError::Config(format!("cannot serialize tile index: {e}")))?;
    fs::write(path, json).map_err(|e| TilerError::io(path, e))
}

fn run(config_path: &Path) -> Result<(), TilerError> {
    let config = TilerConfig::load(config_path)?;
    info!(
        "Tiling {} LOD(s) into {} (divisions {}, split point {})",
        config.sources.len(),
        config.output.display(),
        config.divisions,
        config.split_point
    );

    fs::create_dir_all(&config.output).map_err(|e| TilerError::io(&config.output, e))?;

    let codec = ObjCodec::new(ImageRepacker::new(config.jpeg_quality));
    let orchestrator =
        LodOrchestrator::new(codec, config.split_options()).keep_empty_tiles(config.keep_empty_tiles);
    let results = orchestrator.split(&config.sources, &config.output)?;

    if let Some(origin) = config.origin {
        let [x, y, z] = origin.to_ecef();
        info!("Origin {} -> ECEF ({:.3}, {:.3}, {:.3})", origin, x, y, z);
    }

    let index_path: PathBuf = config.output.join("tiles.json");
    write_index(&index_path, config.origin, &results)?;
    info!("Tile index written to {}", index_path.display());
    Ok(())
}

/// Expects exactly one argument, the config path.
fn run_with_args(args: &[String]) -> Result<(), TilerError> {
    match args {
        [_, config] => run(Path::new(config)),
        _ => Err(TilerError::Config(format!(
            "usage: {} <config.json>",
            args.first().map_or("mesh_tiler", String::as_str)
        ))),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging.
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if let Err(err) = run_with_args(&args) {
        error!("{}", err);
        let mut cause = err.source();
        while let Some(inner) = cause {
            error!("  caused by: {}", inner);
            cause = inner.source();
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_argument_count_is_a_usage_error() {
        for args in [vec![], vec!["mesh_tiler".to_string()], vec!["mesh_tiler".into(), "a".into(), "b".into()]] {
            match run_with_args(&args) {
                Err(TilerError::Config(message)) => assert!(message.starts_with("usage:")),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_config_is_reported_not_exited() {
        let args = vec!["mesh_tiler".to_string(), "/nonexistent/mesh_tiler.json".to_string()];
        assert!(run_with_args(&args).is_err());
    }
}
