// src/lod/mod.rs
// Runs one load -> split -> write pipeline per LOD source, concurrently.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use log::{info, warn};

use crate::codec::MeshCodec;
use crate::error::{Result, Stage, TilerError};
use crate::geometry::Box3;
use crate::mesh::TexturesStrategy;
use crate::split::{CancelToken, RecursiveSplitter, SplitOptions, SplitStats, Tile};

/// Tile name -> bounding box, ordered by name.
pub type TileBounds = BTreeMap<String, Box3>;

/// Outcome of one LOD pipeline.
#[derive(Debug, Clone)]
pub struct LodResult {
    pub lod: usize,
    pub source: PathBuf,
    pub tiles: TileBounds,
    pub stats: SplitStats,
}

/// LOD 0 is the full-fidelity level and keeps lossless textures; every other
/// level is compressed.
pub fn textures_strategy_for(lod: usize) -> TexturesStrategy {
    if lod == 0 {
        TexturesStrategy::Repack
    } else {
        TexturesStrategy::RepackCompressed
    }
}

/// Directory a LOD's tiles are written into.
pub fn lod_dir(dest: &Path, lod: usize) -> PathBuf {
    dest.join(format!("LOD-{lod}"))
}

/// Where a LOD is written while its pipeline runs.
fn staging_dir(dest: &Path, lod: usize) -> PathBuf {
    dest.join(format!(".LOD-{lod}.partial"))
}

/// Moves every staged file into `target`, replacing files of the same name,
/// then removes the staging directory.
fn promote(staging: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target).map_err(|e| TilerError::io(target, e))?;
    let entries = fs::read_dir(staging).map_err(|e| TilerError::io(staging, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TilerError::io(staging, e))?;
        let to = target.join(entry.file_name());
        fs::rename(entry.path(), &to).map_err(|e| TilerError::io(&to, e))?;
    }
    fs::remove_dir(staging).map_err(|e| TilerError::io(staging, e))
}

pub struct LodOrchestrator<C: MeshCodec> {
    codec: C,
    options: SplitOptions,
    keep_empty_tiles: bool,
    cancel: CancelToken,
}

impl<C: MeshCodec> LodOrchestrator<C> {
    pub fn new(codec: C, options: SplitOptions) -> Self {
        LodOrchestrator {
            codec,
            options,
            keep_empty_tiles: false,
            cancel: CancelToken::new(),
        }
    }

    /// Write tiles that ended up with no faces instead of dropping them.
    pub fn keep_empty_tiles(mut self, keep: bool) -> Self {
        self.keep_empty_tiles = keep;
        self
    }

    /// Cancelling this token stops any run in progress. Each run works on a
    /// child of it, so a failed run does not poison the next one.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Tiles every source into `dest/LOD-<index>`. All pipelines run
    /// concurrently and write into per-LOD staging directories; the first
    /// failure cancels the others and discards every staged file. Tiles only
    /// reach `LOD-<index>` once all pipelines have succeeded.
    pub fn split(&self, sources: &[PathBuf], dest: &Path) -> Result<Vec<LodResult>> {
        if sources.is_empty() {
            return Err(TilerError::Config("no source meshes given".into()));
        }

        let staging: Vec<PathBuf> = (0..sources.len()).map(|lod| staging_dir(dest, lod)).collect();
        for dir in &staging {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| TilerError::io(dir, e))?;
            }
            fs::create_dir_all(dir).map_err(|e| TilerError::io(dir, e))?;
        }

        let cancel = self.cancel.child();
        let outcomes: Vec<Result<LodResult>> = thread::scope(|s| {
            let handles: Vec<_> = sources
                .iter()
                .zip(&staging)
                .enumerate()
                .map(|(lod, (source, dir))| {
                    let cancel = &cancel;
                    s.spawn(move || {
                        let result = self.run_pipeline(lod, source, dir, cancel);
                        if result.is_err() {
                            cancel.cancel();
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(lod, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        cancel.cancel();
                        Err(TilerError::Topology(format!("LOD {lod} pipeline panicked")))
                    })
                })
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_error: Option<TilerError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    let replace = match &first_error {
                        None => true,
                        Some(existing) => existing.is_cancelled() && !err.is_cancelled(),
                    };
                    if replace {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            for dir in &staging {
                if let Err(e) = fs::remove_dir_all(dir) {
                    warn!("could not remove partial output {}: {}", dir.display(), e);
                }
            }
            return Err(err);
        }

        for (lod, dir) in staging.iter().enumerate() {
            promote(dir, &lod_dir(dest, lod))?;
        }
        Ok(results)
    }

    fn run_pipeline(&self, lod: usize, source: &Path, dest: &Path, cancel: &CancelToken) -> Result<LodResult> {
        let wrap = move |stage: Stage| {
            move |err: TilerError| TilerError::Pipeline {
                lod,
                source_file: source.to_path_buf(),
                stage,
                source: Box::new(err),
            }
        };

        info!(" -> Loading mesh \"{}\"", source.display());
        let started = Instant::now();
        cancel.check().map_err(wrap(Stage::Load))?;
        let mesh = self.codec.load(source).map_err(wrap(Stage::Load))?;
        info!(
            " ?> Loaded {} vertices, {} faces in {}ms",
            mesh.vertex_count(),
            mesh.face_count(),
            started.elapsed().as_millis()
        );

        info!(
            " -> Splitting with a depth of {}{}",
            self.options.divisions,
            if self.options.axis_mode.axes().len() == 3 { " with z-split" } else { "" }
        );
        let splitter = RecursiveSplitter::new(self.options).with_cancel(cancel.clone());
        let (tiles, stats) = splitter.split(mesh).map_err(wrap(Stage::Split))?;
        info!(
            " ?> Done {} edge splits in {}ms ({:.2} split/ms)",
            stats.edge_splits,
            stats.elapsed.as_millis(),
            stats.splits_per_ms()
        );

        info!(" -> Writing tiles");
        let started = Instant::now();
        let tiles = self
            .write_tiles(tiles, textures_strategy_for(lod), dest, cancel)
            .map_err(wrap(Stage::Write))?;
        info!(" ?> {} tiles written in {}ms", tiles.len(), started.elapsed().as_millis());

        Ok(LodResult {
            lod,
            source: source.to_path_buf(),
            tiles,
            stats,
        })
    }

    fn write_tiles(
        &self,
        tiles: Vec<Tile>,
        strategy: TexturesStrategy,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<TileBounds> {
        let mut bounds = TileBounds::new();
        for mut tile in tiles {
            cancel.check()?;
            if tile.mesh.is_empty() && !self.keep_empty_tiles {
                continue;
            }

            tile.mesh.set_textures_strategy(strategy);
            let path = dest.join(format!("{}.{}", tile.name, self.codec.extension()));
            self.codec.write(&tile.mesh, &path)?;

            // Shared bounds make the region itself the tile's extent, so
            // every LOD reports the same box for the same name.
            let extent = if self.options.bounds.is_some() {
                tile.bounds
            } else {
                tile.mesh.bounds().unwrap_or(tile.bounds)
            };
            bounds.insert(tile.name, extent);
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Vertex2, Vertex3};
    use crate::mesh::{Face, Material, Mesh, MeshData, TexturedFace, TexturedMesh, ROOT_NAME};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves meshes from memory, records every write and drops a marker file
    /// at each written path. `fail_at` makes the n-th write fail once.
    #[derive(Default)]
    struct MemoryCodec {
        sources: HashMap<PathBuf, Mesh>,
        written: Mutex<Vec<(PathBuf, Mesh)>>,
        fail_at: Mutex<Option<usize>>,
    }

    impl MemoryCodec {
        fn with(mut self, path: &str, mesh: Mesh) -> Self {
            self.sources.insert(PathBuf::from(path), mesh);
            self
        }

        fn failing_at(self, write: usize) -> Self {
            *self.fail_at.lock() = Some(write);
            self
        }
    }

    impl MeshCodec for MemoryCodec {
        fn load(&self, path: &Path) -> Result<Mesh> {
            self.sources.get(path).cloned().ok_or_else(|| {
                TilerError::io(path, std::io::Error::from(std::io::ErrorKind::NotFound))
            })
        }

        fn write(&self, mesh: &Mesh, path: &Path) -> Result<()> {
            let mut written = self.written.lock();
            let mut fail_at = self.fail_at.lock();
            if *fail_at == Some(written.len()) {
                *fail_at = None;
                return Err(TilerError::io(
                    path,
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ));
            }
            fs::write(path, mesh.name()).map_err(|e| TilerError::io(path, e))?;
            written.push((path.to_path_buf(), mesh.clone()));
            Ok(())
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mesh_tiler_lod_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    /// A textured n x n grid over [0, size] x [0, size].
    fn textured_grid(n: usize, size: f64) -> Mesh {
        let step = size / n as f64;
        let row = n + 1;
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vertex3::new(x as f64 * step, y as f64 * step, 0.0));
                uvs.push(Vertex2::new(x as f64 / n as f64, y as f64 / n as f64));
            }
        }
        let mut faces = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                faces.push(TexturedFace::new([i, i + 1, i + row + 1], [i, i + 1, i + row + 1], 0));
                faces.push(TexturedFace::new([i, i + row + 1, i + row], [i, i + row + 1, i + row], 0));
            }
        }
        Mesh::Textured(TexturedMesh::new(ROOT_NAME, vertices, uvs, faces, vec![Material::new("ground")]))
    }

    fn corner_triangle() -> Mesh {
        Mesh::Plain(MeshData::new(
            ROOT_NAME,
            vec![
                Vertex3::new(0.0, 0.0, 0.0),
                Vertex3::new(1.0, 0.0, 0.0),
                Vertex3::new(0.0, 1.0, 0.0),
            ],
            vec![Face::new(0, 1, 2)],
        ))
    }

    #[test]
    fn test_strategy_per_lod() {
        assert_eq!(textures_strategy_for(0), TexturesStrategy::Repack);
        assert_eq!(textures_strategy_for(1), TexturesStrategy::RepackCompressed);
        assert_eq!(textures_strategy_for(5), TexturesStrategy::RepackCompressed);
    }

    #[test]
    fn test_lods_share_tile_bounds() {
        let dest = scratch_dir("shared");
        let bounds = Box3::new(Vertex3::new(0.0, 0.0, 0.0), Vertex3::new(4.0, 4.0, 1.0));
        let codec = MemoryCodec::default()
            .with("lod0.obj", textured_grid(8, 4.0))
            .with("lod1.obj", textured_grid(2, 4.0));
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false).with_bounds(Some(bounds)))
            .keep_empty_tiles(true);

        let results = orchestrator
            .split(&[PathBuf::from("lod0.obj"), PathBuf::from("lod1.obj")], &dest)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].lod, 0);
        assert_eq!(results[0].tiles.len(), 4);
        assert_eq!(results[0].tiles, results[1].tiles);
        assert_eq!(
            results[0].tiles["Mesh-XR-YR"],
            Box3::new(Vertex3::new(2.0, 2.0, 0.0), Vertex3::new(4.0, 4.0, 1.0))
        );

        let written = orchestrator.codec.written.lock();
        assert_eq!(written.len(), 8);
        for (path, mesh) in written.iter() {
            let expected = if path.parent() == Some(staging_dir(&dest, 0).as_path()) {
                TexturesStrategy::Repack
            } else {
                TexturesStrategy::RepackCompressed
            };
            match mesh {
                Mesh::Textured(m) => assert_eq!(m.textures_strategy, expected),
                Mesh::Plain(_) => panic!("tile lost its textures"),
            }
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("obj"));
        }
        drop(written);
        assert!(dest.join("LOD-1").join("Mesh-XL-YR.obj").is_file());
        assert!(!staging_dir(&dest, 0).exists());
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn test_empty_tiles_are_dropped_by_default() {
        let dest = scratch_dir("empty");
        let bounds = Box3::new(Vertex3::new(0.0, 0.0, 0.0), Vertex3::new(10.0, 10.0, 0.0));
        let codec = MemoryCodec::default().with("a.obj", corner_triangle());
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false).with_bounds(Some(bounds)));

        let results = orchestrator.split(&[PathBuf::from("a.obj")], &dest).unwrap();
        let names: Vec<_> = results[0].tiles.keys().cloned().collect();
        assert_eq!(names, ["Mesh-XL-YL"]);
        assert_eq!(orchestrator.codec.written.lock().len(), 1);
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn test_tight_bounds_without_shared_region() {
        let dest = scratch_dir("tight");
        let codec = MemoryCodec::default().with("a.obj", corner_triangle());
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(0, false));
        let results = orchestrator.split(&[PathBuf::from("a.obj")], &dest).unwrap();
        assert_eq!(
            results[0].tiles[ROOT_NAME],
            Box3::new(Vertex3::new(0.0, 0.0, 0.0), Vertex3::new(1.0, 1.0, 0.0))
        );
        assert_eq!(results[0].stats.edge_splits, 0);
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn test_failure_aborts_and_cleans_up() {
        let dest = scratch_dir("fail");
        let codec = MemoryCodec::default().with("good.obj", textured_grid(4, 4.0));
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false));

        let err = orchestrator
            .split(&[PathBuf::from("good.obj"), PathBuf::from("missing.obj")], &dest)
            .unwrap_err();
        match err {
            TilerError::Pipeline {
                lod,
                source_file,
                stage,
                ..
            } => {
                assert_eq!(lod, 1);
                assert_eq!(source_file, PathBuf::from("missing.obj"));
                assert_eq!(stage, Stage::Load);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!orchestrator.cancel_token().is_cancelled());
        assert!(!dest.join("LOD-0").exists());
        assert!(!dest.join("LOD-1").exists());
        assert!(!staging_dir(&dest, 0).exists());
        let _ = fs::remove_dir_all(&dest);
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_write_leaves_existing_lod_untouched() {
        let dest = scratch_dir("existing");
        fs::create_dir_all(dest.join("LOD-0")).unwrap();
        fs::write(dest.join("LOD-0").join("previous.obj"), "kept").unwrap();
        let codec = MemoryCodec::default()
            .with("a.obj", textured_grid(4, 4.0))
            .failing_at(1);
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false));

        let err = orchestrator.split(&[PathBuf::from("a.obj")], &dest).unwrap_err();
        assert!(matches!(err, TilerError::Pipeline { stage: Stage::Write, .. }));
        assert_eq!(orchestrator.codec.written.lock().len(), 1);
        assert_eq!(file_names(&dest.join("LOD-0")), ["previous.obj"]);
        assert!(!staging_dir(&dest, 0).exists());
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn test_split_again_after_failure() {
        let dest = scratch_dir("retry");
        let codec = MemoryCodec::default()
            .with("a.obj", textured_grid(4, 4.0))
            .failing_at(0);
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false));
        let sources = [PathBuf::from("a.obj")];

        assert!(orchestrator.split(&sources, &dest).is_err());
        let results = orchestrator.split(&sources, &dest).unwrap();
        assert_eq!(results[0].tiles.len(), 4);
        assert_eq!(
            file_names(&dest.join("LOD-0")),
            ["Mesh-XL-YL.obj", "Mesh-XL-YR.obj", "Mesh-XR-YL.obj", "Mesh-XR-YR.obj"]
        );
        fs::remove_dir_all(&dest).unwrap();
    }

    #[test]
    fn test_external_cancel_stops_the_run() {
        let dest = scratch_dir("cancelled");
        let token = CancelToken::new();
        let codec = MemoryCodec::default().with("a.obj", corner_triangle());
        let orchestrator = LodOrchestrator::new(codec, SplitOptions::new(1, false)).with_cancel(token.clone());
        token.cancel();

        match orchestrator.split(&[PathBuf::from("a.obj")], &dest).unwrap_err() {
            TilerError::Pipeline { stage, source, .. } => {
                assert_eq!(stage, Stage::Load);
                assert!(source.is_cancelled());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.join("LOD-0").exists());
        let _ = fs::remove_dir_all(&dest);
    }

    #[test]
    fn test_no_sources_is_a_config_error() {
        let orchestrator = LodOrchestrator::new(MemoryCodec::default(), SplitOptions::default());
        assert!(matches!(
            orchestrator.split(&[], Path::new("unused")),
            Err(TilerError::Config(_))
        ));
    }
}
