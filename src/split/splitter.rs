// src/split/splitter.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Result;
use crate::geometry::{clamp, Axis, Box3, Vertex3};
use crate::mesh::Mesh;
use crate::split::{CancelToken, SplitOptions, SplitPointStrategy, Tile, TileCollector};

/// Metrics of one split run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitStats {
    pub tile_count: usize,
    pub edge_splits: usize,
    pub elapsed: Duration,
}

impl SplitStats {
    pub fn splits_per_ms(&self) -> f64 {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        if ms > 0.0 {
            self.edge_splits as f64 / ms
        } else {
            0.0
        }
    }
}

/// A node still to be processed. `axis` indexes into the axis mode's list;
/// a level is complete once every axis has been cut.
struct Pending {
    mesh: Mesh,
    region: Box3,
    depth_remaining: u32,
    axis: usize,
}

enum Step {
    Leaf(Tile),
    Split(Box<(Pending, Pending)>),
}

pub struct RecursiveSplitter {
    options: SplitOptions,
    cancel: CancelToken,
}

impl RecursiveSplitter {
    pub fn new(options: SplitOptions) -> Self {
        RecursiveSplitter {
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Splits `mesh` into `axis_mode.leaf_count(divisions)` tiles, empty ones
    /// included. Tiles are returned sorted by name.
    pub fn split(&self, mesh: Mesh) -> Result<(Vec<Tile>, SplitStats)> {
        let start = Instant::now();

        let region = self
            .options
            .bounds
            .or_else(|| mesh.bounds())
            .unwrap_or_else(|| Box3::new(Vertex3::default(), Vertex3::default()));

        let root = Pending {
            mesh,
            region,
            depth_remaining: self.options.divisions,
            axis: 0,
        };

        let collector = TileCollector::new();
        let edge_splits = AtomicUsize::new(0);
        self.process(root, &collector, &edge_splits)?;

        let tiles = collector.into_tiles();
        let stats = SplitStats {
            tile_count: tiles.len(),
            edge_splits: edge_splits.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        debug!(
            "split into {} tiles with {} edge splits in {:?}",
            stats.tile_count, stats.edge_splits, stats.elapsed
        );
        Ok((tiles, stats))
    }

    fn process(&self, node: Pending, collector: &TileCollector, edge_splits: &AtomicUsize) -> Result<()> {
        self.cancel.check()?;

        match self.step(node, edge_splits)? {
            Step::Leaf(tile) => {
                collector.push(tile);
                Ok(())
            }
            Step::Split(children) => {
                let (low, high) = *children;
                let (a, b) = rayon::join(
                    || self.process(low, collector, edge_splits),
                    || self.process(high, collector, edge_splits),
                );
                a.and(b)
            }
        }
    }

    /// Advances one node: emits it as a leaf once every level is done,
    /// otherwise cuts it along the current axis. The parent mesh is dropped
    /// as soon as both children exist.
    fn step(&self, node: Pending, edge_splits: &AtomicUsize) -> Result<Step> {
        let axes = self.options.axis_mode.axes();

        if node.depth_remaining == 0 {
            return Ok(Step::Leaf(Tile {
                name: node.mesh.name().to_string(),
                mesh: node.mesh,
                bounds: node.region,
            }));
        }

        let axis = axes[node.axis];
        let coordinate = self.split_coordinate(&node.mesh, &node.region, axis);
        let (low_region, high_region) = node.region.split(axis, coordinate)?;
        let clipped = node.mesh.clip(axis, coordinate)?;
        edge_splits.fetch_add(clipped.edge_splits, Ordering::Relaxed);

        let (next_axis, depth_remaining) = if node.axis + 1 == axes.len() {
            (0, node.depth_remaining - 1)
        } else {
            (node.axis + 1, node.depth_remaining)
        };

        Ok(Step::Split(Box::new((
            Pending {
                mesh: clipped.low,
                region: low_region,
                depth_remaining,
                axis: next_axis,
            },
            Pending {
                mesh: clipped.high,
                region: high_region,
                depth_remaining,
                axis: next_axis,
            },
        ))))
    }

    /// Cut coordinate along `axis`, clamped into the node region.
    fn split_coordinate(&self, mesh: &Mesh, region: &Box3, axis: Axis) -> f64 {
        let point = if self.options.bounds.is_some() {
            region.center()
        } else {
            match self.options.strategy {
                SplitPointStrategy::AbsoluteCenter => mesh.bounds().map(|b| b.center()),
                SplitPointStrategy::VertexBaricenter => mesh.barycenter(),
            }
            .unwrap_or_else(|| region.center())
        };
        clamp(point.get(axis), region.min.get(axis), region.max.get(axis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TilerError;
    use crate::geometry::EPSILON;
    use crate::mesh::{Face, MeshData, ROOT_NAME};
    use crate::split::AxisMode;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashMap;

    /// An `n` x `n` grid of unit quads in the z = 0 plane, optionally with a
    /// vertical wall at x = 0 so the mesh has depth.
    fn grid(n: usize, wall: bool) -> Mesh {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vertex3::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        let row = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                faces.push(Face::new(i, i + 1, i + row + 1));
                faces.push(Face::new(i, i + row + 1, i + row));
            }
        }
        if wall {
            let base = vertices.len();
            vertices.push(Vertex3::new(0.0, 0.0, 0.0));
            vertices.push(Vertex3::new(0.0, n as f64, 0.0));
            vertices.push(Vertex3::new(0.0, n as f64, n as f64));
            vertices.push(Vertex3::new(0.0, 0.0, n as f64));
            faces.push(Face::new(base, base + 1, base + 2));
            faces.push(Face::new(base, base + 2, base + 3));
        }
        Mesh::Plain(MeshData::new(ROOT_NAME, vertices, faces))
    }

    fn total_faces(tiles: &[Tile]) -> usize {
        tiles.iter().map(|t| t.mesh.face_count()).sum()
    }

    #[test]
    fn test_zero_divisions_returns_original() {
        let mesh = grid(3, false);
        let splitter = RecursiveSplitter::new(SplitOptions::new(0, false));
        let (tiles, stats) = splitter.split(mesh.clone()).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(stats.edge_splits, 0);
        assert_eq!(stats.tile_count, 1);
        assert_eq!(tiles[0].mesh, mesh);
        assert_eq!(tiles[0].name, ROOT_NAME);
    }

    #[test]
    fn test_depth_completeness_xy() {
        for d in 0..=3 {
            let splitter = RecursiveSplitter::new(SplitOptions::new(d, false));
            let (tiles, _) = splitter.split(grid(4, false)).unwrap();
            assert_eq!(tiles.len(), AxisMode::XY.leaf_count(d));
        }
    }

    #[test]
    fn test_depth_completeness_xyz_keeps_empty_tiles() {
        // A flat grid has no extent in z, so half of every z cut is empty.
        let splitter = RecursiveSplitter::new(SplitOptions::new(1, true));
        let (tiles, _) = splitter.split(grid(4, false)).unwrap();
        assert_eq!(tiles.len(), 8);
        assert!(tiles.iter().any(|t| t.mesh.is_empty()));
    }

    #[test]
    fn test_faces_and_area_are_conserved() {
        let mesh = grid(5, true);
        for strategy in [SplitPointStrategy::AbsoluteCenter, SplitPointStrategy::VertexBaricenter] {
            let options = SplitOptions::new(2, true).with_strategy(strategy);
            let (tiles, stats) = RecursiveSplitter::new(options).split(mesh.clone()).unwrap();
            assert_eq!(total_faces(&tiles), mesh.face_count() + stats.edge_splits);
            let area: f64 = tiles.iter().map(|t| t.mesh.surface_area()).sum();
            assert_approx_eq!(area, mesh.surface_area(), 1e-9);
        }
    }

    #[test]
    fn test_tiles_stay_inside_their_region() {
        let options = SplitOptions::new(2, false).with_strategy(SplitPointStrategy::VertexBaricenter);
        let (tiles, _) = RecursiveSplitter::new(options).split(grid(6, true)).unwrap();
        for tile in &tiles {
            assert!(tile
                .mesh
                .vertices()
                .iter()
                .all(|v| tile.bounds.contains_point_within(v, EPSILON * 4.0)));
        }
    }

    #[test]
    fn test_tile_names_encode_path() {
        let (tiles, _) = RecursiveSplitter::new(SplitOptions::new(1, false))
            .split(grid(2, false))
            .unwrap();
        let names: Vec<_> = tiles.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["Mesh-XL-YL", "Mesh-XL-YR", "Mesh-XR-YL", "Mesh-XR-YR"]
        );
    }

    #[test]
    fn test_fixed_bounds_give_identical_tiles_across_meshes() {
        let bounds = Box3::new(Vertex3::new(0.0, 0.0, 0.0), Vertex3::new(8.0, 8.0, 8.0));
        let options = SplitOptions::new(2, false)
            .with_bounds(Some(bounds))
            .with_strategy(SplitPointStrategy::VertexBaricenter);

        let run = |mesh: Mesh| -> HashMap<String, Box3> {
            let (tiles, _) = RecursiveSplitter::new(options).split(mesh).unwrap();
            tiles.into_iter().map(|t| (t.name, t.bounds)).collect()
        };
        let fine = run(grid(8, true));
        let coarse = run(grid(2, false));
        assert_eq!(fine.len(), 16);
        assert_eq!(fine, coarse);
        assert_eq!(fine["Mesh-XL-YL-XL-YL"].max, Vertex3::new(2.0, 2.0, 8.0));
    }

    #[test]
    fn test_barycenter_strategy_follows_density() {
        // Dense vertices at low x pull the barycentric cut away from the
        // box midpoint.
        let mut vertices: Vec<Vertex3> = (0..20)
            .map(|i| Vertex3::new(i as f64 * 0.01, (i % 2) as f64, 0.0))
            .collect();
        vertices.push(Vertex3::new(10.0, 0.0, 0.0));
        let faces = (0..19).map(|i| Face::new(i, i + 1, 20)).collect();
        let mesh = Mesh::Plain(MeshData::new(ROOT_NAME, vertices, faces));
        let region = mesh.bounds().unwrap();

        let by_center = RecursiveSplitter::new(
            SplitOptions::new(1, false).with_strategy(SplitPointStrategy::AbsoluteCenter),
        );
        let by_mean = RecursiveSplitter::new(SplitOptions::new(1, false));
        assert_approx_eq!(by_center.split_coordinate(&mesh, &region, Axis::X), 5.0);
        assert!(by_mean.split_coordinate(&mesh, &region, Axis::X) < 1.0);
    }

    #[test]
    fn test_empty_mesh_still_yields_all_tiles() {
        let empty = Mesh::Plain(MeshData::new(ROOT_NAME, vec![], vec![]));
        let (tiles, stats) = RecursiveSplitter::new(SplitOptions::new(2, false))
            .split(empty)
            .unwrap();
        assert_eq!(tiles.len(), 16);
        assert_eq!(stats.edge_splits, 0);
        assert!(tiles.iter().all(|t| t.mesh.is_empty()));
    }

    #[test]
    fn test_cancelled_split_fails() {
        let token = CancelToken::new();
        token.cancel();
        let splitter = RecursiveSplitter::new(SplitOptions::new(2, false)).with_cancel(token);
        assert!(matches!(splitter.split(grid(2, false)), Err(TilerError::Cancelled)));
    }
}
