// src/geometry/box3.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, TilerError};
use crate::geometry::{Axis, Vertex3};

/// Axis-aligned bounding box. Per axis `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3 {
    pub min: Vertex3,
    pub max: Vertex3,
}

impl Box3 {
    pub fn new(min: Vertex3, max: Vertex3) -> Self {
        Box3 { min, max }
    }

    /// Smallest box containing every point, or `None` for no points.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Vertex3>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Box3::new(first, first);
        for p in iter {
            bbox.expand_point(p);
        }
        Some(bbox)
    }

    fn expand_point(&mut self, p: &Vertex3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn center(&self) -> Vertex3 {
        Vertex3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Splits the box at `coordinate` along `axis` into its low and high
    /// halves. The coordinate must lie within `[min, max]` on that axis; a
    /// coordinate equal to a bound yields one flat half.
    pub fn split(&self, axis: Axis, coordinate: f64) -> Result<(Box3, Box3)> {
        let min = self.min.get(axis);
        let max = self.max.get(axis);
        if !(min..=max).contains(&coordinate) {
            return Err(TilerError::SplitOutOfRange {
                axis,
                coordinate,
                min,
                max,
            });
        }

        let low = Box3::new(self.min, self.max.with(axis, coordinate));
        let high = Box3::new(self.min.with(axis, coordinate), self.max);
        Ok((low, high))
    }

    // Check if the box contains a point (bounds inclusive)
    pub fn contains_point(&self, p: &Vertex3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Like `contains_point`, with every face pushed out by `tolerance`.
    pub fn contains_point_within(&self, p: &Vertex3, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }

    pub fn contains_box(&self, other: &Box3) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    // Checks if two boxes intersect (touching counts)
    pub fn intersects(&self, other: &Box3) -> bool {
        self.max.x >= other.min.x
            && self.min.x <= other.max.x
            && self.max.y >= other.min.y
            && self.min.y <= other.max.y
            && self.max.z >= other.min.z
            && self.min.z <= other.max.z
    }

    pub fn union(&self, other: &Box3) -> Box3 {
        let mut merged = *self;
        merged.expand_point(&other.min);
        merged.expand_point(&other.max);
        merged
    }
}
