// src/geometry/mod.rs
// Geometry primitives shared by the mesh, splitter and orchestrator.

mod box3;
mod gps;

pub use box3::Box3;
pub use gps::{to_ecef, GpsCoords};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-width of the band around a split plane in which a vertex counts as
/// lying on the plane.
pub const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vertex3 { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`.
    pub fn lerp(&self, other: &Vertex3, t: f64) -> Vertex3 {
        Vertex3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn sub(&self, other: &Vertex3) -> Vertex3 {
        Vertex3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn cross(&self, other: &Vertex3) -> Vertex3 {
        Vertex3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex2 {
    pub u: f64,
    pub v: f64,
}

impl Vertex2 {
    pub const fn new(u: f64, v: f64) -> Self {
        Vertex2 { u, v }
    }

    pub fn lerp(&self, other: &Vertex2, t: f64) -> Vertex2 {
        Vertex2 {
            u: self.u + (other.u - self.u) * t,
            v: self.v + (other.v - self.v) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Tag used in generated tile names.
    pub fn tag(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Area of the triangle spanned by three points.
pub fn triangle_area(a: &Vertex3, b: &Vertex3, c: &Vertex3) -> f64 {
    b.sub(a).cross(&c.sub(a)).length() * 0.5
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
