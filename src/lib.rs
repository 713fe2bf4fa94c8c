// src/lib.rs

pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod lod;
pub mod mesh;
pub mod split;

pub use error::{Result, TilerError};
