//! Grid mapping for semantic navigation

pub mod grid_map;

pub use grid_map::*;
