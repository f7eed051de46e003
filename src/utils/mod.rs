//! Utility modules for semantic_nav

pub mod visualization;

pub use visualization::{colors, plot_navigation_result, GridLayers, PathStyle, PointStyle, Visualizer};
