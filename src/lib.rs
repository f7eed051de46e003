//! semantic_nav - semantic indoor navigation from object detections
//!
//! This crate turns per-frame object detections into a traversal-cost
//! grid, a long-term semantic map and a short-term scene memory, and
//! plans paths to free-text goals with A*, D* or RRT*.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Environment models
pub mod mapping;
pub mod semantic_mapping;

// Planning
pub mod path_planning;
pub mod navigation;

// Re-export common types for convenience
pub use common::{BoundingBox, Detection, GridNode, Point2D, SearchStats};
pub use common::GridPathPlanner;
pub use common::{NavResult, NavigationError};
pub use config::NavigationConfig;
pub use mapping::GridMap;
pub use navigation::{NavigationPlanner, NavigationRequest, NavigationResult, PlannerContext};
