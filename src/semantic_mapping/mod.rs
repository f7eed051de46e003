//! Semantic environment models fed by per-frame detections

pub mod map_builder;
pub mod scene_memory;

pub use map_builder::*;
pub use scene_memory::*;
