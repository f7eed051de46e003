//! Goal resolution and planning on top of the semantic environment models

pub mod types;
pub mod planner;

pub use types::*;
pub use planner::*;
