//! Common traits defining interfaces for the path planners

use crate::common::error::NavResult;
use crate::common::types::{GridNode, SearchStats};
use crate::mapping::GridMap;

/// Trait for planners that search the navigation grid
///
/// Planners borrow the grid for the duration of a call and keep their own
/// per-search state; the grid itself is owned by the caller.
pub trait GridPathPlanner {
    /// Plan a path on the grid from start to goal (both inclusive)
    fn plan(&mut self, grid: &GridMap, start: GridNode, goal: GridNode) -> NavResult<Vec<GridNode>>;

    /// Statistics of the most recent `plan` call
    fn last_stats(&self) -> &SearchStats;

    /// Wall-clock budget for subsequent `plan` calls
    fn set_timeout(&mut self, timeout_s: f64);

    /// Short name used in logs and results
    fn name(&self) -> &'static str;
}
