//! A* path planning on the semantic cost grid
//!
//! Classic best-first search over the 8-connected grid. Stepping onto a
//! cell costs 1 (or sqrt 2 diagonally) times that cell's traversal cost,
//! so the planner trades distance against semantic cost. The heuristic is
//! the Euclidean distance scaled by a weight; with weight 1.0 and cell
//! costs >= 1.0 it is admissible and the returned path is cost-optimal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Instant;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::common::{GridNode, GridPathPlanner, NavResult, NavigationError, SearchStats};
use crate::mapping::GridMap;

/// Configuration for A* planner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AStarConfig {
    /// Heuristic weight (1.0 = optimal, >1.0 = faster but suboptimal)
    pub heuristic_weight: f32,
    /// Wall-clock budget per search in seconds
    pub timeout_s: f64,
    /// Shortcut the raw path with line-of-sight checks
    pub smooth_path: bool,
    pub allow_diagonal: bool,
}

impl Default for AStarConfig {
    fn default() -> Self {
        Self {
            heuristic_weight: 1.0,
            timeout_s: 5.0,
            smooth_path: true,
            allow_diagonal: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    cell: GridNode,
    cost: f32,
    parent_index: Option<usize>,
}

/// Open-set entry (min-heap on f, ties broken on h)
#[derive(Debug)]
struct PriorityNode {
    f: f32,
    h: f32,
    index: usize,
}

impl Eq for PriorityNode {}

impl PartialEq for PriorityNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.h == other.h
    }
}

impl Ord for PriorityNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.h.partial_cmp(&self.h).unwrap_or(Ordering::Equal))
    }
}

impl PartialOrd for PriorityNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* planner over a borrowed [`GridMap`]
#[derive(Debug, Clone)]
pub struct AStarPlanner {
    config: AStarConfig,
    stats: SearchStats,
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(AStarConfig::default())
    }
}

impl AStarPlanner {
    pub fn new(mut config: AStarConfig) -> Self {
        config.heuristic_weight = config.heuristic_weight.max(0.1);
        AStarPlanner {
            config,
            stats: SearchStats::default(),
        }
    }

    pub fn config(&self) -> &AStarConfig {
        &self.config
    }

    /// Set the heuristic weight, clamped to at least 0.1
    pub fn set_heuristic_weight(&mut self, weight: f32) {
        self.config.heuristic_weight = weight.max(0.1);
    }

    pub fn set_smoothing(&mut self, enabled: bool) {
        self.config.smooth_path = enabled;
    }

    pub fn set_timeout(&mut self, timeout_s: f64) {
        self.config.timeout_s = timeout_s;
    }

    pub fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    fn heuristic(&self, a: GridNode, b: GridNode) -> f32 {
        self.config.heuristic_weight * a.euclidean(&b)
    }

    /// Find a path from `start` to `goal`, both inclusive
    ///
    /// The start only has to lie inside the grid (the robot may stand in
    /// an occupied cell); the goal must be traversable.
    pub fn find_path(
        &mut self,
        grid: &GridMap,
        start: GridNode,
        goal: GridNode,
    ) -> NavResult<Vec<GridNode>> {
        let started = Instant::now();

        if !grid.in_bounds(start) {
            return Err(NavigationError::invalid_position(start.x, start.y, "start outside grid"));
        }
        if !grid.is_valid(goal) {
            return Err(NavigationError::invalid_position(
                goal.x,
                goal.y,
                "goal outside grid or on an obstacle",
            ));
        }

        if start == goal {
            self.stats = SearchStats {
                path_length: 1,
                path_cost: 0.0,
                success: true,
                search_time_s: started.elapsed().as_secs_f64(),
                ..Default::default()
            };
            return Ok(vec![start]);
        }

        let mut node_storage = vec![Node {
            cell: start,
            cost: 0.0,
            parent_index: None,
        }];
        let mut best_cost: HashMap<GridNode, f32> = HashMap::new();
        let mut closed: HashSet<GridNode> = HashSet::new();
        let mut open = BinaryHeap::new();

        best_cost.insert(start, 0.0);
        let h0 = self.heuristic(start, goal);
        open.push(PriorityNode { f: h0, h: h0, index: 0 });

        let mut explored = 0usize;

        while let Some(PriorityNode { index, .. }) = open.pop() {
            let current = node_storage[index].clone();
            if !closed.insert(current.cell) {
                continue;
            }
            explored += 1;

            if current.cell == goal {
                let raw = build_path(index, &node_storage);
                let path = if self.config.smooth_path {
                    smooth_path(grid, &raw)
                } else {
                    raw
                };
                self.stats = SearchStats {
                    nodes_explored: explored,
                    path_length: path.len(),
                    path_cost: current.cost,
                    search_time_s: started.elapsed().as_secs_f64(),
                    success: true,
                    ..Default::default()
                };
                debug!(
                    "[AStar] path found: {} cells, cost {:.2}, {} nodes in {:.4}s",
                    path.len(),
                    current.cost,
                    explored,
                    self.stats.search_time_s
                );
                return Ok(path);
            }

            if started.elapsed().as_secs_f64() > self.config.timeout_s {
                let elapsed = started.elapsed().as_secs_f64();
                warn!("[AStar] timed out after {:.3}s ({} nodes)", elapsed, explored);
                self.stats = SearchStats::failed(explored, elapsed, true);
                return Err(NavigationError::SearchTimeout(self.stats.clone()));
            }

            for neighbor in grid.get_neighbors(current.cell, self.config.allow_diagonal) {
                if closed.contains(&neighbor) {
                    continue;
                }
                let tentative = current.cost + grid.movement_cost(current.cell, neighbor);
                if !tentative.is_finite() {
                    continue;
                }
                if best_cost.get(&neighbor).map_or(false, |&c| tentative >= c) {
                    continue;
                }
                best_cost.insert(neighbor, tentative);
                node_storage.push(Node {
                    cell: neighbor,
                    cost: tentative,
                    parent_index: Some(index),
                });
                let h = self.heuristic(neighbor, goal);
                open.push(PriorityNode {
                    f: tentative + h,
                    h,
                    index: node_storage.len() - 1,
                });
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        debug!("[AStar] FAILED: open set exhausted after {} nodes", explored);
        self.stats = SearchStats::failed(explored, elapsed, false);
        Err(NavigationError::NoPathFound(self.stats.clone()))
    }

    /// Chain searches through intermediate waypoints
    ///
    /// Joints are not duplicated. Statistics are summed over the legs.
    pub fn find_path_with_waypoints(
        &mut self,
        grid: &GridMap,
        start: GridNode,
        waypoints: &[GridNode],
        goal: GridNode,
    ) -> NavResult<Vec<GridNode>> {
        let mut full_path: Vec<GridNode> = Vec::new();
        let mut total = SearchStats {
            success: true,
            ..Default::default()
        };

        let legs = std::iter::once(&start)
            .chain(waypoints.iter())
            .zip(waypoints.iter().chain(std::iter::once(&goal)));

        for (leg, (&from, &to)) in legs.enumerate() {
            trace!("[AStar] waypoint leg {}: {:?} -> {:?}", leg, from, to);
            let segment = self.find_path(grid, from, to)?;
            total.nodes_explored += self.stats.nodes_explored;
            total.path_cost += self.stats.path_cost;
            total.search_time_s += self.stats.search_time_s;

            let skip = usize::from(!full_path.is_empty());
            full_path.extend(segment.into_iter().skip(skip));
        }

        total.path_length = full_path.len();
        self.stats = total;
        Ok(full_path)
    }
}

impl GridPathPlanner for AStarPlanner {
    fn plan(&mut self, grid: &GridMap, start: GridNode, goal: GridNode) -> NavResult<Vec<GridNode>> {
        self.find_path(grid, start, goal)
    }

    fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    fn set_timeout(&mut self, timeout_s: f64) {
        self.config.timeout_s = timeout_s;
    }

    fn name(&self) -> &'static str {
        "astar"
    }
}

fn build_path(goal_index: usize, node_storage: &[Node]) -> Vec<GridNode> {
    let mut path = Vec::new();
    let mut current_index = Some(goal_index);

    while let Some(index) = current_index {
        let node = &node_storage[index];
        path.push(node.cell);
        current_index = node.parent_index;
    }

    path.reverse();
    path
}

/// Greedy line-of-sight shortcutting
///
/// From each kept point, jump to the furthest later point that is still
/// visible. Endpoints are preserved.
pub fn smooth_path(grid: &GridMap, path: &[GridNode]) -> Vec<GridNode> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut smoothed = vec![path[0]];
    let mut i = 0;
    while i < path.len() - 1 {
        let mut next = i + 1;
        for j in (i + 2..path.len()).rev() {
            if grid.line_of_sight(path[i], path[j]) {
                next = j;
                break;
            }
        }
        smoothed.push(path[next]);
        i = next;
    }
    smoothed
}

/// Sum of step costs along a path of adjacent cells
pub fn path_cost(grid: &GridMap, path: &[GridNode]) -> f32 {
    path.windows(2)
        .map(|w| grid.movement_cost(w[0], w[1]))
        .sum()
}
