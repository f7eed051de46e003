//! RRT* path planning over the semantic cost grid
//!
//! The tree grows in continuous pixel space. Edge cost is the segment
//! length times the average traversal cost of cells sampled along it, and
//! any segment crossing a cell above the collision threshold is rejected.
//! After the goal region is first reached the search keeps sampling for a
//! fixed window so that rewiring can shorten the solution.
//!
//! Reference: Karaman, S. & Frazzoli, E. (2011). "Sampling-based
//! Algorithms for Optimal Motion Planning"

use std::time::Instant;

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::common::{
    GridNode, GridPathPlanner, NavResult, NavigationError, Point2D, SearchStats,
};
use crate::mapping::GridMap;

/// Points sampled along an edge when estimating its cost
const EDGE_COST_SAMPLES: usize = 5;

/// Configuration for RRT* planner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RRTStarConfig {
    pub max_iterations: usize,
    /// Maximum extension distance in pixels
    pub step_size: f64,
    /// Distance to the goal (pixels) that counts as reaching it
    pub goal_tolerance: f64,
    /// Neighborhood radius for parent choice and rewiring (pixels)
    pub rewire_radius: f64,
    /// Probability of sampling the goal directly
    pub goal_bias: f64,
    /// Iterations kept after the first goal hit
    pub optimize_iterations: usize,
    /// Cells costlier than this block a segment
    pub collision_cost_threshold: f32,
    /// Pixel spacing of collision samples along a segment
    pub collision_sample_interval: f64,
    pub timeout_s: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for RRTStarConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            step_size: 3.0,
            goal_tolerance: 2.0,
            rewire_radius: 6.0,
            goal_bias: 0.1,
            optimize_iterations: 1000,
            collision_cost_threshold: 10.0,
            collision_sample_interval: 2.0,
            timeout_s: 30.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    position: Point2D,
    cost: f32,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Node {
    fn root(position: Point2D) -> Self {
        Node {
            position,
            cost: 0.0,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// RRT* planner; the tree is rebuilt on every call
#[derive(Debug, Clone)]
pub struct RRTStarPlanner {
    config: RRTStarConfig,
    nodes: Vec<Node>,
    pixel_path: Vec<Point2D>,
    stats: SearchStats,
}

impl Default for RRTStarPlanner {
    fn default() -> Self {
        Self::new(RRTStarConfig::default())
    }
}

impl RRTStarPlanner {
    pub fn new(config: RRTStarConfig) -> Self {
        RRTStarPlanner {
            config,
            nodes: Vec::new(),
            pixel_path: Vec::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn config(&self) -> &RRTStarConfig {
        &self.config
    }

    /// Override selected parameters, leaving the rest untouched
    pub fn set_parameters(
        &mut self,
        max_iterations: Option<usize>,
        step_size: Option<f64>,
        goal_tolerance: Option<f64>,
        rewire_radius: Option<f64>,
    ) {
        if let Some(v) = max_iterations {
            self.config.max_iterations = v;
        }
        if let Some(v) = step_size {
            self.config.step_size = v;
        }
        if let Some(v) = goal_tolerance {
            self.config.goal_tolerance = v;
        }
        if let Some(v) = rewire_radius {
            self.config.rewire_radius = v;
        }
    }

    pub fn set_timeout(&mut self, timeout_s: f64) {
        self.config.timeout_s = timeout_s;
    }

    pub fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Pixel waypoints of the last successful search
    pub fn last_pixel_path(&self) -> &[Point2D] {
        &self.pixel_path
    }

    /// Tree edges (parent, child) of the last search
    pub fn tree_edges(&self) -> Vec<(Point2D, Point2D)> {
        self.nodes
            .iter()
            .filter_map(|n| n.parent.map(|p| (self.nodes[p].position, n.position)))
            .collect()
    }

    fn validate_config(&self) -> NavResult<()> {
        let c = &self.config;
        if !(c.step_size > 0.0) || !(c.collision_sample_interval > 0.0) {
            return Err(NavigationError::InvalidParameter(
                "step_size and collision_sample_interval must be > 0".to_string(),
            ));
        }
        if !(c.goal_tolerance >= 0.0) || !(c.rewire_radius >= 0.0) {
            return Err(NavigationError::InvalidParameter(
                "goal_tolerance and rewire_radius must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Grow a tree from the center of `start` toward the center of `goal`
    ///
    /// Returns the waypoints as grid cells with consecutive duplicates
    /// removed; the continuous waypoints are kept in `last_pixel_path`.
    pub fn find_path(
        &mut self,
        grid: &GridMap,
        start: GridNode,
        goal: GridNode,
    ) -> NavResult<Vec<GridNode>> {
        let started = Instant::now();
        self.validate_config()?;

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

        let start_px = grid.grid_to_pixel(start);
        let goal_px = grid.grid_to_pixel(goal);
        self.nodes = vec![Node::root(start_px)];
        self.pixel_path.clear();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let goal_coin = Bernoulli::new(self.config.goal_bias.clamp(0.0, 1.0))
            .map_err(|e| NavigationError::InvalidParameter(format!("goal_bias: {}", e)))?;
        let span_x = Uniform::new(0.0, (grid.width() as f64) * grid.resolution());
        let span_y = Uniform::new(0.0, (grid.height() as f64) * grid.resolution());

        let mut goal_nodes: Vec<usize> = Vec::new();
        if start_px.distance(&goal_px) <= self.config.goal_tolerance {
            goal_nodes.push(0);
        }
        let mut first_hit: Option<(usize, f32)> = goal_nodes.first().map(|_| (0, 0.0));

        let mut iteration = 0usize;
        while iteration < self.config.max_iterations {
            if let Some((hit, _)) = first_hit {
                if iteration >= hit + self.config.optimize_iterations {
                    break;
                }
            }
            iteration += 1;

            let sample = if goal_coin.sample(&mut rng) {
                goal_px
            } else {
                Point2D::new(span_x.sample(&mut rng), span_y.sample(&mut rng))
            };

            if let Some(new_index) = self.extend(grid, sample) {
                if self.nodes[new_index].position.distance(&goal_px) <= self.config.goal_tolerance {
                    goal_nodes.push(new_index);
                    if first_hit.is_none() {
                        let cost = self.nodes[new_index].cost;
                        debug!("[RRTStar] goal reached at iteration {}, cost {:.2}", iteration, cost);
                        first_hit = Some((iteration, cost));
                    }
                }
            }

            if iteration % 500 == 0 {
                trace!("[RRTStar] iteration {}, tree size {}", iteration, self.nodes.len());
            }

            // At least one iteration runs before the deadline applies
            if started.elapsed().as_secs_f64() > self.config.timeout_s {
                if first_hit.is_none() {
                    let elapsed = started.elapsed().as_secs_f64();
                    warn!("[RRTStar] timed out after {:.3}s ({} iterations)", elapsed, iteration);
                    self.stats = SearchStats {
                        tree_size: self.nodes.len(),
                        ..SearchStats::failed(iteration, elapsed, true)
                    };
                    return Err(NavigationError::SearchTimeout(self.stats.clone()));
                }
                debug!("[RRTStar] deadline hit while optimizing, keeping best solution");
                break;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let best = goal_nodes
            .iter()
            .copied()
            .filter(|&i| self.nodes[i].cost.is_finite())
            .min_by(|&a, &b| self.nodes[a].cost.total_cmp(&self.nodes[b].cost));

        let Some(best) = best else {
            debug!("[RRTStar] FAILED: goal region not reached in {} iterations", iteration);
            self.stats = SearchStats {
                tree_size: self.nodes.len(),
                ..SearchStats::failed(iteration, elapsed, false)
            };
            return Err(NavigationError::NoPathFound(self.stats.clone()));
        };

        self.pixel_path = self.extract_path(best);
        let mut grid_path: Vec<GridNode> = self
            .pixel_path
            .iter()
            .map(|p| grid.pixel_to_grid(p.x, p.y))
            .collect();
        grid_path.dedup();

        self.stats = SearchStats {
            nodes_explored: iteration,
            path_length: grid_path.len(),
            path_cost: self.nodes[best].cost,
            search_time_s: elapsed,
            success: true,
            tree_size: self.nodes.len(),
            first_solution_iteration: first_hit.map(|(i, _)| i),
            first_solution_cost: first_hit.map(|(_, c)| c),
            ..Default::default()
        };
        debug!(
            "[RRTStar] path found: {} cells, cost {:.2}, tree {} nodes in {:.4}s",
            grid_path.len(),
            self.stats.path_cost,
            self.nodes.len(),
            elapsed
        );
        Ok(grid_path)
    }

    /// Add one node toward `sample`; returns its index when accepted
    fn extend(&mut self, grid: &GridMap, sample: Point2D) -> Option<usize> {
        let nearest = self.nearest(sample);
        let from = self.nodes[nearest].position;
        let new_pos = self.steer(from, sample);
        if new_pos == from || !self.collision_free(grid, from, new_pos) {
            return None;
        }

        let near = self.near(new_pos);

        // Cheapest collision-free parent among the neighborhood
        let mut parent = nearest;
        let mut cost = self.nodes[nearest].cost + self.edge_cost(grid, from, new_pos);
        for &candidate in &near {
            if candidate == nearest {
                continue;
            }
            let p = self.nodes[candidate].position;
            let via = self.nodes[candidate].cost + self.edge_cost(grid, p, new_pos);
            if via < cost && self.collision_free(grid, p, new_pos) {
                parent = candidate;
                cost = via;
            }
        }
        if !cost.is_finite() {
            return None;
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            position: new_pos,
            cost,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);

        self.rewire(grid, index, &near);
        Some(index)
    }

    fn nearest(&self, point: Point2D) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, node) in self.nodes.iter().enumerate() {
            let d = node.position.distance(&point);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    fn near(&self, point: Point2D) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.position.distance(&point) <= self.config.rewire_radius)
            .map(|(i, _)| i)
            .collect()
    }

    fn steer(&self, from: Point2D, to: Point2D) -> Point2D {
        let d = from.distance(&to);
        if d <= self.config.step_size {
            to
        } else {
            from.lerp(&to, self.config.step_size / d)
        }
    }

    /// Every sample after the origin must sit in a valid, cheap-enough cell
    fn collision_free(&self, grid: &GridMap, from: Point2D, to: Point2D) -> bool {
        let samples = (from.distance(&to) / self.config.collision_sample_interval) as usize + 1;
        (1..=samples).all(|i| {
            let p = from.lerp(&to, i as f64 / samples as f64);
            let cell = grid.pixel_to_grid(p.x, p.y);
            grid.get_cost(cell) <= self.config.collision_cost_threshold
        })
    }

    /// Segment length times the mean cost of cells along it
    fn edge_cost(&self, grid: &GridMap, from: Point2D, to: Point2D) -> f32 {
        let mut total = 0.0f32;
        for i in 0..EDGE_COST_SAMPLES {
            let t = i as f64 / (EDGE_COST_SAMPLES - 1) as f64;
            let p = from.lerp(&to, t);
            let cell = grid.pixel_to_grid(p.x, p.y);
            let cost = if i == 0 {
                // The origin is already part of the tree even if occupied
                grid.raw_cost(cell).unwrap_or(f32::INFINITY)
            } else {
                grid.get_cost(cell)
            };
            if !cost.is_finite() {
                return f32::INFINITY;
            }
            total += cost;
        }
        from.distance(&to) as f32 * (total / EDGE_COST_SAMPLES as f32)
    }

    fn rewire(&mut self, grid: &GridMap, new_index: usize, near: &[usize]) {
        let new_pos = self.nodes[new_index].position;
        let new_cost = self.nodes[new_index].cost;

        for &candidate in near {
            if candidate == new_index || self.nodes[new_index].parent == Some(candidate) {
                continue;
            }
            if self.would_create_cycle(new_index, candidate) {
                continue;
            }
            let p = self.nodes[candidate].position;
            let potential = new_cost + self.edge_cost(grid, new_pos, p);
            if potential < self.nodes[candidate].cost && self.collision_free(grid, new_pos, p) {
                if let Some(old_parent) = self.nodes[candidate].parent {
                    self.nodes[old_parent].children.retain(|&c| c != candidate);
                }
                self.nodes[candidate].parent = Some(new_index);
                self.nodes[new_index].children.push(candidate);
                self.propagate_cost(candidate, potential);
            }
        }
    }

    /// True if `child` is `new_parent` or one of its ancestors
    fn would_create_cycle(&self, new_parent: usize, child: usize) -> bool {
        let mut current = Some(new_parent);
        let mut steps = 0;
        while let Some(index) = current {
            if index == child {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                warn!("[RRTStar] ancestor walk exceeded tree size, treating as cycle");
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    /// Set a node's cost and shift its whole subtree by the same delta
    fn propagate_cost(&mut self, index: usize, new_cost: f32) {
        let mut stack = vec![(index, new_cost)];
        while let Some((i, cost)) = stack.pop() {
            let delta = cost - self.nodes[i].cost;
            self.nodes[i].cost = cost;
            if !delta.is_finite() {
                continue;
            }
            for &child in &self.nodes[i].children {
                stack.push((child, self.nodes[child].cost + delta));
            }
        }
    }

    fn extract_path(&self, goal_index: usize) -> Vec<Point2D> {
        let mut path = Vec::new();
        let mut current = Some(goal_index);
        while let Some(index) = current {
            if path.len() > self.nodes.len() {
                warn!("[RRTStar] parent cycle during extraction, truncating");
                break;
            }
            path.push(self.nodes[index].position);
            current = self.nodes[index].parent;
        }
        path.reverse();
        path
    }
}

impl GridPathPlanner for RRTStarPlanner {
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
        "rrt_star"
    }
}
