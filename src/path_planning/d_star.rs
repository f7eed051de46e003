//! D* incremental replanning
//!
//! The search runs backward from a fixed goal. Every cell carries a tag
//! (New, Open, Closed), a cost-to-goal estimate `h`, a priority key `k`
//! and a back-pointer toward the goal. Between calls the planner keeps a
//! snapshot of the effective cell costs it searched over; when the grid
//! changes, only the changed cells are re-opened and the raise/lower
//! waves repair the affected part of the search tree.
//!
//! Reference: Stentz, A. (1994). "Optimal and Efficient Path Planning
//! for Partially-Known Environments"

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use log::{debug, trace, warn};
use nalgebra as na;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::common::{GridNode, GridPathPlanner, NavResult, NavigationError, SearchStats};
use crate::mapping::GridMap;

/// Configuration for D* planner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DStarConfig {
    /// Wall-clock budget per call in seconds
    pub timeout_s: f64,
}

impl Default for DStarConfig {
    fn default() -> Self {
        Self { timeout_s: 10.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    New,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct State {
    tag: Tag,
    h: f32,
    k: f32,
    parent: Option<usize>,
}

impl Default for State {
    fn default() -> Self {
        State {
            tag: Tag::New,
            h: f32::INFINITY,
            k: f32::INFINITY,
            parent: None,
        }
    }
}

/// D* planner; search state persists across calls for the same goal
#[derive(Debug, Clone)]
pub struct DStarPlanner {
    config: DStarConfig,
    width: i32,
    height: i32,
    states: Vec<State>,
    open: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>>,
    // Effective costs the current search tree was built on, (row, col) = (y, x)
    costs: na::DMatrix<f32>,
    goal: Option<GridNode>,
    last_path: Vec<GridNode>,
    replan_count: usize,
    stats: SearchStats,
}

impl Default for DStarPlanner {
    fn default() -> Self {
        Self::new(DStarConfig::default())
    }
}

impl DStarPlanner {
    pub fn new(config: DStarConfig) -> Self {
        DStarPlanner {
            config,
            width: 0,
            height: 0,
            states: Vec::new(),
            open: BinaryHeap::new(),
            costs: na::DMatrix::from_element(0, 0, 1.0),
            goal: None,
            last_path: Vec::new(),
            replan_count: 0,
            stats: SearchStats::default(),
        }
    }

    pub fn config(&self) -> &DStarConfig {
        &self.config
    }

    pub fn set_timeout(&mut self, timeout_s: f64) {
        self.config.timeout_s = timeout_s;
    }

    pub fn goal(&self) -> Option<GridNode> {
        self.goal
    }

    pub fn last_path(&self) -> &[GridNode] {
        &self.last_path
    }

    pub fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn replan_count(&self) -> usize {
        self.replan_count
    }

    /// Reset all search state and seed the goal with h = k = 0
    pub fn set_goal(&mut self, grid: &GridMap, goal: GridNode) -> NavResult<()> {
        if !grid.is_valid(goal) {
            return Err(NavigationError::invalid_position(
                goal.x,
                goal.y,
                "goal outside grid or on an obstacle",
            ));
        }

        self.width = grid.width();
        self.height = grid.height();
        self.states = vec![State::default(); grid.cell_count()];
        self.open.clear();
        self.costs = grid.cost_snapshot();
        self.goal = Some(goal);
        self.last_path.clear();
        self.replan_count = 0;

        let goal_idx = self.index(goal);
        self.insert(goal_idx, 0.0);
        debug!("[DStar] goal set to ({}, {})", goal.x, goal.y);
        Ok(())
    }

    fn index(&self, node: GridNode) -> usize {
        (node.y * self.width + node.x) as usize
    }

    fn node(&self, index: usize) -> GridNode {
        let index = index as i32;
        GridNode::new(index % self.width, index / self.width)
    }

    fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let node = self.node(index);
        let (w, h) = (self.width, self.height);
        (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .map(move |(dx, dy)| node.offset(dx, dy))
            .filter(move |n| n.x >= 0 && n.x < w && n.y >= 0 && n.y < h)
            .map(move |n| (n.y * w + n.x) as usize)
    }

    /// Cost of moving from cell `from` onto adjacent cell `to`
    fn arc(&self, from: usize, to: usize) -> f32 {
        let a = self.node(from);
        let b = self.node(to);
        let base = if a.is_diagonal_to(&b) {
            std::f32::consts::SQRT_2
        } else {
            1.0
        };
        base * self.costs[(b.y as usize, b.x as usize)]
    }

    fn insert(&mut self, index: usize, h_new: f32) {
        let state = &mut self.states[index];
        state.k = match state.tag {
            Tag::New => h_new,
            Tag::Open => state.k.min(h_new),
            Tag::Closed => state.h.min(h_new),
        };
        state.h = h_new;
        state.tag = Tag::Open;
        self.open.push(Reverse((OrderedFloat(state.k), index)));
    }

    /// Smallest valid key, discarding stale heap entries
    fn min_key(&mut self) -> Option<f32> {
        while let Some(Reverse((k, index))) = self.open.peek().copied() {
            let state = &self.states[index];
            if state.tag == Tag::Open && state.k == k.0 {
                return Some(k.0);
            }
            self.open.pop();
        }
        None
    }

    fn pop_min(&mut self) -> Option<(usize, f32)> {
        let k = self.min_key()?;
        let Reverse((_, index)) = self.open.pop()?;
        self.states[index].tag = Tag::Closed;
        Some((index, k))
    }

    /// Expand one state; returns false when the open list is empty
    fn process_state(&mut self) -> bool {
        let Some((x, k_old)) = self.pop_min() else {
            return false;
        };
        let neighbors: Vec<usize> = self.neighbors(x).collect();

        // Raise state: try to find a neighbor that already has an optimal h
        if k_old < self.states[x].h {
            for &y in &neighbors {
                let via = self.states[y].h + self.arc(x, y);
                if self.states[y].h <= k_old && self.states[x].h > via {
                    self.states[x].parent = Some(y);
                    self.states[x].h = via;
                }
            }
        }

        let h_x = self.states[x].h;
        if k_old == h_x {
            // Lower state: propagate to every neighbor that improves
            for &y in &neighbors {
                let through_x = h_x + self.arc(y, x);
                let s = self.states[y];
                let points_to_x = s.parent == Some(x);
                if s.tag == Tag::New
                    || (points_to_x && s.h != through_x)
                    || (!points_to_x && s.h > through_x)
                {
                    self.states[y].parent = Some(x);
                    self.insert(y, through_x);
                }
            }
        } else {
            for &y in &neighbors {
                let through_x = h_x + self.arc(y, x);
                let s = self.states[y];
                let points_to_x = s.parent == Some(x);
                if s.tag == Tag::New || (points_to_x && s.h != through_x) {
                    self.states[y].parent = Some(x);
                    self.insert(y, through_x);
                } else if !points_to_x && s.h > through_x {
                    self.insert(x, h_x);
                } else if !points_to_x
                    && h_x > s.h + self.arc(x, y)
                    && s.tag == Tag::Closed
                    && s.h > k_old
                {
                    self.insert(y, s.h);
                }
            }
        }
        true
    }

    /// Diff the grid against the stored snapshot and re-open changed cells
    ///
    /// Returns the number of changed cells.
    fn apply_cost_changes(&mut self, grid: &GridMap) -> usize {
        let current = grid.cost_snapshot();
        let mut changed = 0usize;
        let mut increased = 0usize;

        for row in 0..self.height as usize {
            for col in 0..self.width as usize {
                let old = self.costs[(row, col)];
                let new = current[(row, col)];
                if old == new {
                    continue;
                }
                changed += 1;
                if new > old {
                    increased += 1;
                }
                let index = row * self.width as usize + col;
                if self.states[index].tag == Tag::Closed {
                    let h = self.states[index].h;
                    self.insert(index, h);
                }
            }
        }

        self.costs = current;
        if changed > 0 {
            self.replan_count += 1;
            debug!(
                "[DStar] {} cells changed ({} increased, {} decreased), replan #{}",
                changed,
                increased,
                changed - increased,
                self.replan_count
            );
        }
        changed
    }

    /// True when the grid no longer matches the searched snapshot
    pub fn has_cost_changes(&self, grid: &GridMap) -> bool {
        if grid.width() != self.width || grid.height() != self.height {
            return true;
        }
        grid.cost_snapshot() != self.costs
    }

    /// Path from `start` to the goal, repairing the search first if the
    /// grid changed since the previous call
    pub fn find_path(&mut self, grid: &GridMap, start: GridNode) -> NavResult<Vec<GridNode>> {
        let started = Instant::now();
        let goal = self.goal.ok_or(NavigationError::GoalNotSet)?;

        if grid.width() != self.width || grid.height() != self.height {
            debug!("[DStar] grid resized, restarting search");
            self.set_goal(grid, goal)?;
        }
        if !grid.in_bounds(start) {
            return Err(NavigationError::invalid_position(start.x, start.y, "start outside grid"));
        }

        self.apply_cost_changes(grid);

        let start_idx = self.index(start);
        let mut explored = 0usize;
        loop {
            let Some(k_min) = self.min_key() else {
                break;
            };
            let start_state = self.states[start_idx];
            if start_state.tag == Tag::Closed && k_min >= start_state.h {
                break;
            }
            if !self.process_state() {
                break;
            }
            explored += 1;
            if explored % 1000 == 0 {
                trace!("[DStar] {} states processed, k_min {:.2}", explored, k_min);
            }

            if started.elapsed().as_secs_f64() > self.config.timeout_s {
                let elapsed = started.elapsed().as_secs_f64();
                warn!("[DStar] timed out after {:.3}s ({} states)", elapsed, explored);
                self.stats = SearchStats {
                    replan_count: self.replan_count,
                    ..SearchStats::failed(explored, elapsed, true)
                };
                return Err(NavigationError::SearchTimeout(self.stats.clone()));
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let path = match self.extract_path(start_idx, goal) {
            Some(path) => path,
            None => {
                debug!("[DStar] FAILED: start unreachable after {} states", explored);
                self.last_path.clear();
                self.stats = SearchStats {
                    replan_count: self.replan_count,
                    ..SearchStats::failed(explored, elapsed, false)
                };
                return Err(NavigationError::NoPathFound(self.stats.clone()));
            }
        };

        self.stats = SearchStats {
            nodes_explored: explored,
            path_length: path.len(),
            path_cost: self.states[start_idx].h,
            search_time_s: elapsed,
            success: true,
            replan_count: self.replan_count,
            ..Default::default()
        };
        debug!(
            "[DStar] path found: {} cells, cost {:.2}, {} states in {:.4}s",
            path.len(),
            self.stats.path_cost,
            explored,
            elapsed
        );
        self.last_path = path.clone();
        Ok(path)
    }

    /// Follow back-pointers from `start_idx` to the goal
    ///
    /// A back-pointer cycle cuts the path before the first repeated cell.
    fn extract_path(&self, start_idx: usize, goal: GridNode) -> Option<Vec<GridNode>> {
        let state = self.states[start_idx];
        if state.tag == Tag::New || !state.h.is_finite() {
            return None;
        }

        let goal_idx = self.index(goal);
        let mut visited = vec![false; self.states.len()];
        visited[start_idx] = true;
        let mut path = vec![self.node(start_idx)];
        let mut current = start_idx;
        while current != goal_idx {
            current = self.states[current].parent?;
            if visited[current] {
                warn!(
                    "[DStar] back-pointer cycle at {:?}, truncating path at {} cells",
                    self.node(current),
                    path.len()
                );
                break;
            }
            visited[current] = true;
            path.push(self.node(current));
        }
        Some(path)
    }

    /// Cell following `current` on the last path
    ///
    /// `None` when `current` is not on the path (stale) or is its last cell.
    pub fn get_next_waypoint(&self, current: GridNode) -> Option<GridNode> {
        let position = self.last_path.iter().position(|c| *c == current)?;
        self.last_path.get(position + 1).copied()
    }

    /// Repair and re-extract only if the grid changed since the last search
    pub fn replan_if_needed(
        &mut self,
        grid: &GridMap,
        current: GridNode,
    ) -> NavResult<Option<Vec<GridNode>>> {
        if self.goal.is_none() {
            return Err(NavigationError::GoalNotSet);
        }
        if !self.has_cost_changes(grid) {
            return Ok(None);
        }
        self.find_path(grid, current).map(Some)
    }
}

impl GridPathPlanner for DStarPlanner {
    /// Reuses the search tree when the goal is unchanged
    fn plan(&mut self, grid: &GridMap, start: GridNode, goal: GridNode) -> NavResult<Vec<GridNode>> {
        if self.goal != Some(goal) {
            self.set_goal(grid, goal)?;
        }
        self.find_path(grid, start)
    }

    fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    fn set_timeout(&mut self, timeout_s: f64) {
        self.config.timeout_s = timeout_s;
    }

    fn name(&self) -> &'static str {
        "dstar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::CellKind;
    use crate::path_planning::a_star::{AStarConfig, AStarPlanner};

    fn grid() -> GridMap {
        GridMap::from_image_size(200, 200, 10.0).unwrap()
    }

    fn astar_cost(grid: &GridMap, start: GridNode, goal: GridNode) -> f32 {
        let mut astar = AStarPlanner::new(AStarConfig {
            smooth_path: false,
            ..Default::default()
        });
        astar.find_path(grid, start, goal).unwrap();
        astar.last_stats().path_cost
    }

    #[test]
    fn test_requires_goal() {
        let grid = grid();
        let mut planner = DStarPlanner::default();
        let res = planner.find_path(&grid, GridNode::new(0, 0));
        assert!(matches!(res, Err(NavigationError::GoalNotSet)));
    }

    #[test]
    fn test_matches_astar_cost() {
        let mut grid = grid();
        for y in 3..17 {
            grid.set_kind(GridNode::new(9, y), CellKind::Obstacle);
        }
        grid.set_cost(GridNode::new(4, 4), 6.0);
        let (start, goal) = (GridNode::new(1, 10), GridNode::new(18, 9));

        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        let path = planner.find_path(&grid, start).unwrap();

        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        assert!(path.iter().all(|c| grid.is_valid(*c)));
        let expected = astar_cost(&grid, start, goal);
        assert!((planner.last_stats().path_cost - expected).abs() < 1e-3);
    }

    #[test]
    fn test_cost_increase_never_lowers_cost() {
        let mut grid = grid();
        let (start, goal) = (GridNode::new(2, 10), GridNode::new(17, 10));
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        let path = planner.find_path(&grid, start).unwrap();
        let before = planner.last_stats().path_cost;

        let blocked = path[path.len() / 2];
        grid.set_cost(blocked, 20.0);
        let replanned = planner.replan_if_needed(&grid, start).unwrap().unwrap();
        let after = planner.last_stats().path_cost;

        assert!(after >= before - 1e-4);
        assert!(!replanned.contains(&blocked));
        assert_eq!(planner.replan_count(), 1);
        assert!((after - astar_cost(&grid, start, goal)).abs() < 1e-3);
    }

    #[test]
    fn test_cost_decrease_never_raises_cost() {
        let mut grid = grid();
        for y in 0..20 {
            for x in 8..12 {
                grid.set_cost(GridNode::new(x, y), 9.0);
            }
        }
        let (start, goal) = (GridNode::new(2, 10), GridNode::new(17, 10));
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        planner.find_path(&grid, start).unwrap();
        let before = planner.last_stats().path_cost;

        for x in 8..12 {
            grid.set_cost(GridNode::new(x, 10), 1.0);
        }
        planner.replan_if_needed(&grid, start).unwrap().unwrap();
        let after = planner.last_stats().path_cost;

        assert!(after <= before + 1e-4);
        assert!((after - astar_cost(&grid, start, goal)).abs() < 1e-3);
    }

    #[test]
    fn test_new_obstacle_on_path_is_avoided() {
        let mut grid = grid();
        let (start, goal) = (GridNode::new(2, 2), GridNode::new(17, 17));
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        let first = planner.find_path(&grid, start).unwrap();

        let on_path = first[first.len() / 2];
        grid.set_kind(on_path, CellKind::Obstacle);
        let second = planner.find_path(&grid, start).unwrap();
        assert!(!second.contains(&on_path));
        assert_eq!(second.last(), Some(&goal));
    }

    #[test]
    fn test_walled_goal_reports_no_path() {
        let mut grid = grid();
        let goal = GridNode::new(15, 15);
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        planner.find_path(&grid, GridNode::new(1, 1)).unwrap();

        for n in grid.neighbors_in_bounds(goal).collect::<Vec<_>>() {
            grid.set_kind(n, CellKind::Obstacle);
        }
        let res = planner.find_path(&grid, GridNode::new(1, 1));
        assert!(matches!(res, Err(NavigationError::NoPathFound(_))));
        assert!(planner.last_path().is_empty());
    }

    #[test]
    fn test_no_change_means_no_replan() {
        let grid = grid();
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, GridNode::new(10, 10)).unwrap();
        planner.find_path(&grid, GridNode::new(0, 0)).unwrap();
        assert!(planner.replan_if_needed(&grid, GridNode::new(0, 0)).unwrap().is_none());
        assert_eq!(planner.replan_count(), 0);
    }

    #[test]
    fn test_next_waypoint() {
        let grid = grid();
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, GridNode::new(5, 0)).unwrap();
        let path = planner.find_path(&grid, GridNode::new(0, 0)).unwrap();
        assert_eq!(planner.get_next_waypoint(path[0]), Some(path[1]));
        assert_eq!(planner.get_next_waypoint(GridNode::new(19, 19)), None);
        assert_eq!(planner.get_next_waypoint(GridNode::new(5, 0)), None);
    }

    #[test]
    fn test_zero_timeout_reports_partial_stats() {
        let grid = grid();
        let mut planner = DStarPlanner::new(DStarConfig { timeout_s: 0.0 });
        planner.set_goal(&grid, GridNode::new(19, 19)).unwrap();
        match planner.find_path(&grid, GridNode::new(0, 0)) {
            Err(NavigationError::SearchTimeout(stats)) => {
                assert!(stats.timed_out);
                assert!(stats.nodes_explored > 0);
                assert_eq!(stats.replan_count, 0);
            }
            other => panic!("expected SearchTimeout, got {:?}", other),
        }

        // Search state survives; a relaxed deadline finishes the job
        planner.set_timeout(10.0);
        let path = planner.find_path(&grid, GridNode::new(0, 0)).unwrap();
        assert_eq!(path.last(), Some(&GridNode::new(19, 19)));
    }

    #[test]
    fn test_back_pointer_cycle_truncates_path() {
        let grid = grid();
        let goal = GridNode::new(10, 10);
        let mut planner = DStarPlanner::default();
        planner.set_goal(&grid, goal).unwrap();
        planner.find_path(&grid, GridNode::new(0, 0)).unwrap();

        let (a, b) = (GridNode::new(3, 3), GridNode::new(4, 3));
        let (ia, ib) = (planner.index(a), planner.index(b));
        planner.states[ia].parent = Some(ib);
        planner.states[ib].parent = Some(ia);

        let path = planner.extract_path(ia, goal).unwrap();
        assert_eq!(path, vec![a, b]);
    }
}
