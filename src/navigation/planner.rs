//! Semantic navigation planner
//!
//! Ties the grid, the semantic map and the scene memory to the three path
//! searches. A free-text goal ("computer lab", "find a whiteboard") is
//! resolved to a grid cell, a search is chosen from the scene state, and
//! the raw path is annotated with waypoint descriptions, difficulty,
//! duration and confidence.
//!
//! The planner owns the environment models; everything that depends on
//! previous planning calls (learned locations, the active path) lives in a
//! caller-owned [`PlannerContext`].

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::common::{
    Detection, GridNode, GridPathPlanner, NavResult, NavigationError, Point2D, SearchStats,
};
use crate::config::NavigationConfig;
use crate::mapping::GridMap;
use crate::navigation::types::*;
use crate::path_planning::{AStarPlanner, DStarPlanner, RRTStarPlanner};
use crate::semantic_mapping::{SceneMemorySystem, SemanticMapBuilder};

/// Words in a goal description that point at object classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalKeywords {
    pub keywords: Vec<String>,
    pub classes: Vec<String>,
}

impl GoalKeywords {
    pub fn new(keywords: &[&str], classes: &[&str]) -> Self {
        GoalKeywords {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            classes: classes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuration for the navigation planner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Below this scene stability the incremental planner is chosen
    pub stability_threshold: f32,
    /// Above this obstacle cell fraction the sampling planner is chosen
    pub obstacle_density_threshold: f32,
    pub astar_confidence: f32,
    pub dstar_confidence: f32,
    pub rrt_star_confidence: f32,
    /// Searches faster than this (s) gain confidence
    pub fast_search_s: f64,
    /// Searches slower than this (s) lose confidence
    pub slow_search_s: f64,
    pub search_time_adjustment: f32,
    /// Traversal time of one unit-cost cell (s)
    pub seconds_per_cell: f64,
    /// Approximate number of waypoint descriptions per path
    pub waypoint_samples: usize,
    /// Cells above this cost count as high-cost for difficulty
    pub high_cost_threshold: f32,
    pub difficult_average_cost: f32,
    pub difficult_high_cost_ratio: f32,
    pub moderate_average_cost: f32,
    pub moderate_high_cost_ratio: f32,
    /// Rebuild the grid from scratch on every frame
    pub clear_grid_each_frame: bool,
    /// Checked in order; the first entry with a matching keyword wins
    pub goal_keywords: Vec<GoalKeywords>,
    /// Classes reported as obstacles in semantic guidance
    pub guidance_obstacle_classes: Vec<String>,
    /// Classes reported as landmarks in semantic guidance
    pub guidance_landmark_classes: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 0.7,
            obstacle_density_threshold: 0.3,
            astar_confidence: 0.9,
            dstar_confidence: 0.85,
            rrt_star_confidence: 0.7,
            fast_search_s: 1.0,
            slow_search_s: 5.0,
            search_time_adjustment: 0.1,
            seconds_per_cell: 0.5,
            waypoint_samples: 5,
            high_cost_threshold: 5.0,
            difficult_average_cost: 8.0,
            difficult_high_cost_ratio: 0.5,
            moderate_average_cost: 4.0,
            moderate_high_cost_ratio: 0.2,
            clear_grid_each_frame: true,
            goal_keywords: vec![
                GoalKeywords::new(&["computer", "monitor"], &["monitor"]),
                GoalKeywords::new(&["study", "table"], &["table", "office-chair"]),
                GoalKeywords::new(&["reading", "book"], &["books"]),
                GoalKeywords::new(&["presentation", "whiteboard"], &["whiteboard"]),
            ],
            guidance_obstacle_classes: vec!["table".to_string(), "office-chair".to_string()],
            guidance_landmark_classes: vec!["monitor".to_string(), "whiteboard".to_string()],
        }
    }
}

/// Lower-cased with underscores read as spaces
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', " ")
}

pub struct NavigationPlanner {
    config: PlannerConfig,
    grid: GridMap,
    map_builder: SemanticMapBuilder,
    scene_memory: SceneMemorySystem,
    astar: AStarPlanner,
    dstar: DStarPlanner,
    rrt_star: RRTStarPlanner,
}

impl NavigationPlanner {
    pub fn new(config: NavigationConfig) -> NavResult<Self> {
        let grid = GridMap::new(config.grid)?;
        info!(
            "Navigation planner ready on a {}x{} grid",
            grid.width(),
            grid.height()
        );
        Ok(NavigationPlanner {
            config: config.planner,
            grid,
            map_builder: SemanticMapBuilder::new(config.semantic_map),
            scene_memory: SceneMemorySystem::new(config.scene_memory),
            astar: AStarPlanner::new(config.astar),
            dstar: DStarPlanner::new(config.dstar),
            rrt_star: RRTStarPlanner::new(config.rrt_star),
        })
    }

    /// Default configuration on a camera of the given size
    pub fn with_image_size(image_width: u32, image_height: u32, resolution: f64) -> NavResult<Self> {
        let mut config = NavigationConfig::default();
        config.grid.image_width = image_width;
        config.grid.image_height = image_height;
        config.grid.resolution = resolution;
        Self::new(config)
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridMap {
        &mut self.grid
    }

    pub fn map_builder(&self) -> &SemanticMapBuilder {
        &self.map_builder
    }

    pub fn map_builder_mut(&mut self) -> &mut SemanticMapBuilder {
        &mut self.map_builder
    }

    pub fn scene_memory(&self) -> &SceneMemorySystem {
        &self.scene_memory
    }

    pub fn update_environment(
        &mut self,
        ctx: &mut PlannerContext,
        detections: &[Detection],
        location_hint: Option<&str>,
    ) -> NavResult<EnvironmentReport> {
        self.update_environment_at(ctx, detections, None, location_hint, Utc::now())
    }

    /// Feed one frame of detections to every environment model
    ///
    /// All detections are validated first; a malformed one rejects the
    /// whole frame and leaves the models untouched.
    pub fn update_environment_at(
        &mut self,
        ctx: &mut PlannerContext,
        detections: &[Detection],
        frame_id: Option<&str>,
        location_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> NavResult<EnvironmentReport> {
        for detection in detections {
            detection.validate()?;
        }

        let map_update = self
            .map_builder
            .update_map_at(detections, frame_id, location_hint, now);
        let memory_update = self.scene_memory.update_scene_memory(detections, now);
        self.grid
            .update_from_detections(detections, self.config.clear_grid_each_frame);
        self.learn_locations(ctx, &map_update.zone_type, detections, location_hint, now);

        debug!(
            "Environment frame {}: zone {}, {} known locations, stability {:.2}",
            map_update.frame_id,
            map_update.zone_type,
            ctx.known_locations.len(),
            self.scene_memory.stability()
        );

        Ok(EnvironmentReport {
            map_update,
            memory_update,
            obstacle_fraction: self.grid.obstacle_fraction(),
            known_locations: ctx.known_locations.len(),
        })
    }

    fn learn_locations(
        &self,
        ctx: &mut PlannerContext,
        zone_type: &str,
        detections: &[Detection],
        location_hint: Option<&str>,
        now: DateTime<Utc>,
    ) {
        if detections.is_empty() {
            return;
        }
        let n = detections.len() as f64;
        let (sum_x, sum_y) = detections.iter().fold((0.0, 0.0), |(sx, sy), d| {
            let c = d.center();
            (sx + c.x, sy + c.y)
        });
        let location = KnownLocation {
            grid_pos: self.grid.pixel_to_grid(sum_x / n, sum_y / n),
            confidence: detections.iter().map(|d| d.confidence).sum::<f32>() / n as f32,
            last_seen: now,
        };

        let mut names = Vec::new();
        if zone_type != "general_area" {
            names.push(zone_type.to_string());
        }
        if let Some(hint) = location_hint.map(normalize_name).filter(|h| !h.is_empty()) {
            names.push(hint);
        }
        for name in names {
            debug!("Learned location '{}' at {:?}", name, location.grid_pos);
            ctx.known_locations.insert(name, location.clone());
        }
    }

    /// Map a goal description to a grid cell
    ///
    /// Learned locations are tried first, then the keyword table scored by
    /// `confidence x frequency` of remembered objects. When a keyword
    /// matches but no such object has been seen, the grid center is used.
    pub fn resolve_goal(&self, ctx: &PlannerContext, description: &str) -> NavResult<GridNode> {
        let goal = normalize_name(description);
        if goal.is_empty() {
            return Err(NavigationError::GoalUnresolvable(
                "empty goal description".to_string(),
            ));
        }

        for (name, location) in &ctx.known_locations {
            let name = normalize_name(name);
            if goal.contains(&name) || name.contains(&goal) {
                debug!("Goal '{}' matched known location '{}'", description, name);
                return Ok(location.grid_pos);
            }
        }

        let classes = self
            .config
            .goal_keywords
            .iter()
            .find(|k| k.keywords.iter().any(|w| goal.contains(w.as_str())))
            .map(|k| &k.classes)
            .ok_or_else(|| NavigationError::GoalUnresolvable(description.to_string()))?;

        let mut best: Option<(f32, Point2D)> = None;
        for object in self.map_builder.persistent_objects().values() {
            if !classes.contains(&object.class_name) {
                continue;
            }
            let Some(bbox) = object.last_bbox() else {
                continue;
            };
            let score = object.confidence * object.frequency as f32;
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, bbox.center()));
            }
        }

        match best {
            Some((score, center)) => {
                debug!("Goal '{}' resolved to object at {:?} (score {:.2})", description, center, score);
                Ok(self.grid.pixel_to_grid(center.x, center.y))
            }
            None => {
                debug!("Goal '{}' has no remembered object, using grid center", description);
                Ok(self.grid.center())
            }
        }
    }

    fn snap_goal(&self, goal: GridNode) -> NavResult<GridNode> {
        let max_radius = self.grid.width().max(self.grid.height());
        self.grid
            .nearest_valid(goal, max_radius)
            .ok_or_else(|| NavigationError::invalid_position(goal.x, goal.y, "no traversable cell near goal"))
    }

    /// Concrete search for a request; `Auto` looks at the scene state
    pub fn choose_algorithm(&self, request: &NavigationRequest) -> PathfindingAlgorithm {
        if request.algorithm != PathfindingAlgorithm::Auto {
            return request.algorithm;
        }
        if self.scene_memory.stability() < self.config.stability_threshold {
            return PathfindingAlgorithm::DStar;
        }
        if self.grid.obstacle_fraction() > self.config.obstacle_density_threshold
            || request.strategy == NavigationStrategy::Exploration
        {
            return PathfindingAlgorithm::RrtStar;
        }
        PathfindingAlgorithm::AStar
    }

    fn run_search(
        &mut self,
        algorithm: PathfindingAlgorithm,
        start: GridNode,
        goal: GridNode,
        timeout_s: f64,
    ) -> NavResult<(Vec<GridNode>, SearchStats)> {
        let grid = &self.grid;
        let planner: &mut dyn GridPathPlanner = match algorithm {
            PathfindingAlgorithm::DStar => &mut self.dstar,
            PathfindingAlgorithm::RrtStar => &mut self.rrt_star,
            PathfindingAlgorithm::AStar | PathfindingAlgorithm::Auto => &mut self.astar,
        };
        planner.set_timeout(timeout_s);
        debug!("Planning {:?} -> {:?} with {}", start, goal, planner.name());
        let path = planner.plan(grid, start, goal)?;
        Ok((path, planner.last_stats().clone()))
    }

    pub fn plan_navigation(
        &mut self,
        ctx: &mut PlannerContext,
        request: &NavigationRequest,
    ) -> NavigationResult {
        let started = Instant::now();

        let goal = match self
            .resolve_goal(ctx, &request.goal_description)
            .and_then(|g| self.snap_goal(g))
        {
            Ok(goal) => goal,
            Err(e) => {
                warn!("Cannot resolve goal '{}': {}", request.goal_description, e);
                let next_action = match e {
                    NavigationError::GoalUnresolvable(_) => format!(
                        "Cannot locate '{}' in current environment",
                        request.goal_description
                    ),
                    _ => format!("No reachable area near '{}'", request.goal_description),
                };
                return NavigationResult::failure(
                    request.algorithm,
                    started.elapsed().as_secs_f64(),
                    next_action,
                );
            }
        };

        let start = self
            .grid
            .pixel_to_grid(request.start_pixel.x, request.start_pixel.y);
        let algorithm = self.choose_algorithm(request);

        match self.run_search(algorithm, start, goal, request.timeout_s) {
            Ok((path, stats)) => {
                let next_action = self.next_action(&path, &request.goal_description);
                let result = self.describe_path(path, &stats, algorithm, next_action);
                info!(
                    "Planned '{}' with {}: {} waypoints, cost {:.2}, confidence {:.2}",
                    request.goal_description,
                    algorithm,
                    result.path.len(),
                    result.path_cost,
                    result.confidence
                );
                ctx.current_goal = Some(goal);
                ctx.active_path = result.path.clone();
                ctx.last_algorithm = Some(algorithm);
                ctx.last_result = Some(result.clone());
                result
            }
            Err(e) => {
                warn!("[{}] FAILED for '{}': {}", algorithm, request.goal_description, e);
                let next_action = match e {
                    NavigationError::SearchTimeout(_) => {
                        "Planning timed out before reaching destination".to_string()
                    }
                    _ => "No path found to destination".to_string(),
                };
                NavigationResult::failure(algorithm, started.elapsed().as_secs_f64(), next_action)
            }
        }
    }

    fn describe_path(
        &self,
        path: Vec<GridNode>,
        stats: &SearchStats,
        algorithm: PathfindingAlgorithm,
        next_action: String,
    ) -> NavigationResult {
        let pixel_path = path.iter().map(|n| self.grid.grid_to_pixel(*n)).collect();
        NavigationResult {
            success: true,
            pixel_path,
            algorithm_used: algorithm,
            planning_time_s: stats.search_time_s,
            path_cost: stats.path_cost,
            confidence: self.path_confidence(stats, algorithm),
            waypoint_descriptions: self.waypoint_descriptions(&path),
            next_action,
            estimated_duration_s: self.traversal_time(&path),
            difficulty_level: self.path_difficulty(&path),
            semantic_guidance: self.semantic_guidance(&path),
            path,
        }
    }

    fn cell_cost(&self, node: GridNode) -> f32 {
        self.grid.raw_cost(node).unwrap_or(f32::INFINITY)
    }

    /// "Pass by <class>" or "Continue forward" at evenly spaced cells
    pub fn waypoint_descriptions(&self, path: &[GridNode]) -> Vec<String> {
        let step = (path.len() / self.config.waypoint_samples.max(1)).max(1);
        path.iter()
            .step_by(step)
            .map(|node| match self.grid.semantic_info(*node) {
                Some(tag) => format!("Pass by {}", tag.class_name),
                None => "Continue forward".to_string(),
            })
            .collect()
    }

    fn next_action(&self, path: &[GridNode], goal_description: &str) -> String {
        let (Some(first), Some(second)) = (path.first(), path.get(1)) else {
            return format!("Navigate to {}", goal_description);
        };
        let dx = second.x - first.x;
        let dy = second.y - first.y;
        let direction = if dx.abs() > dy.abs() {
            if dx > 0 { "right" } else { "left" }
        } else if dy > 0 {
            "forward"
        } else {
            "backward"
        };
        format!("Head {} toward {}", direction, goal_description)
    }

    pub fn path_difficulty(&self, path: &[GridNode]) -> PathDifficulty {
        if path.is_empty() {
            return PathDifficulty::Impossible;
        }
        let costs: Vec<f32> = path.iter().map(|n| self.cell_cost(*n)).collect();
        let average = costs.iter().sum::<f32>() / costs.len() as f32;
        let high = costs
            .iter()
            .filter(|c| **c > self.config.high_cost_threshold)
            .count() as f32
            / costs.len() as f32;

        if average > self.config.difficult_average_cost || high > self.config.difficult_high_cost_ratio {
            PathDifficulty::Difficult
        } else if average > self.config.moderate_average_cost || high > self.config.moderate_high_cost_ratio {
            PathDifficulty::Moderate
        } else {
            PathDifficulty::Easy
        }
    }

    /// Seconds to walk the path, each cell weighted by its cost
    pub fn traversal_time(&self, path: &[GridNode]) -> f64 {
        path.iter()
            .map(|n| self.config.seconds_per_cell * self.cell_cost(*n) as f64)
            .sum()
    }

    fn path_confidence(&self, stats: &SearchStats, algorithm: PathfindingAlgorithm) -> f32 {
        let mut confidence = match algorithm {
            PathfindingAlgorithm::AStar | PathfindingAlgorithm::Auto => self.config.astar_confidence,
            PathfindingAlgorithm::DStar => self.config.dstar_confidence,
            PathfindingAlgorithm::RrtStar => self.config.rrt_star_confidence,
        };
        if stats.success {
            if stats.search_time_s < self.config.fast_search_s {
                confidence += self.config.search_time_adjustment;
            } else if stats.search_time_s > self.config.slow_search_s {
                confidence -= self.config.search_time_adjustment;
            }
        }
        (confidence * self.scene_memory.stability()).clamp(0.1, 1.0)
    }

    fn semantic_guidance(&self, path: &[GridNode]) -> SemanticGuidance {
        let tagged: Vec<&str> = path
            .iter()
            .filter_map(|n| self.grid.semantic_info(*n))
            .map(|tag| tag.class_name.as_str())
            .collect();
        let count_in = |classes: &[String]| {
            tagged
                .iter()
                .filter(|c| classes.iter().any(|k| k == *c))
                .count()
        };

        SemanticGuidance {
            path_objects: tagged
                .iter()
                .map(|c| c.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            environment_familiarity: self.scene_memory.environment_history().len(),
            obstacles_detected: count_in(&self.config.guidance_obstacle_classes),
            landmarks_available: count_in(&self.config.guidance_landmark_classes),
            navigation_confidence: self.scene_memory.stability(),
        }
    }

    /// Next cell of the active path after the one closest to the caller
    pub fn get_next_waypoint(&self, ctx: &PlannerContext, current_pixel: Point2D) -> Option<WaypointInfo> {
        let current = self.grid.pixel_to_grid(current_pixel.x, current_pixel.y);
        let (index, distance) = ctx
            .active_path
            .iter()
            .enumerate()
            .map(|(i, n)| (i, n.manhattan(&current)))
            .min_by_key(|&(i, d)| (d, i))?;

        let next = *ctx.active_path.get(index + 1)?;
        Some(WaypointInfo {
            grid_pos: next,
            pixel_pos: self.grid.grid_to_pixel(next),
            distance,
            semantic_info: self.grid.semantic_info(next).cloned(),
            waypoint_index: index + 1,
            total_waypoints: ctx.active_path.len(),
        })
    }

    /// Repair the active path after environment changes
    ///
    /// Only paths planned with the incremental search are repaired;
    /// `Ok(None)` means nothing needed to change.
    pub fn replan_if_needed(
        &mut self,
        ctx: &mut PlannerContext,
        current_pixel: Point2D,
    ) -> NavResult<Option<NavigationResult>> {
        if !ctx.has_active_path() || ctx.current_goal.is_none() {
            return Ok(None);
        }
        if ctx.last_algorithm != Some(PathfindingAlgorithm::DStar) {
            return Ok(None);
        }

        let current = self.grid.pixel_to_grid(current_pixel.x, current_pixel.y);
        let Some(path) = self.dstar.replan_if_needed(&self.grid, current)? else {
            return Ok(None);
        };

        let stats = self.dstar.last_stats().clone();
        info!(
            "[DStar] replanned from {:?}: {} waypoints, cost {:.2}",
            current,
            path.len(),
            stats.path_cost
        );
        let result = self.describe_path(
            path,
            &stats,
            PathfindingAlgorithm::DStar,
            "Following replanned path".to_string(),
        );
        ctx.active_path = result.path.clone();
        ctx.last_result = Some(result.clone());
        Ok(Some(result))
    }

    pub fn planning_statistics(&self, ctx: &PlannerContext) -> PlanningStatistics {
        PlanningStatistics {
            known_locations: ctx.known_locations.len(),
            grid_dimensions: (self.grid.width(), self.grid.height()),
            obstacle_fraction: self.grid.obstacle_fraction(),
            last_algorithm: ctx.last_algorithm,
            last_result: ctx.last_result.clone(),
            scene_stability: self.scene_memory.stability(),
            persistent_objects: self.map_builder.persistent_objects().len(),
            environments_known: self.scene_memory.environment_history().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BoundingBox;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn det(class: &str, conf: f32, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection::new(class, conf, BoundingBox::new(x1, y1, x2, y2), "center", "medium")
    }

    fn planner() -> NavigationPlanner {
        NavigationPlanner::with_image_size(640, 480, 10.0).unwrap()
    }

    #[test]
    fn test_invalid_detection_rejects_frame() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let frame = vec![
            det("monitor", 0.9, 300.0, 150.0, 450.0, 250.0),
            det("table", 1.5, 100.0, 100.0, 200.0, 200.0),
        ];
        let err = nav
            .update_environment_at(&mut ctx, &frame, None, None, t(0))
            .unwrap_err();
        assert!(matches!(err, NavigationError::InvalidDetection(_)));
        assert!(nav.map_builder().persistent_objects().is_empty());
        assert_eq!(nav.grid().obstacle_fraction(), 0.0);
        assert!(ctx.known_locations.is_empty());
    }

    #[test]
    fn test_learns_zone_and_hint_locations() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let frame = vec![det("monitor", 0.95, 300.0, 150.0, 450.0, 250.0)];
        let report = nav
            .update_environment_at(&mut ctx, &frame, Some("f1"), Some("Quiet Corner"), t(0))
            .unwrap();

        assert_eq!(report.map_update.zone_type, "computer_lab");
        assert_eq!(report.known_locations, 2);
        let lab = &ctx.known_locations["computer_lab"];
        assert_eq!(lab.grid_pos, GridNode::new(37, 20));
        assert!(ctx.known_locations.contains_key("quiet corner"));

        assert_eq!(nav.resolve_goal(&ctx, "Computer Lab").unwrap(), GridNode::new(37, 20));
        assert_eq!(nav.resolve_goal(&ctx, "the quiet corner please").unwrap(), GridNode::new(37, 20));
    }

    #[test]
    fn test_unresolvable_goal_reports_failure() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let request = NavigationRequest::new("kitchen", Point2D::new(50.0, 50.0));
        let result = nav.plan_navigation(&mut ctx, &request);

        assert!(!result.success);
        assert!(result.path.is_empty());
        assert_eq!(result.difficulty_level, PathDifficulty::Impossible);
        assert_eq!(result.confidence, 0.0);
        assert!(result.path_cost.is_infinite());
        assert!(result.next_action.contains("Cannot locate 'kitchen'"));
        assert!(ctx.last_result.is_none());

        assert!(matches!(
            nav.resolve_goal(&ctx, "   "),
            Err(NavigationError::GoalUnresolvable(_))
        ));
    }

    #[test]
    fn test_keyword_without_object_falls_back_to_center() {
        let nav = planner();
        let ctx = PlannerContext::new();
        assert_eq!(nav.resolve_goal(&ctx, "computer").unwrap(), GridNode::new(32, 24));
    }

    #[test]
    fn test_keyword_goal_snaps_off_obstacle() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let frame = vec![det("whiteboard", 0.9, 400.0, 100.0, 500.0, 200.0)];
        nav.update_environment_at(&mut ctx, &frame, None, None, t(0))
            .unwrap();

        // whiteboard center (450, 150) sits inside its own obstacle block
        let raw = nav.resolve_goal(&ctx, "find a whiteboard").unwrap();
        assert_eq!(raw, GridNode::new(45, 15));
        assert!(!nav.grid().is_valid(raw));

        let request = NavigationRequest::new("find a whiteboard", Point2D::new(50.0, 50.0))
            .with_algorithm(PathfindingAlgorithm::AStar);
        let result = nav.plan_navigation(&mut ctx, &request);
        assert!(result.success);
        let goal = *result.path.last().unwrap();
        assert!(nav.grid().is_valid(goal));
        assert_eq!(ctx.current_goal, Some(goal));
    }

    #[test]
    fn test_plan_with_astar_produces_annotated_result() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let frame = vec![
            det("monitor", 0.95, 300.0, 150.0, 450.0, 250.0),
            det("table", 0.9, 150.0, 250.0, 250.0, 330.0),
        ];
        nav.update_environment_at(&mut ctx, &frame, Some("f1"), None, t(0))
            .unwrap();

        let request = NavigationRequest::new("monitor", Point2D::new(50.0, 400.0));
        assert_eq!(nav.choose_algorithm(&request), PathfindingAlgorithm::AStar);
        let result = nav.plan_navigation(&mut ctx, &request);

        assert!(result.success);
        assert_eq!(result.algorithm_used, PathfindingAlgorithm::AStar);
        assert_eq!(result.path.first(), Some(&GridNode::new(5, 40)));
        assert_eq!(result.path.last(), Some(&GridNode::new(37, 20)));
        assert_eq!(result.pixel_path.len(), result.path.len());
        assert_eq!(result.pixel_path[0], Point2D::new(55.0, 405.0));
        assert!(result.path.iter().all(|n| nav.grid().is_valid(*n)));
        assert!((0.1..=1.0).contains(&result.confidence));
        assert!(result.confidence > 0.9);
        assert!(result.path_cost.is_finite() && result.path_cost > 0.0);
        assert!(result.estimated_duration_s >= 0.5 * result.path.len() as f64);
        assert!(!result.waypoint_descriptions.is_empty());
        assert!(result.next_action.starts_with("Head "));
        assert!(result.next_action.ends_with("toward monitor"));
        // the goal cell carries the monitor tag
        assert!(result.semantic_guidance.path_objects.contains(&"monitor".to_string()));
        assert!(result.semantic_guidance.landmarks_available >= 1);
        assert_eq!(ctx.active_path, result.path);
        assert_eq!(ctx.last_algorithm, Some(PathfindingAlgorithm::AStar));

        let next = nav.get_next_waypoint(&ctx, Point2D::new(52.0, 402.0)).unwrap();
        assert_eq!(next.waypoint_index, 1);
        assert_eq!(next.grid_pos, result.path[1]);
        assert_eq!(next.distance, 0);
        assert_eq!(next.total_waypoints, result.path.len());

        let stats = nav.planning_statistics(&ctx);
        assert_eq!(stats.grid_dimensions, (64, 48));
        assert_eq!(stats.persistent_objects, 2);
        assert!(stats.last_result.is_some());
    }

    #[test]
    fn test_auto_selection() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let request = NavigationRequest::new("computer", Point2D::new(50.0, 50.0));
        assert_eq!(nav.choose_algorithm(&request), PathfindingAlgorithm::AStar);

        let explore = request.clone().with_strategy(NavigationStrategy::Exploration);
        assert_eq!(nav.choose_algorithm(&explore), PathfindingAlgorithm::RrtStar);

        let forced = request.clone().with_algorithm(PathfindingAlgorithm::RrtStar);
        assert_eq!(nav.choose_algorithm(&forced), PathfindingAlgorithm::RrtStar);

        // a wall over the top half of the frame
        let wall = vec![det("whiteboard", 0.9, 0.0, 0.0, 639.0, 239.0)];
        nav.update_environment_at(&mut ctx, &wall, None, None, t(0))
            .unwrap();
        assert!(nav.grid().obstacle_fraction() > 0.3);
        assert_eq!(nav.choose_algorithm(&request), PathfindingAlgorithm::RrtStar);

        // three frames with a changing class set drop stability to 0.6
        let frames = [
            vec![det("monitor", 0.9, 300.0, 300.0, 350.0, 350.0)],
            vec![det("books", 0.9, 300.0, 300.0, 350.0, 350.0)],
        ];
        for (i, frame) in frames.iter().enumerate() {
            nav.update_environment_at(&mut ctx, frame, None, None, t(1 + i as i64))
                .unwrap();
        }
        assert!(nav.scene_memory().stability() < 0.7);
        assert_eq!(nav.choose_algorithm(&request), PathfindingAlgorithm::DStar);
        assert_eq!(nav.choose_algorithm(&forced), PathfindingAlgorithm::RrtStar);
    }

    #[test]
    fn test_dstar_replans_after_new_obstacle() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        nav.update_environment_at(&mut ctx, &[], None, None, t(0))
            .unwrap();

        let start = Point2D::new(50.0, 50.0);
        let request = NavigationRequest::new("computer", start)
            .with_algorithm(PathfindingAlgorithm::DStar);
        let first = nav.plan_navigation(&mut ctx, &request);
        assert!(first.success);
        assert_eq!(first.path.last(), Some(&GridNode::new(32, 24)));

        // nothing changed yet
        assert!(nav.replan_if_needed(&mut ctx, start).unwrap().is_none());

        let table = vec![det("table", 0.9, 100.0, 100.0, 250.0, 250.0)];
        nav.update_environment_at(&mut ctx, &table, None, None, t(1))
            .unwrap();
        let replanned = nav
            .replan_if_needed(&mut ctx, start)
            .unwrap()
            .expect("grid changed, path must be repaired");

        assert!(replanned.success);
        assert_eq!(replanned.algorithm_used, PathfindingAlgorithm::DStar);
        assert_eq!(replanned.next_action, "Following replanned path");
        assert!(replanned.path.iter().all(|n| nav.grid().is_valid(*n)));
        assert!(replanned.path_cost >= first.path_cost - 1e-3);
        assert_eq!(ctx.active_path, replanned.path);
    }

    #[test]
    fn test_replan_skipped_for_static_planners() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let start = Point2D::new(50.0, 50.0);
        let request = NavigationRequest::new("computer", start)
            .with_algorithm(PathfindingAlgorithm::AStar);
        assert!(nav.plan_navigation(&mut ctx, &request).success);

        let table = vec![det("table", 0.9, 100.0, 100.0, 250.0, 250.0)];
        nav.update_environment_at(&mut ctx, &table, None, None, t(1))
            .unwrap();
        assert!(nav.replan_if_needed(&mut ctx, start).unwrap().is_none());
    }

    #[test]
    fn test_timed_out_search_keeps_previous_navigation() {
        let mut nav = planner();
        let mut ctx = PlannerContext::new();
        let start = Point2D::new(50.0, 50.0);
        let request = NavigationRequest::new("computer", start)
            .with_algorithm(PathfindingAlgorithm::AStar);
        let planned = nav.plan_navigation(&mut ctx, &request);
        assert!(planned.success);

        let rushed = nav.plan_navigation(&mut ctx, &request.clone().with_timeout(0.0));
        assert!(!rushed.success);
        assert_eq!(rushed.algorithm_used, PathfindingAlgorithm::AStar);
        assert_eq!(rushed.next_action, "Planning timed out before reaching destination");
        assert_eq!(rushed.difficulty_level, PathDifficulty::Impossible);
        assert!(nav.astar.last_stats().timed_out);
        assert_eq!(ctx.active_path, planned.path);

        ctx.clear_navigation();
        assert!(!ctx.has_active_path());
        assert!(ctx.current_goal.is_none());
        assert!(nav.get_next_waypoint(&ctx, start).is_none());
        assert!(ctx.last_result.is_some());
    }

    #[test]
    fn test_difficulty_and_duration_from_cell_costs() {
        let mut nav = planner();
        let path: Vec<GridNode> = (0..10).map(|x| GridNode::new(x, 0)).collect();
        assert_eq!(nav.path_difficulty(&path), PathDifficulty::Easy);
        assert!((nav.traversal_time(&path) - 5.0).abs() < 1e-9);
        assert_eq!(nav.path_difficulty(&[]), PathDifficulty::Impossible);

        // 3 of 10 cells above 5.0: high-cost ratio 0.3 > 0.2
        for x in 0..3 {
            nav.grid_mut().set_cost(GridNode::new(x, 0), 6.0);
        }
        assert_eq!(nav.path_difficulty(&path), PathDifficulty::Moderate);

        for x in 0..6 {
            nav.grid_mut().set_cost(GridNode::new(x, 0), 6.0);
        }
        assert_eq!(nav.path_difficulty(&path), PathDifficulty::Difficult);
        assert!((nav.traversal_time(&path) - (0.5 * 36.0 + 0.5 * 4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_waypoint_descriptions_sample_path() {
        let nav = planner();
        let path: Vec<GridNode> = (0..12).map(|x| GridNode::new(x, 5)).collect();
        let descriptions = nav.waypoint_descriptions(&path);
        // step 12 / 5 = 2
        assert_eq!(descriptions.len(), 6);
        assert!(descriptions.iter().all(|d| d == "Continue forward"));
    }
}
