//! Request, result and context records of the navigation planner

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{GridNode, Point2D};
use crate::mapping::SemanticTag;
use crate::semantic_mapping::{MapUpdate, SceneMemoryUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathfindingAlgorithm {
    AStar,
    DStar,
    RrtStar,
    /// Let the planner pick from scene stability and obstacle density
    Auto,
}

impl fmt::Display for PathfindingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathfindingAlgorithm::AStar => "astar",
            PathfindingAlgorithm::DStar => "dstar",
            PathfindingAlgorithm::RrtStar => "rrt_star",
            PathfindingAlgorithm::Auto => "auto",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStrategy {
    Optimal,
    Fast,
    Dynamic,
    /// Unknown or cluttered surroundings; favors the sampling planner
    Exploration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathDifficulty {
    Easy,
    Moderate,
    Difficult,
    Impossible,
}

impl fmt::Display for PathDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathDifficulty::Easy => "easy",
            PathDifficulty::Moderate => "moderate",
            PathDifficulty::Difficult => "difficult",
            PathDifficulty::Impossible => "impossible",
        };
        write!(f, "{}", name)
    }
}

/// One planning query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    /// Free text such as "computer lab" or "quiet study area"
    pub goal_description: String,
    /// Current camera position in pixels
    pub start_pixel: Point2D,
    pub algorithm: PathfindingAlgorithm,
    pub strategy: NavigationStrategy,
    /// Wall-clock budget in seconds handed to the chosen search
    pub timeout_s: f64,
}

impl NavigationRequest {
    pub fn new(goal_description: &str, start_pixel: Point2D) -> Self {
        NavigationRequest {
            goal_description: goal_description.to_string(),
            start_pixel,
            algorithm: PathfindingAlgorithm::Auto,
            strategy: NavigationStrategy::Optimal,
            timeout_s: 10.0,
        }
    }

    pub fn with_algorithm(mut self, algorithm: PathfindingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_strategy(mut self, strategy: NavigationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout_s: f64) -> Self {
        self.timeout_s = timeout_s;
        self
    }
}

/// Human-oriented hints derived from the cells a path crosses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticGuidance {
    /// Distinct classes tagged on path cells, sorted
    pub path_objects: Vec<String>,
    /// Number of environments the scene memory has visited
    pub environment_familiarity: usize,
    pub obstacles_detected: usize,
    pub landmarks_available: usize,
    pub navigation_confidence: f32,
}

/// Outcome of one planning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub success: bool,
    pub path: Vec<GridNode>,
    pub pixel_path: Vec<Point2D>,
    pub algorithm_used: PathfindingAlgorithm,
    pub planning_time_s: f64,
    /// Infinite when planning failed
    pub path_cost: f32,
    pub confidence: f32,
    pub waypoint_descriptions: Vec<String>,
    pub next_action: String,
    pub estimated_duration_s: f64,
    pub difficulty_level: PathDifficulty,
    pub semantic_guidance: SemanticGuidance,
}

impl NavigationResult {
    pub(crate) fn failure(
        algorithm_used: PathfindingAlgorithm,
        planning_time_s: f64,
        next_action: String,
    ) -> Self {
        NavigationResult {
            success: false,
            path: Vec::new(),
            pixel_path: Vec::new(),
            algorithm_used,
            planning_time_s,
            path_cost: f32::INFINITY,
            confidence: 0.0,
            waypoint_descriptions: Vec::new(),
            next_action,
            estimated_duration_s: 0.0,
            difficulty_level: PathDifficulty::Impossible,
            semantic_guidance: SemanticGuidance::default(),
        }
    }
}

/// A named place learned from zone classification or a location hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownLocation {
    pub grid_pos: GridNode,
    /// Mean detection confidence of the frame it was learned from
    pub confidence: f32,
    pub last_seen: DateTime<Utc>,
}

/// Caller-owned state carried between planning calls
#[derive(Debug, Clone, Default)]
pub struct PlannerContext {
    pub known_locations: BTreeMap<String, KnownLocation>,
    pub current_goal: Option<GridNode>,
    pub active_path: Vec<GridNode>,
    pub last_algorithm: Option<PathfindingAlgorithm>,
    pub last_result: Option<NavigationResult>,
}

impl PlannerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_active_path(&self) -> bool {
        !self.active_path.is_empty()
    }

    /// Forget the current goal and path, keep learned locations
    pub fn clear_navigation(&mut self) {
        self.current_goal = None;
        self.active_path.clear();
        self.last_algorithm = None;
    }
}

/// What one frame changed across the three environment models
#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    pub map_update: MapUpdate,
    pub memory_update: SceneMemoryUpdate,
    pub obstacle_fraction: f32,
    pub known_locations: usize,
}

/// Next cell to head for along the active path
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointInfo {
    pub grid_pos: GridNode,
    pub pixel_pos: Point2D,
    /// Manhattan distance (cells) from the caller to the closest path cell
    pub distance: i32,
    pub semantic_info: Option<SemanticTag>,
    pub waypoint_index: usize,
    pub total_waypoints: usize,
}

/// Snapshot of planner state for diagnostics
#[derive(Debug, Clone)]
pub struct PlanningStatistics {
    pub known_locations: usize,
    pub grid_dimensions: (i32, i32),
    pub obstacle_fraction: f32,
    pub last_algorithm: Option<PathfindingAlgorithm>,
    pub last_result: Option<NavigationResult>,
    pub scene_stability: f32,
    pub persistent_objects: usize,
    pub environments_known: usize,
}
