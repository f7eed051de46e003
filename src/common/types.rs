//! Common types used throughout semantic_nav

use serde::{Deserialize, Serialize};

use crate::common::error::{NavResult, NavigationError};

/// 2D point in continuous (pixel) space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Point at fraction `t` of the way from `self` to `other`
    pub fn lerp(&self, other: &Point2D, t: f64) -> Point2D {
        Point2D::new(
            self.x + t * (other.x - self.x),
            self.y + t * (other.y - self.y),
        )
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// Integer cell coordinate on the navigation grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridNode {
    pub x: i32,
    pub y: i32,
}

impl GridNode {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> GridNode {
        GridNode::new(self.x + dx, self.y + dy)
    }

    pub fn is_diagonal_to(&self, other: &GridNode) -> bool {
        (self.x - other.x).abs() == 1 && (self.y - other.y).abs() == 1
    }

    pub fn euclidean(&self, other: &GridNode) -> f32 {
        (((self.x - other.x).pow(2) + (self.y - other.y).pow(2)) as f32).sqrt()
    }

    pub fn manhattan(&self, other: &GridNode) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl From<(i32, i32)> for GridNode {
    fn from(tuple: (i32, i32)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// Axis-aligned bounding box in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point2D {
        Point2D::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// One object detection supplied by the perception collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Coarse frame region, e.g. "center", "left", "bottom-right"
    pub frame_position: String,
    /// Coarse size bucket, e.g. "small", "medium", "large"
    #[serde(default)]
    pub relative_size: String,
}

impl Detection {
    pub fn new(
        class_name: &str,
        confidence: f32,
        bbox: BoundingBox,
        frame_position: &str,
        relative_size: &str,
    ) -> Self {
        Self {
            class_name: class_name.to_string(),
            confidence,
            bbox,
            frame_position: frame_position.to_string(),
            relative_size: relative_size.to_string(),
        }
    }

    pub fn center(&self) -> Point2D {
        self.bbox.center()
    }

    /// Reject detections that would feed garbage into the models
    pub fn validate(&self) -> NavResult<()> {
        if self.class_name.trim().is_empty() {
            return Err(NavigationError::InvalidDetection(
                "empty class name".to_string(),
            ));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(NavigationError::InvalidDetection(format!(
                "{}: confidence {} outside [0, 1]",
                self.class_name, self.confidence
            )));
        }
        let b = &self.bbox;
        if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) {
            return Err(NavigationError::InvalidDetection(format!(
                "{}: non-finite bounding box",
                self.class_name
            )));
        }
        if self.frame_position.trim().is_empty() {
            return Err(NavigationError::InvalidDetection(format!(
                "{}: missing frame position",
                self.class_name
            )));
        }
        Ok(())
    }
}

/// Statistics recorded by the last search call of any planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Nodes popped (A*, D*) or iterations run (RRT*)
    pub nodes_explored: usize,
    pub path_length: usize,
    pub path_cost: f32,
    pub search_time_s: f64,
    pub success: bool,
    pub timed_out: bool,
    /// D* only: number of environment repairs since `set_goal`
    pub replan_count: usize,
    /// RRT* only: nodes in the tree when the search stopped
    pub tree_size: usize,
    /// RRT* only: iteration at which the goal region was first reached
    pub first_solution_iteration: Option<usize>,
    /// RRT* only: best cost at the first goal-region hit
    pub first_solution_cost: Option<f32>,
}

impl SearchStats {
    pub(crate) fn failed(nodes_explored: usize, search_time_s: f64, timed_out: bool) -> Self {
        Self {
            nodes_explored,
            path_cost: f32::INFINITY,
            search_time_s,
            timed_out,
            ..Default::default()
        }
    }
}
