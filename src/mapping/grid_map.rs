//! Occupancy/cost grid built from semantic detections
//!
//! The camera frame is discretized into square cells of `resolution`
//! pixels. Each cell carries an occupancy kind, a traversal cost (>= 1.0),
//! the confidence of the detection that last touched it and an optional
//! semantic tag. Detections of blocking classes mark cells as obstacles;
//! everything else only raises cost. After rasterization the obstacle
//! mask is dilated into a soft buffer of elevated cost.

use std::collections::HashMap;

use log::{debug, trace};
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::common::{Detection, GridNode, NavResult, NavigationError, Point2D};

/// Occupancy state of a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Free,
    Obstacle,
    Unknown,
    Goal,
    Start,
    Path,
}

/// Semantic annotation attached to a cell by the last detection touching it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTag {
    pub class_name: String,
    pub confidence: f32,
    pub frame_position: String,
}

/// Snapshot of a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub kind: CellKind,
    pub cost: f32,
    pub confidence: f32,
    pub semantic: Option<SemanticTag>,
}

/// Configuration for the navigation grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridMapConfig {
    /// Camera image width in pixels
    pub image_width: u32,
    /// Camera image height in pixels
    pub image_height: u32,
    /// Pixels per grid cell
    pub resolution: f64,
    /// Obstacle dilation radius in cells (0 disables inflation)
    pub inflation_radius: i32,
    /// Multiplier applied to `inflation_base_cost` for buffer cells
    pub safety_margin: f32,
    pub inflation_base_cost: f32,
    /// Base traversal cost per detected class
    pub class_costs: HashMap<String, f32>,
    /// Cost for classes missing from `class_costs`
    pub default_class_cost: f32,
    /// Classes that block movement outright
    pub obstacle_classes: Vec<String>,
    /// Fraction of the class cost applied by non-blocking classes
    pub non_obstacle_cost_factor: f32,
}

impl Default for GridMapConfig {
    fn default() -> Self {
        let class_costs = [
            ("office-chair", 10.0),
            ("table", 15.0),
            ("books", 8.0),
            ("whiteboard", 20.0),
            ("monitor", 3.0),
            ("tv", 4.0),
        ]
        .iter()
        .map(|(name, cost)| (name.to_string(), *cost))
        .collect();

        Self {
            image_width: 640,
            image_height: 480,
            resolution: 10.0,
            inflation_radius: 2,
            safety_margin: 1.5,
            inflation_base_cost: 5.0,
            class_costs,
            default_class_cost: 5.0,
            obstacle_classes: ["office-chair", "table", "books", "whiteboard"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            non_obstacle_cost_factor: 0.5,
        }
    }
}

/// Navigation grid over the camera frame
#[derive(Debug, Clone)]
pub struct GridMap {
    config: GridMapConfig,
    width: i32,
    height: i32,
    // (row, col) = (y, x)
    kinds: na::DMatrix<CellKind>,
    costs: na::DMatrix<f32>,
    confidence: na::DMatrix<f32>,
    semantic: HashMap<GridNode, SemanticTag>,
}

impl GridMap {
    pub fn new(config: GridMapConfig) -> NavResult<Self> {
        if !(config.resolution > 0.0) {
            return Err(NavigationError::InvalidParameter(format!(
                "resolution must be > 0, got {}",
                config.resolution
            )));
        }
        let width = (config.image_width as f64 / config.resolution).floor() as i32;
        let height = (config.image_height as f64 / config.resolution).floor() as i32;
        if width < 1 || height < 1 {
            return Err(NavigationError::InvalidParameter(format!(
                "image {}x{} at resolution {} yields an empty grid",
                config.image_width, config.image_height, config.resolution
            )));
        }

        debug!("Grid map initialized: {}x{} cells", width, height);

        let (rows, cols) = (height as usize, width as usize);
        Ok(GridMap {
            config,
            width,
            height,
            kinds: na::DMatrix::from_element(rows, cols, CellKind::Free),
            costs: na::DMatrix::from_element(rows, cols, 1.0),
            confidence: na::DMatrix::from_element(rows, cols, 1.0),
            semantic: HashMap::new(),
        })
    }

    /// Grid over an image of the given size with default costs
    pub fn from_image_size(image_width: u32, image_height: u32, resolution: f64) -> NavResult<Self> {
        Self::new(GridMapConfig {
            image_width,
            image_height,
            resolution,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &GridMapConfig {
        &self.config
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    pub fn cell_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn center(&self) -> GridNode {
        GridNode::new(self.width / 2, self.height / 2)
    }

    pub fn in_bounds(&self, node: GridNode) -> bool {
        node.x >= 0 && node.x < self.width && node.y >= 0 && node.y < self.height
    }

    pub fn node_at(&self, index: usize) -> GridNode {
        let index = index as i32;
        GridNode::new(index % self.width, index / self.width)
    }

    fn rc(node: GridNode) -> (usize, usize) {
        (node.y as usize, node.x as usize)
    }

    /// Pixel coordinate to the cell containing it, clamped to the grid
    pub fn pixel_to_grid(&self, pixel_x: f64, pixel_y: f64) -> GridNode {
        let gx = (pixel_x / self.config.resolution).floor();
        let gy = (pixel_y / self.config.resolution).floor();
        let gx = if gx.is_finite() { gx as i64 } else { 0 };
        let gy = if gy.is_finite() { gy as i64 } else { 0 };
        GridNode::new(
            gx.clamp(0, (self.width - 1) as i64) as i32,
            gy.clamp(0, (self.height - 1) as i64) as i32,
        )
    }

    /// Cell center in pixels
    pub fn grid_to_pixel(&self, node: GridNode) -> Point2D {
        Point2D::new(
            (node.x as f64 + 0.5) * self.config.resolution,
            (node.y as f64 + 0.5) * self.config.resolution,
        )
    }

    pub fn update_from_detections(&mut self, detections: &[Detection], clear_previous: bool) {
        if clear_previous {
            self.kinds.fill(CellKind::Free);
            self.costs.fill(1.0);
            self.confidence.fill(1.0);
            self.semantic.clear();
        }

        for detection in detections {
            self.add_detection(detection);
        }

        self.inflate_obstacles();

        debug!(
            "Grid updated from {} detections, obstacle fraction {:.3}",
            detections.len(),
            self.obstacle_fraction()
        );
    }

    fn add_detection(&mut self, detection: &Detection) {
        let bbox = &detection.bbox;
        let a = self.pixel_to_grid(bbox.x1, bbox.y1);
        let b = self.pixel_to_grid(bbox.x2, bbox.y2);
        let (x1, x2) = (a.x.min(b.x), a.x.max(b.x));
        let (y1, y2) = (a.y.min(b.y), a.y.max(b.y));

        let cost = self.class_cost(&detection.class_name, detection.confidence);
        let blocking = self.is_obstacle_class(&detection.class_name);

        trace!(
            "Rasterizing {} ({:.2}) into cells x {}..={} y {}..={}, cost {:.2}",
            detection.class_name, detection.confidence, x1, x2, y1, y2, cost
        );

        let tag = SemanticTag {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            frame_position: detection.frame_position.clone(),
        };

        for y in y1..=y2 {
            for x in x1..=x2 {
                let node = GridNode::new(x, y);
                let rc = Self::rc(node);
                if blocking {
                    self.kinds[rc] = CellKind::Obstacle;
                    self.costs[rc] = cost.max(1.0);
                } else {
                    let raised = cost * self.config.non_obstacle_cost_factor;
                    self.costs[rc] = self.costs[rc].max(raised);
                }
                self.confidence[rc] = detection.confidence;
                self.semantic.insert(node, tag.clone());
            }
        }
    }

    pub fn is_obstacle_class(&self, class_name: &str) -> bool {
        self.config.obstacle_classes.iter().any(|c| c == class_name)
    }

    /// Base class cost scaled by detection confidence
    pub fn class_cost(&self, class_name: &str, confidence: f32) -> f32 {
        let base = self
            .config
            .class_costs
            .get(class_name)
            .copied()
            .unwrap_or(self.config.default_class_cost);
        base * (0.5 + 1.5 * confidence)
    }

    fn inflate_obstacles(&mut self) {
        let r = self.config.inflation_radius;
        if r <= 0 {
            return;
        }
        let inflated_cost = self.config.inflation_base_cost * self.config.safety_margin;
        // Disc of radius r with a +r slack on r^2; approximates a (2r+1) ellipse
        // element, 21 cells at r = 2 where a rasterized ellipse gives 17
        let kernel: Vec<(i32, i32)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= r * r + r)
            .collect();

        let obstacles: Vec<GridNode> = self.obstacle_cells().collect();
        let mut buffered = 0usize;
        for obstacle in obstacles {
            for &(dx, dy) in &kernel {
                let node = obstacle.offset(dx, dy);
                if !self.in_bounds(node) {
                    continue;
                }
                let rc = Self::rc(node);
                if self.kinds[rc] == CellKind::Free && self.costs[rc] < inflated_cost {
                    self.costs[rc] = inflated_cost;
                    buffered += 1;
                }
            }
        }
        trace!("Inflation raised cost of {} cells to {:.2}", buffered, inflated_cost);
    }

    pub fn obstacle_cells(&self) -> impl Iterator<Item = GridNode> + '_ {
        (0..self.cell_count())
            .map(move |i| self.node_at(i))
            .filter(move |n| self.kinds[Self::rc(*n)] == CellKind::Obstacle)
    }

    /// In bounds and not an obstacle
    pub fn is_valid_position(&self, x: i32, y: i32) -> bool {
        self.is_valid(GridNode::new(x, y))
    }

    pub fn is_valid(&self, node: GridNode) -> bool {
        self.in_bounds(node) && self.kinds[Self::rc(node)] != CellKind::Obstacle
    }

    /// Traversal cost, infinite for invalid cells
    pub fn get_cost(&self, node: GridNode) -> f32 {
        if !self.is_valid(node) {
            return f32::INFINITY;
        }
        self.costs[Self::rc(node)]
    }

    /// Stored cost layer value regardless of occupancy
    pub fn raw_cost(&self, node: GridNode) -> Option<f32> {
        if !self.in_bounds(node) {
            return None;
        }
        Some(self.costs[Self::rc(node)])
    }

    pub fn kind(&self, node: GridNode) -> Option<CellKind> {
        if !self.in_bounds(node) {
            return None;
        }
        Some(self.kinds[Self::rc(node)])
    }

    pub fn cell(&self, node: GridNode) -> Option<GridCell> {
        if !self.in_bounds(node) {
            return None;
        }
        let rc = Self::rc(node);
        Some(GridCell {
            kind: self.kinds[rc],
            cost: self.costs[rc],
            confidence: self.confidence[rc],
            semantic: self.semantic.get(&node).cloned(),
        })
    }

    pub fn semantic_info(&self, node: GridNode) -> Option<&SemanticTag> {
        self.semantic.get(&node)
    }

    /// Overwrite a cell's cost (clamped to >= 1.0)
    pub fn set_cost(&mut self, node: GridNode, cost: f32) {
        if self.in_bounds(node) {
            self.costs[Self::rc(node)] = cost.max(1.0);
        }
    }

    pub fn set_kind(&mut self, node: GridNode, kind: CellKind) {
        if self.in_bounds(node) {
            self.kinds[Self::rc(node)] = kind;
        }
    }

    /// Valid 4- or 8-connected neighbors
    pub fn get_neighbors(&self, node: GridNode, include_diagonal: bool) -> Vec<GridNode> {
        let motions: &[(i32, i32)] = if include_diagonal {
            &MOTIONS_8
        } else {
            &MOTIONS_8[..4]
        };
        motions
            .iter()
            .map(|&(dx, dy)| node.offset(dx, dy))
            .filter(|n| self.is_valid(*n))
            .collect()
    }

    /// In-bounds 8-connected neighbors regardless of occupancy
    pub fn neighbors_in_bounds(&self, node: GridNode) -> impl Iterator<Item = GridNode> + '_ {
        MOTIONS_8
            .iter()
            .map(move |&(dx, dy)| node.offset(dx, dy))
            .filter(move |n| self.in_bounds(*n))
    }

    /// Cost of stepping between adjacent cells: (1 or sqrt 2) x destination cost
    pub fn movement_cost(&self, from: GridNode, to: GridNode) -> f32 {
        let base = if from.is_diagonal_to(&to) {
            std::f32::consts::SQRT_2
        } else {
            1.0
        };
        base * self.get_cost(to)
    }

    /// Mark the goal cell if it is traversable
    pub fn set_goal(&mut self, pixel_x: f64, pixel_y: f64) -> Option<GridNode> {
        let node = self.pixel_to_grid(pixel_x, pixel_y);
        if self.is_valid(node) {
            self.kinds[Self::rc(node)] = CellKind::Goal;
            return Some(node);
        }
        None
    }

    /// Mark the start cell; allowed even inside an occupied cell
    pub fn set_start(&mut self, pixel_x: f64, pixel_y: f64) -> GridNode {
        let node = self.pixel_to_grid(pixel_x, pixel_y);
        self.kinds[Self::rc(node)] = CellKind::Start;
        node
    }

    pub fn clear_path(&mut self) {
        for kind in self.kinds.iter_mut() {
            if *kind == CellKind::Path {
                *kind = CellKind::Free;
            }
        }
    }

    pub fn mark_path(&mut self, path: &[GridNode]) {
        self.clear_path();
        for &node in path {
            if self.kind(node) == Some(CellKind::Free) {
                self.kinds[Self::rc(node)] = CellKind::Path;
            }
        }
    }

    /// Largest ring radius around `node` with no invalid cell on any inner ring
    pub fn safe_radius_around(&self, node: GridNode, max_radius: i32) -> i32 {
        for radius in 1..=max_radius {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    if !self.is_valid(node.offset(dx, dy)) {
                        return radius - 1;
                    }
                }
            }
        }
        max_radius
    }

    /// Nearest traversable cell, searching square rings outward
    pub fn nearest_valid(&self, node: GridNode, max_radius: i32) -> Option<GridNode> {
        let node = GridNode::new(
            node.x.clamp(0, self.width - 1),
            node.y.clamp(0, self.height - 1),
        );
        if self.is_valid(node) {
            return Some(node);
        }
        for radius in 1..=max_radius {
            let mut best: Option<(f32, GridNode)> = None;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let candidate = node.offset(dx, dy);
                    if !self.is_valid(candidate) {
                        continue;
                    }
                    let d = node.euclidean(&candidate);
                    if best.map_or(true, |(bd, _)| d < bd) {
                        best = Some((d, candidate));
                    }
                }
            }
            if let Some((_, found)) = best {
                return Some(found);
            }
        }
        None
    }

    pub fn obstacle_fraction(&self) -> f32 {
        let obstacles = self
            .kinds
            .iter()
            .filter(|k| **k == CellKind::Obstacle)
            .count();
        obstacles as f32 / self.cell_count() as f32
    }

    /// Bresenham line check; every visited cell must be valid
    pub fn line_of_sight(&self, from: GridNode, to: GridNode) -> bool {
        let (mut x, mut y) = (from.x, from.y);
        let dx = (to.x - from.x).abs();
        let dy = (to.y - from.y).abs();
        let sx = if from.x < to.x { 1 } else { -1 };
        let sy = if from.y < to.y { 1 } else { -1 };
        let mut err = dx - dy;

        loop {
            if !self.is_valid(GridNode::new(x, y)) {
                return false;
            }
            if x == to.x && y == to.y {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
        true
    }

    /// Effective cost of every cell (infinite for obstacles), row-major
    pub fn cost_snapshot(&self) -> na::DMatrix<f32> {
        na::DMatrix::from_fn(self.height as usize, self.width as usize, |r, c| {
            if self.kinds[(r, c)] == CellKind::Obstacle {
                f32::INFINITY
            } else {
                self.costs[(r, c)]
            }
        })
    }
}

/// dx, dy: 4-connected first, then diagonals
const MOTIONS_8: [(i32, i32); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BoundingBox;

    fn table(x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection::new("table", 0.9, BoundingBox::new(x1, y1, x2, y2), "center", "large")
    }

    #[test]
    fn test_dimensions_are_floored() {
        let grid = GridMap::from_image_size(645, 479, 10.0).unwrap();
        assert_eq!(grid.width(), 64);
        assert_eq!(grid.height(), 47);
        assert!(GridMap::from_image_size(5, 5, 10.0).is_err());
        assert!(GridMap::from_image_size(640, 480, 0.0).is_err());
    }

    #[test]
    fn test_pixel_grid_round_trip() {
        let grid = GridMap::from_image_size(640, 480, 15.0).unwrap();
        for &(px, py) in &[(0.0, 0.0), (7.4, 299.9), (639.9, 479.9), (321.0, 17.0), (-20.0, 900.0)] {
            let cell = grid.pixel_to_grid(px, py);
            let center = grid.grid_to_pixel(cell);
            assert_eq!(grid.pixel_to_grid(center.x, center.y), cell);
            let again = grid.grid_to_pixel(grid.pixel_to_grid(center.x, center.y));
            assert_eq!(again, center);
        }
        assert_eq!(grid.pixel_to_grid(-20.0, 900.0), GridNode::new(0, grid.height() - 1));
    }

    #[test]
    fn test_obstacle_rasterization_and_inflation() {
        let mut grid = GridMap::from_image_size(320, 240, 10.0).unwrap();
        grid.update_from_detections(&[table(100.0, 100.0, 159.0, 159.0)], true);

        let inside = GridNode::new(12, 12);
        assert_eq!(grid.kind(inside), Some(CellKind::Obstacle));
        assert!(!grid.is_valid(inside));
        assert_eq!(grid.get_cost(inside), f32::INFINITY);
        let expected = 15.0 * (0.5 + 1.5 * 0.9);
        assert!((grid.raw_cost(inside).unwrap() - expected).abs() < 1e-4);

        // Buffer cells stay free but get the inflated cost
        let buffer = GridNode::new(8, 12);
        assert_eq!(grid.kind(buffer), Some(CellKind::Free));
        assert!((grid.get_cost(buffer) - 7.5).abs() < 1e-6);

        let far = GridNode::new(2, 2);
        assert_eq!(grid.get_cost(far), 1.0);
        assert_eq!(grid.obstacle_cells().count(), 36);
    }

    #[test]
    fn test_non_obstacle_class_only_raises_cost() {
        let mut grid = GridMap::from_image_size(320, 240, 10.0).unwrap();
        let monitor = Detection::new(
            "monitor",
            1.0,
            BoundingBox::new(50.0, 50.0, 80.0, 80.0),
            "center",
            "medium",
        );
        grid.update_from_detections(&[monitor], true);
        let cell = grid.cell(GridNode::new(6, 6)).unwrap();
        assert_eq!(cell.kind, CellKind::Free);
        assert!((cell.cost - 3.0).abs() < 1e-6);
        assert_eq!(cell.semantic.unwrap().class_name, "monitor");
    }

    #[test]
    fn test_semantic_tag_overwritten_by_latest_detection() {
        let mut grid = GridMap::from_image_size(320, 240, 10.0).unwrap();
        let books = Detection::new("books", 0.8, BoundingBox::new(0.0, 0.0, 50.0, 50.0), "left", "");
        let chair = Detection::new(
            "office-chair",
            0.8,
            BoundingBox::new(30.0, 30.0, 60.0, 60.0),
            "left",
            "",
        );
        grid.update_from_detections(&[books, chair], true);
        assert_eq!(grid.semantic_info(GridNode::new(4, 4)).unwrap().class_name, "office-chair");
        assert_eq!(grid.semantic_info(GridNode::new(1, 1)).unwrap().class_name, "books");

        grid.update_from_detections(&[], true);
        assert!(grid.semantic_info(GridNode::new(1, 1)).is_none());
        assert_eq!(grid.obstacle_fraction(), 0.0);
    }

    #[test]
    fn test_neighbors() {
        let mut grid = GridMap::from_image_size(100, 100, 10.0).unwrap();
        assert_eq!(grid.get_neighbors(GridNode::new(5, 5), true).len(), 8);
        assert_eq!(grid.get_neighbors(GridNode::new(5, 5), false).len(), 4);
        assert_eq!(grid.get_neighbors(GridNode::new(0, 0), true).len(), 3);

        grid.set_kind(GridNode::new(6, 5), CellKind::Obstacle);
        assert_eq!(grid.get_neighbors(GridNode::new(5, 5), true).len(), 7);
    }

    #[test]
    fn test_line_of_sight_and_safe_radius() {
        let mut grid = GridMap::from_image_size(200, 200, 10.0).unwrap();
        for y in 5..15 {
            grid.set_kind(GridNode::new(10, y), CellKind::Obstacle);
        }
        assert!(grid.line_of_sight(GridNode::new(2, 2), GridNode::new(5, 5)));
        assert!(!grid.line_of_sight(GridNode::new(5, 10), GridNode::new(15, 10)));
        assert_eq!(grid.safe_radius_around(GridNode::new(8, 10), 5), 1);
        assert_eq!(grid.safe_radius_around(GridNode::new(3, 3), 2), 2);
    }

    #[test]
    fn test_nearest_valid() {
        let mut grid = GridMap::from_image_size(320, 240, 10.0).unwrap();
        grid.update_from_detections(&[table(100.0, 100.0, 159.0, 159.0)], true);
        let found = grid.nearest_valid(GridNode::new(12, 10), 10).unwrap();
        assert!(grid.is_valid(found));
        assert_eq!(found, GridNode::new(12, 9));
        assert_eq!(grid.nearest_valid(GridNode::new(1, 1), 3), Some(GridNode::new(1, 1)));
    }

    #[test]
    fn test_mark_path_and_start_goal() {
        let mut grid = GridMap::from_image_size(100, 100, 10.0).unwrap();
        let start = grid.set_start(5.0, 5.0);
        let goal = grid.set_goal(95.0, 95.0).unwrap();
        assert_eq!(grid.kind(start), Some(CellKind::Start));
        assert_eq!(grid.kind(goal), Some(CellKind::Goal));

        let path = vec![start, GridNode::new(1, 1), GridNode::new(2, 2), goal];
        grid.mark_path(&path);
        assert_eq!(grid.kind(GridNode::new(1, 1)), Some(CellKind::Path));
        assert_eq!(grid.kind(start), Some(CellKind::Start));
        grid.clear_path();
        assert_eq!(grid.kind(GridNode::new(1, 1)), Some(CellKind::Free));
    }

    #[test]
    fn test_cost_snapshot_marks_obstacles_infinite() {
        let mut grid = GridMap::from_image_size(100, 100, 10.0).unwrap();
        grid.set_kind(GridNode::new(3, 4), CellKind::Obstacle);
        grid.set_cost(GridNode::new(5, 5), 4.0);
        let snap = grid.cost_snapshot();
        assert_eq!(snap[(4, 3)], f32::INFINITY);
        assert_eq!(snap[(5, 5)], 4.0);
        assert_eq!(snap[(0, 0)], 1.0);
    }
}
