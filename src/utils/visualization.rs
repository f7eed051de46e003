//! Visualization of the navigation grid and planned paths
//!
//! Renders in pixel coordinates with the y axis pointing down, so plots
//! overlay the camera frame they were built from.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{GridNode, NavResult, NavigationError, Point2D};
use crate::mapping::{CellKind, GridMap};
use crate::navigation::NavigationResult;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    pub const OBSTACLE: &str = BLACK;
    pub const HIGH_COST: &str = ORANGE;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const TREE: &str = GRAY;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::PATH, "Path")
    }
}

#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }
}

/// Cell centers of a grid split into drawable layers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridLayers {
    pub obstacles: Vec<Point2D>,
    /// Traversable cells costlier than open floor
    pub high_cost: Vec<Point2D>,
}

impl GridLayers {
    pub fn from_grid(grid: &GridMap) -> Self {
        let mut layers = GridLayers::default();
        for index in 0..grid.cell_count() {
            let node = grid.node_at(index);
            let center = grid.grid_to_pixel(node);
            match grid.kind(node) {
                Some(CellKind::Obstacle) => layers.obstacles.push(center),
                Some(_) if grid.raw_cost(node).map_or(false, |c| c > 1.0) => {
                    layers.high_cost.push(center)
                }
                _ => {}
            }
        }
        layers
    }
}

fn split_xy(points: &[Point2D]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}

fn render_error(e: impl ToString) -> NavigationError {
    NavigationError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    /// Image extent in pixels; the y range is drawn flipped
    extent: Option<(f64, f64)>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "x [px]".to_string(),
            y_label: "y [px]".to_string(),
            extent: None,
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_extent(&mut self, width: f64, height: f64) -> &mut Self {
        self.extent = Some((width, height));
        self
    }

    /// Obstacle cells as squares, buffered/semantic cells as dots
    pub fn plot_grid(&mut self, grid: &GridMap) -> &mut Self {
        let layers = GridLayers::from_grid(grid);
        let size = (grid.resolution() / 10.0).max(0.3);
        let (hx, hy) = split_xy(&layers.high_cost);
        let (ox, oy) = split_xy(&layers.obstacles);

        let axes = self.figure.axes2d();
        axes.points(&hx, &hy, &[
            Caption("High cost"),
            Color(colors::HIGH_COST),
            PointSymbol('.'),
            PointSize(size),
        ]);
        axes.points(&ox, &oy, &[
            Caption("Obstacles"),
            Color(colors::OBSTACLE),
            PointSymbol('S'),
            PointSize(size),
        ]);

        let config = grid.config();
        self.set_extent(config.image_width as f64, config.image_height as f64)
    }

    pub fn plot_pixel_path(&mut self, points: &[Point2D], style: &PathStyle) -> &mut Self {
        let (x, y) = split_xy(points);
        self.figure.axes2d().lines(&x, &y, &[
            Caption(&style.caption),
            Color(&style.color),
            LineWidth(style.line_width),
        ]);
        self
    }

    pub fn plot_grid_path(&mut self, grid: &GridMap, path: &[GridNode], style: &PathStyle) -> &mut Self {
        let points: Vec<Point2D> = path.iter().map(|n| grid.grid_to_pixel(*n)).collect();
        self.plot_pixel_path(&points, style)
    }

    /// Edges of a sampling tree as unconnected segments
    pub fn plot_tree(&mut self, edges: &[(Point2D, Point2D)]) -> &mut Self {
        let axes = self.figure.axes2d();
        for (from, to) in edges {
            axes.lines(&[from.x, to.x], &[from.y, to.y], &[Color(colors::TREE), LineWidth(0.5)]);
        }
        self
    }

    pub fn plot_point(&mut self, point: Point2D, style: &PointStyle) -> &mut Self {
        self.figure.axes2d().points(&[point.x], &[point.y], &[
            Caption(&style.caption),
            Color(&style.color),
            PointSymbol(style.symbol),
            PointSize(style.size),
        ]);
        self
    }

    pub fn plot_start(&mut self, point: Point2D) -> &mut Self {
        self.plot_point(point, &PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    pub fn plot_goal(&mut self, point: Point2D) -> &mut Self {
        self.plot_point(point, &PointStyle::new(colors::GOAL, "Goal").with_size(1.5))
    }

    pub fn show(&mut self) -> NavResult<()> {
        self.apply_settings();
        self.figure.show().map_err(render_error).map(|_| ())
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> NavResult<()> {
        self.apply_settings();
        self.figure.save_to_png(path, width, height).map_err(render_error)
    }

    pub fn save_svg(&mut self, path: &str) -> NavResult<()> {
        self.apply_settings();
        self.figure.save_to_svg(path, 800, 600).map_err(render_error)
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();
        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some((width, height)) = self.extent {
            axes.set_x_range(AutoOption::Fix(0.0), AutoOption::Fix(width));
            axes.set_y_range(AutoOption::Fix(height), AutoOption::Fix(0.0));
        }
        axes.set_aspect_ratio(AutoOption::Fix(1.0));
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Grid, path, start and goal of one planning result in a single figure
pub fn plot_navigation_result(grid: &GridMap, result: &NavigationResult, title: &str) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(title);
    vis.plot_grid(grid);
    if let (Some(start), Some(goal)) = (result.pixel_path.first(), result.pixel_path.last()) {
        vis.plot_pixel_path(&result.pixel_path, &PathStyle::new(colors::PATH, &result.algorithm_used.to_string()));
        vis.plot_start(*start);
        vis.plot_goal(*goal);
    }
    vis
}
