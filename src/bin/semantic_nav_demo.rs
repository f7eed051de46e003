// Semantic navigation demo
//
// Feeds a few frames of library detections to the planner, asks for a
// goal and plots the grid with the planned path.
//
// usage: semantic_nav_demo [config.json] [frames.json]
//   frames.json holds an array of frames, each an array of detections

use std::env;
use std::fs;

use semantic_nav::path_planning::RRTStarPlanner;
use semantic_nav::utils::{colors, plot_navigation_result, PathStyle, Visualizer};
use semantic_nav::{
    BoundingBox, Detection, NavResult, NavigationConfig, NavigationPlanner, NavigationRequest,
    PlannerContext, Point2D,
};

fn default_frames() -> Vec<Vec<Detection>> {
    let monitor = Detection::new("monitor", 0.95, BoundingBox::new(300.0, 150.0, 450.0, 250.0), "center", "large");
    let chair = Detection::new("office-chair", 0.85, BoundingBox::new(200.0, 350.0, 300.0, 450.0), "bottom-left", "medium");
    let table = Detection::new("table", 0.9, BoundingBox::new(120.0, 220.0, 280.0, 300.0), "center-left", "large");
    vec![
        vec![monitor.clone(), chair.clone()],
        vec![monitor.clone(), chair.clone(), table.clone()],
        vec![monitor, chair, table],
    ]
}

fn main() -> NavResult<()> {
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => NavigationConfig::from_json_file(path)?,
        None => NavigationConfig::default(),
    };
    let frames: Vec<Vec<Detection>> = match args.get(2) {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => default_frames(),
    };

    let rrt_config = config.rrt_star.clone();
    let mut planner = NavigationPlanner::new(config)?;
    let mut ctx = PlannerContext::new();

    for (i, frame) in frames.iter().enumerate() {
        let report = planner.update_environment(&mut ctx, frame, Some("Computer lab"))?;
        println!(
            "frame {}: zone {}, {} persistent objects, stability {:.2}",
            i,
            report.map_update.zone_type,
            report.map_update.persistent_objects,
            report.memory_update.stats.scene_stability
        );
    }

    let request = NavigationRequest::new("computer lab", Point2D::new(50.0, 50.0)).with_timeout(5.0);
    let result = planner.plan_navigation(&mut ctx, &request);
    if !result.success {
        println!("planning failed: {}", result.next_action);
        return Ok(());
    }

    println!("algorithm:  {}", result.algorithm_used);
    println!("waypoints:  {}", result.path.len());
    println!("cost:       {:.2}", result.path_cost);
    println!("confidence: {:.2}", result.confidence);
    println!("difficulty: {}", result.difficulty_level);
    println!("duration:   {:.1}s", result.estimated_duration_s);
    println!("next:       {}", result.next_action);
    for description in &result.waypoint_descriptions {
        println!("  - {}", description);
    }

    let mut vis = plot_navigation_result(planner.grid(), &result, "Semantic navigation");
    vis.save_svg("semantic_nav_demo.svg")?;
    println!("plot saved to semantic_nav_demo.svg");

    // Same query with RRT*, drawn with its exploration tree
    let (Some(&start), Some(&goal)) = (result.path.first(), result.path.last()) else {
        return Ok(());
    };
    let mut rrt = RRTStarPlanner::new(rrt_config);
    match rrt.find_path(planner.grid(), start, goal) {
        Ok(path) => {
            println!(
                "rrt_star:   {} cells, cost {:.2}, tree {} nodes",
                path.len(),
                rrt.last_stats().path_cost,
                rrt.last_stats().tree_size
            );
            let mut tree_vis = Visualizer::new();
            tree_vis
                .set_title("RRT* exploration tree")
                .plot_grid(planner.grid())
                .plot_tree(&rrt.tree_edges())
                .plot_grid_path(planner.grid(), &path, &PathStyle::new(colors::PATH, "rrt_star"))
                .plot_start(planner.grid().grid_to_pixel(start))
                .plot_goal(planner.grid().grid_to_pixel(goal));
            tree_vis.save_svg("semantic_nav_tree.svg")?;
            println!("tree saved to semantic_nav_tree.svg");
        }
        Err(e) => println!("rrt_star failed: {}", e),
    }
    Ok(())
}
