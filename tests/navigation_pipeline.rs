//! End-to-end tests: detections in, annotated navigation results out.

use chrono::{DateTime, Duration, TimeZone, Utc};

use semantic_nav::mapping::CellKind;
use semantic_nav::navigation::{NavigationStrategy, PathDifficulty, PathfindingAlgorithm};
use semantic_nav::path_planning::{AStarConfig, AStarPlanner, DStarPlanner};
use semantic_nav::{
    BoundingBox, Detection, GridMap, GridNode, NavigationConfig, NavigationError,
    NavigationPlanner, NavigationRequest, PlannerContext, Point2D,
};

const LAB_FRAME: &str = r#"[
    {
        "class_name": "monitor",
        "confidence": 0.95,
        "bbox": {"x1": 300, "y1": 150, "x2": 450, "y2": 250},
        "frame_position": "center",
        "relative_size": "large"
    },
    {
        "class_name": "office-chair",
        "confidence": 0.85,
        "bbox": {"x1": 200, "y1": 350, "x2": 300, "y2": 450},
        "frame_position": "bottom-left"
    }
]"#;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 14, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn detection(class: &str, conf: f32, bbox: (f64, f64, f64, f64)) -> Detection {
    Detection::new(class, conf, BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3), "center", "medium")
}

#[test]
fn test_json_frames_to_planned_path() {
    let frame: Vec<Detection> = serde_json::from_str(LAB_FRAME).unwrap();
    assert_eq!(frame[1].relative_size, "");

    let mut planner = NavigationPlanner::new(NavigationConfig::default()).unwrap();
    let mut ctx = PlannerContext::new();
    for i in 0..3 {
        let report = planner
            .update_environment_at(&mut ctx, &frame, None, Some("Computer lab"), at(i))
            .unwrap();
        assert_eq!(report.map_update.zone_type, "computer_lab");
    }

    assert_eq!(planner.map_builder().persistent_objects().len(), 2);
    assert!(planner
        .map_builder()
        .persistent_objects()
        .values()
        .all(|o| o.frequency == 3));
    assert_eq!(planner.scene_memory().tracked_objects().len(), 2);
    assert_eq!(planner.scene_memory().stability(), 1.0);
    assert_eq!(ctx.known_locations["computer lab"].grid_pos, GridNode::new(31, 30));

    let request = NavigationRequest::new("computer lab", Point2D::new(50.0, 50.0));
    let result = planner.plan_navigation(&mut ctx, &request);

    assert!(result.success, "{}", result.next_action);
    assert_eq!(result.algorithm_used, PathfindingAlgorithm::AStar);
    assert_eq!(result.path.first(), Some(&GridNode::new(5, 5)));
    assert_eq!(result.path.last(), Some(&GridNode::new(31, 30)));
    for cell in &result.path {
        assert_ne!(planner.grid().kind(*cell), Some(CellKind::Obstacle));
    }
    assert_ne!(result.difficulty_level, PathDifficulty::Impossible);
    assert!((0.1..=1.0).contains(&result.confidence));
    assert!(result.next_action.ends_with("toward computer lab"));

    let stats = planner.planning_statistics(&ctx);
    assert_eq!(stats.known_locations, 2);
    assert_eq!(stats.last_algorithm, Some(PathfindingAlgorithm::AStar));
}

#[test]
fn test_table_block_is_avoided_by_astar_and_dstar() {
    // 32x24 cells with a table over cells (10,10)-(15,15)
    let mut grid = GridMap::from_image_size(320, 240, 10.0).unwrap();
    let table = detection("table", 0.9, (100.0, 100.0, 159.0, 159.0));
    grid.update_from_detections(&[table], true);
    assert_eq!(grid.obstacle_cells().count(), 36);

    let (start, goal) = (GridNode::new(2, 2), GridNode::new(20, 18));
    let mut astar = AStarPlanner::new(AStarConfig {
        smooth_path: false,
        ..Default::default()
    });
    let path = astar.find_path(&grid, start, goal).unwrap();
    for cell in &path {
        assert_eq!(grid.kind(*cell), Some(CellKind::Free), "cell {:?}", cell);
        assert!(grid.get_cost(*cell) < 7.5, "cell {:?} in inflated buffer", cell);
    }

    let mut dstar = DStarPlanner::default();
    dstar.set_goal(&grid, goal).unwrap();
    let dpath = dstar.find_path(&grid, start).unwrap();
    assert_eq!(dpath.first(), Some(&start));
    assert_eq!(dpath.last(), Some(&goal));
    assert!((dstar.last_stats().path_cost - astar.last_stats().path_cost).abs() < 1e-3);
}

#[test]
fn test_changing_scene_selects_dstar_and_replans() {
    let monitor = detection("monitor", 0.9, (500.0, 300.0, 560.0, 360.0));
    let books = detection("books", 0.9, (20.0, 400.0, 80.0, 460.0));

    let mut planner = NavigationPlanner::new(NavigationConfig::default()).unwrap();
    let mut ctx = PlannerContext::new();
    let frames = [vec![monitor.clone()], vec![books], vec![monitor.clone()]];
    for (i, frame) in frames.iter().enumerate() {
        planner
            .update_environment_at(&mut ctx, frame, None, None, at(i as i64))
            .unwrap();
    }
    assert!((planner.scene_memory().stability() - 0.6).abs() < 1e-5);

    let start = Point2D::new(50.0, 50.0);
    let request = NavigationRequest::new("computer", start);
    let first = planner.plan_navigation(&mut ctx, &request);
    assert!(first.success, "{}", first.next_action);
    assert_eq!(first.algorithm_used, PathfindingAlgorithm::DStar);
    assert_eq!(first.path.last(), Some(&GridNode::new(53, 33)));
    assert!((first.confidence - 0.95 * 0.6).abs() < 1e-4);

    let table = detection("table", 0.9, (250.0, 150.0, 350.0, 250.0));
    planner
        .update_environment_at(&mut ctx, &[monitor, table], None, None, at(3))
        .unwrap();
    let repaired = planner.replan_if_needed(&mut ctx, start).unwrap().unwrap();

    assert!(repaired.success);
    assert_eq!(repaired.path.last(), Some(&GridNode::new(53, 33)));
    for cell in &repaired.path {
        assert!(planner.grid().is_valid(*cell), "cell {:?} blocked", cell);
    }
    assert!(repaired.path_cost >= first.path_cost - 1e-3);
    assert_eq!(ctx.active_path, repaired.path);
}

#[test]
fn test_exploration_strategy_uses_seeded_rrt_star() {
    let config = NavigationConfig::from_json_str(
        r#"{
            "grid": {"image_width": 120, "image_height": 120},
            "rrt_star": {
                "step_size": 10.0,
                "goal_tolerance": 5.0,
                "rewire_radius": 25.0,
                "max_iterations": 3000,
                "optimize_iterations": 300,
                "seed": 3
            }
        }"#,
    )
    .unwrap();
    let mut planner = NavigationPlanner::new(config).unwrap();
    let mut ctx = PlannerContext::new();

    let request = NavigationRequest::new("computer", Point2D::new(15.0, 15.0))
        .with_strategy(NavigationStrategy::Exploration);
    let result = planner.plan_navigation(&mut ctx, &request);

    assert!(result.success, "{}", result.next_action);
    assert_eq!(result.algorithm_used, PathfindingAlgorithm::RrtStar);
    assert_eq!(result.path.first(), Some(&GridNode::new(1, 1)));
    assert!(result.confidence <= 0.8 + 1e-6);
    assert_eq!(ctx.last_algorithm, Some(PathfindingAlgorithm::RrtStar));
}

#[test]
fn test_saved_map_resolves_goals_in_a_new_session() {
    let mut planner = NavigationPlanner::new(NavigationConfig::default()).unwrap();
    let mut ctx = PlannerContext::new();
    let whiteboard = detection("whiteboard", 0.92, (400.0, 60.0, 620.0, 140.0));
    planner
        .update_environment_at(&mut ctx, &[whiteboard], Some("f0"), None, at(0))
        .unwrap();

    let path = std::env::temp_dir().join(format!("semantic_nav_session_{}.json", std::process::id()));
    planner.map_builder().save_map(&path).unwrap();

    let mut fresh = NavigationPlanner::new(NavigationConfig::default()).unwrap();
    let fresh_ctx = PlannerContext::new();
    fresh.map_builder_mut().load_map(&path).unwrap();
    std::fs::remove_file(&path).ok();

    // whiteboard center (510, 100)
    assert_eq!(
        fresh.resolve_goal(&fresh_ctx, "presentation screen").unwrap(),
        GridNode::new(51, 10)
    );
    assert!(matches!(
        fresh.resolve_goal(&fresh_ctx, "cafeteria"),
        Err(NavigationError::GoalUnresolvable(_))
    ));
}

#[test]
fn test_malformed_detection_is_rejected_at_the_boundary() {
    let mut planner = NavigationPlanner::new(NavigationConfig::default()).unwrap();
    let mut ctx = PlannerContext::new();
    let blank = detection("", 0.9, (0.0, 0.0, 10.0, 10.0));
    let result = planner.update_environment_at(&mut ctx, &[blank], None, None, at(0));
    assert!(matches!(result, Err(NavigationError::InvalidDetection(_))));
    assert_eq!(planner.map_builder().recent_frame_count(), 0);
    assert!(planner.scene_memory().tracked_objects().is_empty());
}
