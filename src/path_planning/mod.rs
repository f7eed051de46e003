//! Path planning algorithms over the navigation grid

pub mod a_star;
pub mod d_star;
pub mod rrt_star;

pub use a_star::{AStarConfig, AStarPlanner};
pub use d_star::{DStarConfig, DStarPlanner};
pub use rrt_star::{RRTStarConfig, RRTStarPlanner};
