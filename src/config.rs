//! Aggregated configuration for the whole navigation stack
//!
//! Every section falls back to its defaults when missing, so a JSON file
//! only needs the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{NavResult, NavigationError};
use crate::mapping::GridMapConfig;
use crate::navigation::PlannerConfig;
use crate::path_planning::{AStarConfig, DStarConfig, RRTStarConfig};
use crate::semantic_mapping::{SceneMemoryConfig, SemanticMapConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub grid: GridMapConfig,
    pub astar: AStarConfig,
    pub dstar: DStarConfig,
    pub rrt_star: RRTStarConfig,
    pub semantic_map: SemanticMapConfig,
    pub scene_memory: SceneMemoryConfig,
    pub planner: PlannerConfig,
}

impl NavigationConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> NavResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> NavResult<Self> {
        let config: NavigationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> NavResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> NavResult<()> {
        if !(self.grid.resolution > 0.0) {
            return Err(NavigationError::InvalidParameter(format!(
                "grid.resolution must be positive, got {}",
                self.grid.resolution
            )));
        }
        if self.grid.image_width == 0 || self.grid.image_height == 0 {
            return Err(NavigationError::InvalidParameter(
                "grid image size must be non-zero".to_string(),
            ));
        }
        for (name, timeout) in [
            ("astar.timeout_s", self.astar.timeout_s),
            ("dstar.timeout_s", self.dstar.timeout_s),
            ("rrt_star.timeout_s", self.rrt_star.timeout_s),
        ] {
            if !(timeout > 0.0) {
                return Err(NavigationError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, timeout
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.rrt_star.goal_bias) {
            return Err(NavigationError::InvalidParameter(format!(
                "rrt_star.goal_bias must lie in [0, 1], got {}",
                self.rrt_star.goal_bias
            )));
        }
        Ok(())
    }
}
