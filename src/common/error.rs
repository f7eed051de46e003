//! Error types for semantic_nav

use std::fmt;

use crate::common::types::SearchStats;

/// Main error type for navigation planning
#[derive(Debug)]
pub enum NavigationError {
    /// Start or goal outside the grid, or goal on an obstacle cell
    InvalidPosition { x: i32, y: i32, reason: String },
    /// Wall-clock deadline passed before the search converged
    SearchTimeout(SearchStats),
    /// Search space exhausted without reaching the goal
    NoPathFound(SearchStats),
    /// Goal description matched no known location or object class
    GoalUnresolvable(String),
    /// Incremental search used before `set_goal`
    GoalNotSet,
    /// Malformed detection at the perception boundary
    InvalidDetection(String),
    /// Invalid parameter
    InvalidParameter(String),
    /// I/O error
    IoError(std::io::Error),
    /// JSON (de)serialization error
    SerializationError(serde_json::Error),
}

impl NavigationError {
    pub(crate) fn invalid_position(x: i32, y: i32, reason: &str) -> Self {
        NavigationError::InvalidPosition {
            x,
            y,
            reason: reason.to_string(),
        }
    }

    /// Partial statistics carried by search failures
    pub fn search_stats(&self) -> Option<&SearchStats> {
        match self {
            NavigationError::SearchTimeout(stats) | NavigationError::NoPathFound(stats) => {
                Some(stats)
            }
            _ => None,
        }
    }
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationError::InvalidPosition { x, y, reason } => {
                write!(f, "Invalid position ({}, {}): {}", x, y, reason)
            }
            NavigationError::SearchTimeout(stats) => write!(
                f,
                "Search timed out after {:.3}s ({} nodes explored)",
                stats.search_time_s, stats.nodes_explored
            ),
            NavigationError::NoPathFound(stats) => write!(
                f,
                "No path found ({} nodes explored)",
                stats.nodes_explored
            ),
            NavigationError::GoalUnresolvable(goal) => {
                write!(f, "Cannot locate '{}' in current environment", goal)
            }
            NavigationError::GoalNotSet => write!(f, "Goal not set"),
            NavigationError::InvalidDetection(msg) => write!(f, "Invalid detection: {}", msg),
            NavigationError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            NavigationError::IoError(e) => write!(f, "I/O error: {}", e),
            NavigationError::SerializationError(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for NavigationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NavigationError::IoError(e) => Some(e),
            NavigationError::SerializationError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NavigationError {
    fn from(e: std::io::Error) -> Self {
        NavigationError::IoError(e)
    }
}

impl From<serde_json::Error> for NavigationError {
    fn from(e: serde_json::Error) -> Self {
        NavigationError::SerializationError(e)
    }
}

/// Result type alias for navigation operations
pub type NavResult<T> = Result<T, NavigationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NavigationError::GoalUnresolvable("cafeteria".to_string());
        assert_eq!(
            format!("{}", err),
            "Cannot locate 'cafeteria' in current environment"
        );

        let err = NavigationError::invalid_position(-1, 3, "outside grid");
        assert_eq!(format!("{}", err), "Invalid position (-1, 3): outside grid");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NavigationError = io_err.into();
        assert!(matches!(err, NavigationError::IoError(_)));
    }

    #[test]
    fn test_search_failures_keep_stats() {
        let stats = SearchStats::failed(42, 5.0, true);
        let err = NavigationError::SearchTimeout(stats);
        assert_eq!(err.search_stats().map(|s| s.nodes_explored), Some(42));
        assert!(err.search_stats().map(|s| s.timed_out).unwrap_or(false));
        assert!(NavigationError::GoalNotSet.search_stats().is_none());
    }
}
