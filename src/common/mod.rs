//! Common types, traits, and error definitions for semantic_nav
//!
//! This module provides the foundational building blocks shared by the
//! grid, the planners and the semantic models.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
