//! Directive extraction
//!
//! This module finds directives embedded in source file comments and turns
//! them into [`Directive`] values.

pub mod extract;
pub mod scan;
pub mod types;

// Re-export main types
pub use extract::*;
pub use types::*;
