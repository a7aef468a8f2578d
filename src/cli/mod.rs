//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, configuration layering,
//! logger setup and shell completion.

pub mod app;

// Re-export main types
pub use app::*;
