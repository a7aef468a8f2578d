//! Quill - directive-driven build automation for documents
//!
//! Quill scans a source file for build directives written in its comments,
//! resolves each one against a library of YAML rules and runs the resulting
//! commands in order, honouring `if`, `unless`, `while` and `until`
//! conditionals along the way.

// Public modules
pub mod cli;
pub mod config;
pub mod directive;
pub mod error;
pub mod runner;
pub mod template;

// Re-export commonly used types
pub use error::{QuillError, Result};
pub use runner::{Pipeline, Report};

/// Current version of Quill
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
