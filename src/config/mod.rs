//! Configuration parsing and validation
//!
//! This module handles rule files, the quill settings file and the
//! effective runtime configuration built from them.

pub mod parse;
pub mod runtime;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use runtime::*;
pub use schema::*;
pub use types::*;
