//! Build execution engine
//!
//! This module turns directives into tasks, tasks into commands, and runs
//! the commands under their conditionals.

pub mod changes;
pub mod command;
pub mod conditional;
pub mod context;
pub mod materialize;
pub mod pipeline;
pub mod resolve;
pub mod session;
pub mod task;

// Re-export main types
pub use changes::*;
pub use command::*;
pub use conditional::*;
pub use context::*;
pub use materialize::*;
pub use pipeline::*;
pub use resolve::*;
pub use session::*;
pub use task::*;
