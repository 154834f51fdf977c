// Loading
mod loader;
pub use loader::Program;

// Running
mod runtime;
pub use runtime::{RunEnvironment, RunState};

mod error;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 3;
