//! Command tool surface
//!
//! Classification, background sub-syntax parsing, and the facade that the
//! agent loop calls.

mod background_cmd;
mod command_tool;
mod danger;

pub use background_cmd::BackgroundCommand;
pub use command_tool::{CommandTool, DEFAULT_COMMAND_TIMEOUT};
pub use danger::DangerClassifier;
