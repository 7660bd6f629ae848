//! Shell session execution engine
//!
//! - `manager` - [`ShellSessionManager`] owning the persistent shell process
//! - `framing` - sentinel-marker framing over the session's streams

mod framing;
mod manager;

pub use framing::MarkerScanner;
pub use manager::ShellSessionManager;
