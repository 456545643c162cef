//! Link liveness
//!
//! Turns raw byte activity into a debounced "link alive" signal and tracks
//! the peer-reboot grace window used by the UI.

pub mod monitor;

pub use monitor::*;
