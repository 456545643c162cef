//! State diff / throttle engine
//!
//! Sender-side logic deciding when a snapshot goes out, and whether as a
//! delta (STAT) or a full resync (KEYFRAME).

pub mod engine;

pub use engine::*;
