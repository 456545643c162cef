//! Link session
//!
//! One session per physical link: handshake, heartbeat, receive line
//! buffering, the input event queue and the state send gate.

pub mod line;
pub mod link;
pub mod queue;
pub mod stats;

pub use line::{LineBuffer, LineStatus};
pub use link::*;
pub use queue::InputQueue;
pub use stats::SessionStats;
