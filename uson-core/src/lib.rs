//! Board-agnostic link runtime for the U-SON prop
//!
//! This crate contains all link logic that does not depend on a specific
//! UART or radio implementation:
//!
//! - Byte stream trait implemented by board glue
//! - Link session (handshake, heartbeat, line buffering, input queue)
//! - Liveness monitor with debounce and peer-reboot grace
//! - State diff / throttle engine for the sending side
//! - State receiver with sequence ordering for the consuming side
//! - Interrupt-safe radio receive ring
//! - Scene selection and link events for the UI and story layers
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod clock;
pub mod config;
pub mod events;
pub mod liveness;
pub mod receiver;
pub mod ring;
pub mod scene;
pub mod session;
pub mod throttle;
pub mod traits;

pub use config::LinkConfig;
pub use events::LinkEvent;
pub use liveness::{LinkMonitor, LinkPresentation, LinkTransition};
pub use receiver::StateReceiver;
pub use session::{LinkSession, PollReport, Role, SessionError};
pub use throttle::ThrottleEngine;
pub use traits::ByteStream;
