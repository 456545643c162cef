//! U-SON board link protocol
//!
//! This crate defines the UART line protocol between the U-SON main board
//! (state driver) and its screen boards (followers). Every message is one
//! ASCII line:
//!
//! ```text
//! TYPE,key=value,key=value*CC\n
//! ```
//!
//! `CC` is a CRC-8 (poly 0x07, init 0x00) over everything before `*`, in
//! two uppercase hex digits. Lines are at most 320 bytes including the
//! trailer and newline.
//!
//! Older screen firmware speaks the comma-separated STAT / TXT format,
//! which lives in [`legacy`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod crc8;
pub mod events;
pub mod fields;
pub mod frame;
pub mod legacy;
pub mod messages;
pub mod snapshot;

pub use crc8::crc8;
pub use events::{ButtonAction, ButtonEvent, InputEvent, TouchAction, TouchEvent};
pub use fields::{Field, FieldError, FieldList};
pub use frame::{DecodedLine, Frame, FrameError, Line, MessageType, MAX_LINE_LEN};
pub use legacy::{LegacyError, LegacyFrame, StatReceiver, TextFrame, TextSlot};
pub use messages::{CommandOp, Handshake, LinkMessage, PROTOCOL_VERSION};
pub use snapshot::{AppStage, DeviceStateSnapshot, RepeatMode, StartupStage};
