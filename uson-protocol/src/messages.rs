//! Typed messages for the v2 board link
//!
//! Message types are divided into three groups:
//! - Session: HELLO / ACK handshake, PING / PONG heartbeat, CAPS
//! - State (main board → screens): STAT deltas and KEYFRAME resyncs
//! - Input (screens → main board): BTN / TOUCH events and CMD requests

use heapless::String;

use crate::events::{ButtonAction, ButtonEvent, InputEvent, TouchAction, TouchEvent};
use crate::fields::{FieldList, MAX_VALUE_LEN};
use crate::frame::{Frame, FrameError, MessageType};
use crate::snapshot::DeviceStateSnapshot;

/// Protocol version carried in HELLO / ACK
pub const PROTOCOL_VERSION: u32 = 2;

// Field keys outside the snapshot payload
pub const KEY_PROTO: &str = "proto";
pub const KEY_SESSION: &str = "session";
pub const KEY_UPTIME: &str = "ms";
pub const KEY_ID: &str = "id";
pub const KEY_ACTION: &str = "action";
pub const KEY_TS: &str = "ts";
pub const KEY_X: &str = "x";
pub const KEY_Y: &str = "y";
pub const KEY_OP: &str = "op";

/// CMD operation requesting an immediate keyframe
pub const OP_REQUEST_KEYFRAME: &str = "request_keyframe";

/// Operation carried by a CMD line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandOp {
    /// Ask the state driver for a full resync
    RequestKeyframe,
    /// Any other operation, passed to the application
    Other(String<MAX_VALUE_LEN>),
}

/// Handshake payload shared by HELLO and ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handshake {
    pub proto: u32,
    pub session: u32,
    pub uptime_ms: u32,
}

/// A decoded or to-be-encoded link message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkMessage {
    Hello(Handshake),
    Ack(Handshake),
    /// Capability list, passed through untouched
    Caps(FieldList),
    /// Change-triggered state update
    Stat(DeviceStateSnapshot),
    /// Full-state resync
    Keyframe(DeviceStateSnapshot),
    Input(InputEvent),
    Command(CommandOp),
    Ping { uptime_ms: Option<u32> },
    Pong { uptime_ms: Option<u32> },
}

impl LinkMessage {
    /// Message type of this message
    pub fn msg_type(&self) -> MessageType {
        match self {
            LinkMessage::Hello(_) => MessageType::Hello,
            LinkMessage::Ack(_) => MessageType::Ack,
            LinkMessage::Caps(_) => MessageType::Caps,
            LinkMessage::Stat(_) => MessageType::Stat,
            LinkMessage::Keyframe(_) => MessageType::Keyframe,
            LinkMessage::Input(InputEvent::Button(_)) => MessageType::Btn,
            LinkMessage::Input(InputEvent::Touch(_)) => MessageType::Touch,
            LinkMessage::Command(_) => MessageType::Cmd,
            LinkMessage::Ping { .. } => MessageType::Ping,
            LinkMessage::Pong { .. } => MessageType::Pong,
        }
    }

    /// Encode this message into a frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let mut fields = FieldList::new();
        match self {
            LinkMessage::Hello(h) | LinkMessage::Ack(h) => {
                fields.push_u32(KEY_PROTO, h.proto)?;
                fields.push_u32(KEY_SESSION, h.session)?;
                fields.push_u32(KEY_UPTIME, h.uptime_ms)?;
            }
            LinkMessage::Caps(caps) => fields = caps.clone(),
            LinkMessage::Stat(s) | LinkMessage::Keyframe(s) => fields = s.to_fields()?,
            LinkMessage::Input(InputEvent::Button(b)) => {
                fields.push_u32(KEY_ID, b.id as u32)?;
                fields.push(KEY_ACTION, b.action.token())?;
                fields.push_u32(KEY_TS, b.ts)?;
            }
            LinkMessage::Input(InputEvent::Touch(t)) => {
                fields.push_u32(KEY_X, t.x as u32)?;
                fields.push_u32(KEY_Y, t.y as u32)?;
                fields.push(KEY_ACTION, t.action.token())?;
                fields.push_u32(KEY_TS, t.ts)?;
            }
            LinkMessage::Command(op) => {
                let op = match op {
                    CommandOp::RequestKeyframe => OP_REQUEST_KEYFRAME,
                    CommandOp::Other(text) => text.as_str(),
                };
                fields.push(KEY_OP, op)?;
            }
            LinkMessage::Ping { uptime_ms } | LinkMessage::Pong { uptime_ms } => {
                if let Some(ms) = uptime_ms {
                    fields.push_u32(KEY_UPTIME, *ms)?;
                }
            }
        }
        Ok(Frame::with_fields(self.msg_type(), fields))
    }

    /// Parse a message from a decoded frame
    ///
    /// `Unknown` frames are rejected with `UnexpectedType`; the caller
    /// decides whether that is a protocol violation.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let f = &frame.fields;
        match frame.msg_type {
            MessageType::Hello => Ok(LinkMessage::Hello(handshake(f)?)),
            MessageType::Ack => Ok(LinkMessage::Ack(handshake(f)?)),
            MessageType::Caps => Ok(LinkMessage::Caps(f.clone())),
            MessageType::Stat => Ok(LinkMessage::Stat(DeviceStateSnapshot::from_fields(f)?)),
            MessageType::Keyframe => Ok(LinkMessage::Keyframe(
                DeviceStateSnapshot::from_fields(f)?,
            )),
            MessageType::Btn => {
                let id = required_u32(f, KEY_ID)?;
                let id = u8::try_from(id).map_err(|_| FrameError::InvalidValue)?;
                let action = f
                    .get(KEY_ACTION)
                    .ok_or(FrameError::MissingField)
                    .and_then(|a| ButtonAction::from_token(a).ok_or(FrameError::InvalidValue))?;
                let ts = optional_u32(f, KEY_TS)?.unwrap_or(0);
                Ok(LinkMessage::Input(InputEvent::Button(ButtonEvent {
                    id,
                    action,
                    ts,
                })))
            }
            MessageType::Touch => {
                let x = u16::try_from(required_u32(f, KEY_X)?)
                    .map_err(|_| FrameError::InvalidValue)?;
                let y = u16::try_from(required_u32(f, KEY_Y)?)
                    .map_err(|_| FrameError::InvalidValue)?;
                let action = f
                    .get(KEY_ACTION)
                    .ok_or(FrameError::MissingField)
                    .and_then(|a| TouchAction::from_token(a).ok_or(FrameError::InvalidValue))?;
                let ts = optional_u32(f, KEY_TS)?.unwrap_or(0);
                Ok(LinkMessage::Input(InputEvent::Touch(TouchEvent {
                    x,
                    y,
                    action,
                    ts,
                })))
            }
            MessageType::Cmd => {
                let op = f.get(KEY_OP).ok_or(FrameError::MissingField)?;
                if op == OP_REQUEST_KEYFRAME {
                    Ok(LinkMessage::Command(CommandOp::RequestKeyframe))
                } else {
                    let mut text = String::new();
                    text.push_str(op).map_err(|_| FrameError::InvalidValue)?;
                    Ok(LinkMessage::Command(CommandOp::Other(text)))
                }
            }
            MessageType::Ping => Ok(LinkMessage::Ping {
                uptime_ms: optional_u32(f, KEY_UPTIME)?,
            }),
            MessageType::Pong => Ok(LinkMessage::Pong {
                uptime_ms: optional_u32(f, KEY_UPTIME)?,
            }),
            MessageType::Unknown => Err(FrameError::UnexpectedType),
        }
    }
}

fn optional_u32(fields: &FieldList, key: &str) -> Result<Option<u32>, FrameError> {
    Ok(fields.get_u32(key).transpose()?)
}

fn required_u32(fields: &FieldList, key: &str) -> Result<u32, FrameError> {
    optional_u32(fields, key)?.ok_or(FrameError::MissingField)
}

fn handshake(fields: &FieldList) -> Result<Handshake, FrameError> {
    Ok(Handshake {
        proto: required_u32(fields, KEY_PROTO)?,
        session: optional_u32(fields, KEY_SESSION)?.unwrap_or(0),
        uptime_ms: optional_u32(fields, KEY_UPTIME)?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn through_line(msg: &LinkMessage) -> LinkMessage {
        let line = msg.to_frame().unwrap().encode_to_vec().unwrap();
        let decoded = Frame::decode(&line).unwrap();
        assert!(decoded.crc_ok);
        LinkMessage::from_frame(&decoded.frame).unwrap()
    }

    #[test]
    fn test_hello_fields() {
        let msg = LinkMessage::Hello(Handshake {
            proto: PROTOCOL_VERSION,
            session: 4,
            uptime_ms: 1500,
        });
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.msg_type, MessageType::Hello);
        assert_eq!(frame.fields.get("proto"), Some("2"));
        assert_eq!(frame.fields.get("session"), Some("4"));
        assert_eq!(frame.fields.get("ms"), Some("1500"));
        assert_eq!(through_line(&msg), msg);
    }

    #[test]
    fn test_hello_requires_proto() {
        let frame = Frame::decode(b"HELLO,session=1").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Err(FrameError::MissingField)
        );
    }

    #[test]
    fn test_button_line() {
        let msg = LinkMessage::Input(InputEvent::Button(ButtonEvent {
            id: 1,
            action: ButtonAction::LongPress,
            ts: 9000,
        }));
        let line = msg.to_frame().unwrap().encode_to_vec().unwrap();
        assert!(line.starts_with(b"BTN,id=1,action=long,ts=9000*"));
        assert_eq!(through_line(&msg), msg);
    }

    #[test]
    fn test_touch_roundtrip() {
        let msg = LinkMessage::Input(InputEvent::Touch(TouchEvent {
            x: 120,
            y: 64,
            action: TouchAction::Down,
            ts: 77,
        }));
        assert_eq!(through_line(&msg), msg);
    }

    #[test]
    fn test_input_validation() {
        let frame = Frame::decode(b"BTN,id=300,action=down").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Err(FrameError::InvalidValue)
        );
        let frame = Frame::decode(b"BTN,id=1,action=wiggle").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Err(FrameError::InvalidValue)
        );
        let frame = Frame::decode(b"TOUCH,x=1,action=up").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Err(FrameError::MissingField)
        );
    }

    #[test]
    fn test_command_ops() {
        let frame = Frame::decode(b"CMD,op=request_keyframe").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Ok(LinkMessage::Command(CommandOp::RequestKeyframe))
        );

        let frame = Frame::decode(b"CMD,op=next_track").unwrap().frame;
        match LinkMessage::from_frame(&frame).unwrap() {
            LinkMessage::Command(CommandOp::Other(op)) => assert_eq!(op.as_str(), "next_track"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ping_optional_uptime() {
        let frame = Frame::decode(b"PING").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Ok(LinkMessage::Ping { uptime_ms: None })
        );
        let msg = LinkMessage::Pong {
            uptime_ms: Some(42),
        };
        assert_eq!(through_line(&msg), msg);
    }

    #[test]
    fn test_keyframe_roundtrip() {
        let snap = DeviceStateSnapshot {
            mp3_playing: true,
            track: 3,
            frame_seq: 11,
            ..Default::default()
        };
        let msg = LinkMessage::Keyframe(snap);
        assert_eq!(through_line(&msg), msg);
    }

    #[test]
    fn test_unknown_frame() {
        let frame = Frame::decode(b"WHAT,a=1").unwrap().frame;
        assert_eq!(
            LinkMessage::from_frame(&frame),
            Err(FrameError::UnexpectedType)
        );
    }
}
