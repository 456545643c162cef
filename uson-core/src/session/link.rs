//! Link session state machine
//!
//! The driver board owns the state and answers HELLO with ACK; the
//! follower (a screen board) says HELLO until acknowledged. While
//! connected the driver sends PING on the heartbeat interval and the
//! follower answers PONG. `connected` is the raw transport view: it drops
//! as soon as nothing arrives within the hard timeout. The debounced,
//! UI-facing view lives in [`LinkMonitor`](crate::liveness::LinkMonitor).

use uson_protocol::{
    CommandOp, DeviceStateSnapshot, FieldList, Frame, FrameError, Handshake, InputEvent,
    LinkMessage, PROTOCOL_VERSION,
};

use super::line::{LineBuffer, LineStatus};
use super::queue::{InputQueue, INPUT_QUEUE_LEN};
use super::stats::{bump, SessionStats};
use crate::clock;
use crate::config::LinkConfig;
use crate::throttle::{StateKind, ThrottleDecision, ThrottleEngine, ThrottleStats};
use crate::traits::ByteStream;

/// Which end of the link this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Owns the device state, answers HELLO, sends PING
    Driver,
    /// Renders state and sends input, says HELLO, answers PING
    Follower,
}

/// Errors from session operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError<E> {
    /// Underlying stream failed
    Stream(E),
    /// Message could not be encoded
    Frame(FrameError),
    /// Not enough write space for the whole line
    Backpressure,
    /// State sends need a connected peer
    NotConnected,
}

impl<E> From<FrameError> for SessionError<E> {
    fn from(e: FrameError) -> Self {
        SessionError::Frame(e)
    }
}

/// Summary of one [`LinkSession::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollReport {
    /// Bytes drained from the stream
    pub bytes: usize,
    /// Lines terminated by `\n`
    pub lines: usize,
    /// Messages decoded and dispatched
    pub messages: usize,
    /// New value of `connected`, if it changed
    pub connection: Option<bool>,
    /// Peer asked for a keyframe
    pub keyframe_requested: bool,
    /// Latest uptime the peer reported
    pub peer_uptime: Option<u32>,
}

/// Runtime state of one physical link
pub struct LinkSession<S: ByteStream, const Q: usize = INPUT_QUEUE_LEN> {
    stream: S,
    role: Role,
    config: LinkConfig,
    connected: bool,
    session_counter: u32,
    last_rx_time: Option<u32>,
    last_tx_time: Option<u32>,
    last_ping_time: Option<u32>,
    last_hello_time: Option<u32>,
    ack_pending: bool,
    pong_pending: bool,
    force_keyframe_pending: bool,
    peer_uptime: Option<u32>,
    peer_caps: Option<FieldList>,
    received_state: Option<(StateKind, DeviceStateSnapshot)>,
    line: LineBuffer,
    inputs: InputQueue<Q>,
    throttle: ThrottleEngine,
    stats: SessionStats,
}

impl<S: ByteStream, const Q: usize> LinkSession<S, Q> {
    /// Create a session over `stream`; call [`begin`](Self::begin) before polling
    pub fn new(stream: S, role: Role, config: LinkConfig) -> Self {
        Self {
            stream,
            role,
            config,
            connected: false,
            session_counter: 0,
            last_rx_time: None,
            last_tx_time: None,
            last_ping_time: None,
            last_hello_time: None,
            ack_pending: false,
            pong_pending: false,
            force_keyframe_pending: false,
            peer_uptime: None,
            peer_caps: None,
            received_state: None,
            line: LineBuffer::new(),
            inputs: InputQueue::new(),
            throttle: ThrottleEngine::new(),
            stats: SessionStats::default(),
        }
    }

    /// Open the stream and reset all session state
    pub fn begin(&mut self) -> Result<(), SessionError<S::Error>> {
        self.stream.begin().map_err(SessionError::Stream)?;

        self.connected = false;
        self.session_counter = 0;
        self.last_rx_time = None;
        self.last_tx_time = None;
        self.last_ping_time = None;
        self.last_hello_time = None;
        self.ack_pending = false;
        self.pong_pending = false;
        self.force_keyframe_pending = false;
        self.peer_uptime = None;
        self.peer_caps = None;
        self.received_state = None;
        self.line.clear();
        self.inputs.clear();
        self.throttle = ThrottleEngine::new();
        self.stats = SessionStats::default();

        debug!("Link session started as {}", self.role);
        Ok(())
    }

    /// Drain received bytes, dispatch complete lines, do outbound work
    pub fn poll(&mut self, now: u32) -> PollReport {
        let mut report = PollReport::default();
        let budget = self.config.session.max_bytes_per_poll as usize;

        while report.bytes < budget && self.stream.available() > 0 {
            let Some(byte) = self.stream.read_byte() else {
                break;
            };
            report.bytes += 1;
            bump(&mut self.stats.rx_bytes);

            match self.line.push(byte) {
                LineStatus::Pending => {}
                LineStatus::Overflow => {
                    bump(&mut self.stats.line_overflows);
                    warn!("Receive line overflow, dropping until newline");
                }
                LineStatus::Resynced => {
                    self.last_rx_time = Some(now);
                    report.lines += 1;
                }
                LineStatus::Complete => {
                    self.last_rx_time = Some(now);
                    report.lines += 1;
                    let raw = self.line.take();
                    self.handle_line(&raw, now, &mut report);
                }
            }
        }

        self.service(now, &mut report);
        report
    }

    fn handle_line(&mut self, raw: &[u8], now: u32, report: &mut PollReport) {
        let decoded = match Frame::decode(raw) {
            Ok(decoded) => decoded,
            // Stray CR/LF between lines
            Err(FrameError::EmptyLine) => return,
            Err(FrameError::InvalidChecksum) => {
                bump(&mut self.stats.rx_lines);
                bump(&mut self.stats.crc_errors);
                warn!("CRC mismatch on received line");
                return;
            }
            Err(e) => {
                bump(&mut self.stats.rx_lines);
                bump(&mut self.stats.parse_errors);
                warn!("Malformed line: {}", e);
                return;
            }
        };
        bump(&mut self.stats.rx_lines);
        trace!("RX {}", decoded.frame.msg_type);

        if self.config.session.require_crc && !decoded.crc_ok {
            bump(&mut self.stats.parse_errors);
            warn!("Line without CRC rejected");
            return;
        }

        let message = match LinkMessage::from_frame(&decoded.frame) {
            Ok(message) => message,
            Err(e) => {
                bump(&mut self.stats.parse_errors);
                warn!("Undecodable {} line: {}", decoded.frame.msg_type, e);
                return;
            }
        };

        report.messages += 1;
        self.dispatch(message, now, report);
    }

    fn dispatch(&mut self, message: LinkMessage, now: u32, report: &mut PollReport) {
        match message {
            LinkMessage::Hello(hello) => {
                if hello.proto != PROTOCOL_VERSION {
                    bump(&mut self.stats.proto_mismatches);
                    warn!("HELLO with protocol {}, expected {}", hello.proto, PROTOCOL_VERSION);
                    return;
                }
                self.note_peer_uptime(hello.uptime_ms, report);
                self.session_counter = self.session_counter.wrapping_add(1);
                self.ack_pending = true;
                self.force_keyframe_pending = true;
                self.set_connected(true, now, report);
                info!("Handshake: session {}", self.session_counter);
            }
            LinkMessage::Ack(ack) => {
                if ack.proto != PROTOCOL_VERSION {
                    bump(&mut self.stats.proto_mismatches);
                    warn!("ACK with protocol {}, expected {}", ack.proto, PROTOCOL_VERSION);
                    return;
                }
                self.note_peer_uptime(ack.uptime_ms, report);
                if self.role == Role::Follower {
                    self.session_counter = ack.session;
                }
                self.set_connected(true, now, report);
                info!("Handshake acknowledged: session {}", ack.session);
            }
            LinkMessage::Ping { uptime_ms } => {
                if let Some(uptime) = uptime_ms {
                    self.note_peer_uptime(uptime, report);
                }
                self.pong_pending = true;
            }
            LinkMessage::Pong { uptime_ms } => {
                if let Some(uptime) = uptime_ms {
                    self.note_peer_uptime(uptime, report);
                }
                self.set_connected(true, now, report);
            }
            LinkMessage::Input(event) => {
                debug!("Input event {}", event);
                if !self.inputs.push(event) {
                    bump(&mut self.stats.input_drops);
                    warn!("Input queue full, event dropped");
                }
            }
            LinkMessage::Command(CommandOp::RequestKeyframe) => {
                debug!("Peer requested keyframe");
                self.force_keyframe_pending = true;
                report.keyframe_requested = true;
            }
            LinkMessage::Command(CommandOp::Other(op)) => {
                debug!("Ignoring CMD op={}", op.as_str());
            }
            LinkMessage::Stat(state) => {
                self.note_peer_uptime(state.uptime_ms, report);
                self.store_state(StateKind::Delta, state);
            }
            LinkMessage::Keyframe(state) => {
                self.note_peer_uptime(state.uptime_ms, report);
                self.store_state(StateKind::Keyframe, state);
            }
            LinkMessage::Caps(caps) => {
                debug!("Peer capabilities: {} fields", caps.len());
                self.peer_caps = Some(caps);
            }
        }
    }

    /// Handshake, heartbeat and timeout work after the receive drain
    fn service(&mut self, now: u32, report: &mut PollReport) {
        if self.ack_pending {
            let ack = LinkMessage::Ack(self.handshake(now));
            if self.send_message(&ack, now).is_ok() {
                self.ack_pending = false;
            }
        }

        if self.pong_pending {
            self.pong_pending = false;
            let _ = self.send_message(&LinkMessage::Pong { uptime_ms: Some(now) }, now);
        }

        if self.connected {
            let silent = self
                .last_rx_time
                .map_or(true, |t| clock::elapsed(now, t) > self.config.session.hard_timeout_ms);
            if silent {
                warn!("No line for {} ms, disconnecting", self.config.session.hard_timeout_ms);
                self.set_connected(false, now, report);
            }
        }

        match self.role {
            Role::Driver if self.connected => {
                let due = self.last_ping_time.map_or(true, |t| {
                    clock::elapsed(now, t) >= self.config.session.heartbeat_interval_ms
                });
                if due {
                    self.last_ping_time = Some(now);
                    let _ = self.send_message(&LinkMessage::Ping { uptime_ms: Some(now) }, now);
                }
            }
            Role::Follower if !self.connected => {
                let due = self.last_hello_time.map_or(true, |t| {
                    clock::elapsed(now, t) >= self.config.session.hello_interval_ms
                });
                if due {
                    self.last_hello_time = Some(now);
                    let hello = LinkMessage::Hello(self.handshake(now));
                    let _ = self.send_message(&hello, now);
                }
            }
            _ => {}
        }
    }

    /// Send a state snapshot through the throttle
    ///
    /// Runs the watchdog first. A pending keyframe request forces a
    /// keyframe. Nothing is sent while disconnected. `uptime_ms` is
    /// overwritten with `now`, the same clock PING and HELLO carry.
    pub fn send_state(
        &mut self,
        snapshot: &DeviceStateSnapshot,
        now: u32,
    ) -> Result<ThrottleDecision, SessionError<S::Error>> {
        let config = self.config.throttle;
        self.throttle.check_watchdog(now, &config);

        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        let force = self.force_keyframe_pending;
        let Self {
            stream,
            stats,
            throttle,
            ..
        } = self;

        let decision = throttle.update(snapshot, now, force, &config, |kind, outgoing| {
            let mut outgoing = *outgoing;
            outgoing.uptime_ms = now;
            let message = match kind {
                StateKind::Delta => LinkMessage::Stat(outgoing),
                StateKind::Keyframe => LinkMessage::Keyframe(outgoing),
            };
            transmit(stream, stats, &message)
        })?;

        if let ThrottleDecision::Send(kind) = decision {
            self.last_tx_time = Some(now);
            if kind == StateKind::Keyframe {
                self.force_keyframe_pending = false;
            }
        }
        Ok(decision)
    }

    /// Send a button or touch event
    pub fn send_input(&mut self, event: InputEvent, now: u32) -> Result<(), SessionError<S::Error>> {
        self.send_message(&LinkMessage::Input(event), now)
    }

    /// Ask the peer for an immediate keyframe
    pub fn request_keyframe(&mut self, now: u32) -> Result<(), SessionError<S::Error>> {
        self.send_message(&LinkMessage::Command(CommandOp::RequestKeyframe), now)
    }

    /// Advertise capabilities to the peer
    pub fn send_caps(&mut self, caps: &FieldList, now: u32) -> Result<(), SessionError<S::Error>> {
        self.send_message(&LinkMessage::Caps(caps.clone()), now)
    }

    fn send_message(
        &mut self,
        message: &LinkMessage,
        now: u32,
    ) -> Result<(), SessionError<S::Error>> {
        transmit(&mut self.stream, &mut self.stats, message)?;
        self.last_tx_time = Some(now);
        Ok(())
    }

    fn handshake(&self, now: u32) -> Handshake {
        Handshake {
            proto: PROTOCOL_VERSION,
            session: self.session_counter,
            uptime_ms: now,
        }
    }

    /// Keep the newest state; a keyframe not yet taken stays a keyframe
    fn store_state(&mut self, kind: StateKind, state: DeviceStateSnapshot) {
        let kind = match self.received_state {
            Some((StateKind::Keyframe, _)) => StateKind::Keyframe,
            _ => kind,
        };
        self.received_state = Some((kind, state));
    }

    fn note_peer_uptime(&mut self, uptime: u32, report: &mut PollReport) {
        self.peer_uptime = Some(uptime);
        report.peer_uptime = Some(uptime);
    }

    fn set_connected(&mut self, connected: bool, now: u32, report: &mut PollReport) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        report.connection = Some(connected);
        if connected {
            info!("Link connected at {}", now);
        } else {
            info!("Link disconnected at {}", now);
            self.last_ping_time = None;
            self.last_hello_time = None;
        }
    }

    /// Next queued input event
    pub fn pop_input(&mut self) -> Option<InputEvent> {
        self.inputs.pop()
    }

    /// Most recent received state, if any arrived since the last call
    ///
    /// Reported as a keyframe if any keyframe arrived since the last call.
    pub fn take_state(&mut self) -> Option<(StateKind, DeviceStateSnapshot)> {
        self.received_state.take()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_counter(&self) -> u32 {
        self.session_counter
    }

    pub fn is_keyframe_pending(&self) -> bool {
        self.force_keyframe_pending
    }

    pub fn last_rx_time(&self) -> Option<u32> {
        self.last_rx_time
    }

    pub fn last_tx_time(&self) -> Option<u32> {
        self.last_tx_time
    }

    pub fn peer_uptime(&self) -> Option<u32> {
        self.peer_uptime
    }

    pub fn peer_caps(&self) -> Option<&FieldList> {
        self.peer_caps.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn throttle_stats(&self) -> ThrottleStats {
        self.throttle.stats()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

/// Encode and write one line, all or nothing
fn transmit<S: ByteStream>(
    stream: &mut S,
    stats: &mut SessionStats,
    message: &LinkMessage,
) -> Result<(), SessionError<S::Error>> {
    let line = message.to_frame()?.encode_to_vec()?;

    if stream.available_for_write() < line.len() {
        bump(&mut stats.tx_drops);
        warn!("TX backpressure, {} dropped", message.msg_type());
        return Err(SessionError::Backpressure);
    }

    match stream.write(&line) {
        Ok(written) if written == line.len() => {
            bump(&mut stats.tx_lines);
            trace!("TX {}", message.msg_type());
            Ok(())
        }
        Ok(_) => {
            bump(&mut stats.tx_drops);
            warn!("Short write, {} dropped", message.msg_type());
            Err(SessionError::Backpressure)
        }
        Err(e) => {
            bump(&mut stats.tx_drops);
            Err(SessionError::Stream(e))
        }
    }
}
