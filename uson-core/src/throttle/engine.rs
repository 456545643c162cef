//! Throttle engine
//!
//! Send rules:
//! - `changed`: nothing stored yet, or a tracked field differs from the
//!   last successfully sent snapshot
//! - `due`: nothing sent yet, or `update_period` elapsed since the last send
//! - send on `force || changed || due`, but a change-only send waits for
//!   `change_min_period` after the previous send
//! - forced or due sends are keyframes, change-only sends are deltas

use uson_protocol::DeviceStateSnapshot;

use crate::clock;
use crate::config::ThrottleConfig;

/// Kind of state line to transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateKind {
    /// STAT
    Delta,
    /// KEYFRAME
    Keyframe,
}

/// Result of a throttle decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThrottleDecision {
    /// Nothing changed and no keyframe is due
    Idle,
    /// Changed, but inside the change rate limit
    Suppressed,
    /// Transmit now
    Send(StateKind),
}

/// Throttle counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThrottleStats {
    /// Successful sends (deltas and keyframes)
    pub tx_count: u32,
    /// Successful keyframe sends
    pub keyframe_count: u32,
    /// Sends that failed (backpressure, not connected)
    pub drop_count: u32,
    /// Change-only sends held back by the rate limit
    pub suppressed_count: u32,
}

/// Sender-side throttle state
#[derive(Debug, Clone, Default)]
pub struct ThrottleEngine {
    /// Last successfully sent snapshot
    last_sent: Option<DeviceStateSnapshot>,
    /// Time of the last successful send, cleared by the watchdog
    last_tx_time: Option<u32>,
    /// Time of the last successful send
    last_success_time: Option<u32>,
    /// Sequence number stamped on the next send
    next_seq: u32,
    stats: ThrottleStats,
}

impl ThrottleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ThrottleStats {
        self.stats
    }

    /// Last snapshot the peer is known to have received
    pub fn last_sent(&self) -> Option<&DeviceStateSnapshot> {
        self.last_sent.as_ref()
    }

    pub fn last_success_time(&self) -> Option<u32> {
        self.last_success_time
    }

    pub fn has_state(&self) -> bool {
        self.last_sent.is_some()
    }

    /// Sequence number the next send will carry
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Decide what to do with `snapshot` at `now`
    ///
    /// Counts suppressed sends; otherwise has no side effects.
    pub fn decide(
        &mut self,
        snapshot: &DeviceStateSnapshot,
        now: u32,
        force: bool,
        config: &ThrottleConfig,
    ) -> ThrottleDecision {
        let changed = match &self.last_sent {
            Some(last) => !last.same_tracked_state(snapshot),
            None => true,
        };
        let since_tx = self.last_tx_time.map(|t| clock::elapsed(now, t));
        let due = since_tx.map_or(true, |e| e >= config.update_period_ms);

        if force || due {
            return ThrottleDecision::Send(StateKind::Keyframe);
        }
        if !changed {
            return ThrottleDecision::Idle;
        }
        if since_tx.map_or(false, |e| e < config.change_min_period_ms) {
            self.stats.suppressed_count = self.stats.suppressed_count.wrapping_add(1);
            trace!("State change suppressed");
            return ThrottleDecision::Suppressed;
        }
        ThrottleDecision::Send(StateKind::Delta)
    }

    /// Decide and, when a send is due, hand the stamped snapshot to `send`
    ///
    /// State is only committed when `send` succeeds. A failed send counts
    /// as a drop and leaves the engine as it was, so the next call retries.
    pub fn update<F, E>(
        &mut self,
        snapshot: &DeviceStateSnapshot,
        now: u32,
        force: bool,
        config: &ThrottleConfig,
        send: F,
    ) -> Result<ThrottleDecision, E>
    where
        F: FnOnce(StateKind, &DeviceStateSnapshot) -> Result<(), E>,
    {
        let decision = self.decide(snapshot, now, force, config);
        let kind = match decision {
            ThrottleDecision::Send(kind) => kind,
            other => return Ok(other),
        };

        let mut outgoing = *snapshot;
        outgoing.frame_seq = self.next_seq;

        if let Err(e) = send(kind, &outgoing) {
            self.stats.drop_count = self.stats.drop_count.wrapping_add(1);
            warn!("State send dropped ({})", kind);
            return Err(e);
        }

        self.last_sent = Some(outgoing);
        self.last_tx_time = Some(now);
        self.last_success_time = Some(now);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.stats.tx_count = self.stats.tx_count.wrapping_add(1);
        if kind == StateKind::Keyframe {
            self.stats.keyframe_count = self.stats.keyframe_count.wrapping_add(1);
        }
        Ok(decision)
    }

    /// Force a keyframe on the next update if nothing went out for too long
    ///
    /// Returns true when the watchdog fired.
    pub fn check_watchdog(&mut self, now: u32, config: &ThrottleConfig) -> bool {
        match self.last_success_time {
            Some(last) if clock::elapsed(now, last) > config.watchdog_ms => {
                if self.last_tx_time.take().is_some() {
                    warn!("No successful state send for {} ms", clock::elapsed(now, last));
                }
                true
            }
            _ => false,
        }
    }

    /// Forget the peer's state (session restart)
    pub fn reset(&mut self) {
        let next_seq = self.next_seq;
        *self = Self::default();
        self.next_seq = next_seq;
    }
}
