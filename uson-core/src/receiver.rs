//! Consumer-side state holder
//!
//! Keeps the last accepted snapshot. Keyframes always replace it and reset
//! the sequence baseline; deltas must carry a newer `frame_seq`.

use uson_protocol::DeviceStateSnapshot;

use crate::clock;
use crate::throttle::StateKind;

/// Why a snapshot was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    /// Delta not newer than the last accepted frame
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceiverStats {
    pub accepted: u32,
    pub keyframes: u32,
    pub stale: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StateReceiver {
    state: Option<DeviceStateSnapshot>,
    last_seq: Option<u32>,
    stats: ReceiverStats,
}

impl StateReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a received snapshot
    pub fn accept(
        &mut self,
        mut snapshot: DeviceStateSnapshot,
        kind: StateKind,
        now: u32,
    ) -> Result<&DeviceStateSnapshot, ReceiveError> {
        if kind == StateKind::Delta {
            if let Some(last) = self.last_seq {
                if !clock::is_newer(snapshot.frame_seq, last) {
                    self.stats.stale = self.stats.stale.wrapping_add(1);
                    debug!("Stale delta seq {} (last {})", snapshot.frame_seq, last);
                    return Err(ReceiveError::Stale);
                }
            }
        } else {
            self.stats.keyframes = self.stats.keyframes.wrapping_add(1);
        }

        snapshot.last_rx_time = now;
        self.last_seq = Some(snapshot.frame_seq);
        self.stats.accepted = self.stats.accepted.wrapping_add(1);
        Ok(&*self.state.insert(snapshot))
    }

    /// Last accepted snapshot
    pub fn state(&self) -> Option<&DeviceStateSnapshot> {
        self.state.as_ref()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Drop the sequence baseline so the restarted peer's next frame counts
    pub fn peer_restarted(&mut self) {
        self.last_seq = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(seq: u32, track: u16) -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            frame_seq: seq,
            track,
            ..Default::default()
        }
    }

    #[test]
    fn test_deltas_in_order() {
        let mut rx = StateReceiver::new();
        rx.accept(snap(1, 1), StateKind::Keyframe, 10).unwrap();
        let state = rx.accept(snap(2, 2), StateKind::Delta, 20).unwrap();
        assert_eq!(state.track, 2);
        assert_eq!(state.last_rx_time, 20);
    }

    #[test]
    fn test_stale_delta_rejected() {
        let mut rx = StateReceiver::new();
        rx.accept(snap(5, 1), StateKind::Keyframe, 10).unwrap();

        assert_eq!(
            rx.accept(snap(5, 9), StateKind::Delta, 20),
            Err(ReceiveError::Stale)
        );
        assert_eq!(
            rx.accept(snap(3, 9), StateKind::Delta, 20),
            Err(ReceiveError::Stale)
        );
        assert_eq!(rx.state().map(|s| s.track), Some(1));
        assert_eq!(rx.stats().stale, 2);
    }

    #[test]
    fn test_keyframe_resets_baseline() {
        let mut rx = StateReceiver::new();
        rx.accept(snap(100, 1), StateKind::Keyframe, 10).unwrap();
        rx.accept(snap(0, 2), StateKind::Keyframe, 20).unwrap();
        assert!(rx.accept(snap(1, 3), StateKind::Delta, 30).is_ok());
        assert_eq!(rx.stats().keyframes, 2);
    }

    #[test]
    fn test_sequence_wrap() {
        let mut rx = StateReceiver::new();
        rx.accept(snap(u32::MAX, 1), StateKind::Keyframe, 10).unwrap();
        assert!(rx.accept(snap(0, 2), StateKind::Delta, 20).is_ok());
    }

    #[test]
    fn test_peer_restart() {
        let mut rx = StateReceiver::new();
        rx.accept(snap(500, 1), StateKind::Keyframe, 10).unwrap();
        rx.peer_restarted();
        assert!(rx.accept(snap(0, 2), StateKind::Delta, 20).is_ok());
    }
}
