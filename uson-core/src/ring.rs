//! Interrupt-safe radio receive ring
//!
//! The radio receive callback runs in interrupt context and pushes whole
//! packets; the main loop pops them. The critical section covers only the
//! queue update. When full, the OLDEST packet is dropped.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};

/// Largest radio payload
pub const MAX_PACKET_LEN: usize = 250;

/// One received packet
pub type Packet = Vec<u8, MAX_PACKET_LEN>;

/// Ring counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingStats {
    pub pushed: u32,
    /// Packets evicted to make room
    pub dropped_oldest: u32,
    /// Packets longer than `MAX_PACKET_LEN`
    pub oversized: u32,
}

/// Result of [`IsrRing::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest packet
    Evicted,
    /// Rejected, packet too large
    Oversized,
}

struct RingInner<const N: usize> {
    packets: Deque<Packet, N>,
    stats: RingStats,
}

/// Packet ring shared between an interrupt producer and the main loop
pub struct IsrRing<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<RingInner<N>>>,
}

impl<const N: usize> Default for IsrRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IsrRing<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(RingInner {
                packets: Deque::new(),
                stats: RingStats {
                    pushed: 0,
                    dropped_oldest: 0,
                    oversized: 0,
                },
            })),
        }
    }

    /// Queue a packet; callable from interrupt context
    pub fn push(&self, data: &[u8]) -> PushOutcome {
        // Copy outside the critical section
        let packet = Packet::from_slice(data);

        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let Ok(packet) = packet else {
                inner.stats.oversized = inner.stats.oversized.wrapping_add(1);
                return PushOutcome::Oversized;
            };

            let mut outcome = PushOutcome::Queued;
            if inner.packets.is_full() {
                inner.packets.pop_front();
                inner.stats.dropped_oldest = inner.stats.dropped_oldest.wrapping_add(1);
                outcome = PushOutcome::Evicted;
            }
            // Room was made above
            let _ = inner.packets.push_back(packet);
            inner.stats.pushed = inner.stats.pushed.wrapping_add(1);
            outcome
        })
    }

    /// Take the oldest packet
    pub fn pop(&self) -> Option<Packet> {
        self.inner.lock(|cell| cell.borrow_mut().packets.pop_front())
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().packets.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RingStats {
        self.inner.lock(|cell| cell.borrow().stats)
    }
}
