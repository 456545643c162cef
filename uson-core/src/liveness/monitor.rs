//! Link liveness monitor
//!
//! Two-stage policy: a hard physical timeout since the last received byte,
//! then a debounce window during which a timed-out link is still reported
//! alive. A single dropped byte must not flip the UI to the link-down
//! screen and back.

use crate::clock;
use crate::config::MonitorConfig;

/// Edge reported by [`LinkMonitor::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkTransition {
    Up,
    Down,
}

/// What the UI should show for the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkPresentation {
    /// Link alive
    Up,
    /// Link silent, but the peer is known to be restarting
    Recovering,
    /// Link down
    #[default]
    Down,
}

/// Liveness state for one link
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    /// Monitoring enabled
    link_enabled: bool,
    /// Time of the last received byte, if any ever arrived
    last_byte_time: Option<u32>,
    /// Start of the current debounce window
    link_down_since: Option<u32>,
    /// First tick that reported not-alive
    link_lost_since: Option<u32>,
    /// End of the peer-reboot grace window
    peer_reboot_until: Option<u32>,
    /// Last uptime reported by the peer
    last_peer_uptime: Option<u32>,
    /// Last value returned by `tick`
    reported_alive: bool,
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkMonitor {
    /// Create an enabled monitor that has not seen any byte
    pub const fn new() -> Self {
        Self {
            link_enabled: true,
            last_byte_time: None,
            link_down_since: None,
            link_lost_since: None,
            peer_reboot_until: None,
            last_peer_uptime: None,
            reported_alive: false,
        }
    }

    /// Enable or disable monitoring; a disabled link is never alive
    pub fn set_enabled(&mut self, enabled: bool) {
        self.link_enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.link_enabled
    }

    /// Record byte activity at `now`
    pub fn note_activity(&mut self, now: u32) {
        self.last_byte_time = Some(now);
    }

    pub fn last_byte_time(&self) -> Option<u32> {
        self.last_byte_time
    }

    /// Time of the first not-alive tick, while the link is lost
    pub fn link_lost_since(&self) -> Option<u32> {
        self.link_lost_since
    }

    /// Debounced liveness check
    ///
    /// A clock reading earlier than the last byte counts as alive: both come
    /// from the same counter, so a wrap can only make the difference huge.
    pub fn is_link_alive(&mut self, now: u32, timeout_ms: u32, down_confirm_ms: u32) -> bool {
        let last = match (self.link_enabled, self.last_byte_time) {
            (true, Some(last)) => last,
            _ => return false,
        };

        let physically_alive = now < last || clock::elapsed(now, last) <= timeout_ms;
        if physically_alive {
            self.link_down_since = None;
            return true;
        }

        match self.link_down_since {
            None => {
                self.link_down_since = Some(now);
                true
            }
            Some(since) => clock::elapsed(now, since) < down_confirm_ms,
        }
    }

    /// Run the liveness check and report edges
    pub fn tick(&mut self, now: u32, config: &MonitorConfig) -> Option<LinkTransition> {
        let alive = self.is_link_alive(now, config.timeout_ms, config.down_confirm_ms);

        if alive {
            self.link_lost_since = None;
        } else if self.link_lost_since.is_none() {
            self.link_lost_since = Some(now);
        }

        if alive == self.reported_alive {
            return None;
        }
        self.reported_alive = alive;

        if alive {
            info!("Link up at {}", now);
            Some(LinkTransition::Up)
        } else {
            info!("Link down at {}", now);
            Some(LinkTransition::Down)
        }
    }

    /// Last liveness value reported by `tick`
    pub fn is_reported_alive(&self) -> bool {
        self.reported_alive
    }

    /// Feed the peer's reported uptime
    ///
    /// Arms the grace window and returns true when the uptime rewound by
    /// more than the configured slack.
    pub fn note_peer_uptime(&mut self, uptime_ms: u32, now: u32, config: &MonitorConfig) -> bool {
        let rewound = matches!(
            self.last_peer_uptime,
            Some(last) if uptime_ms.saturating_add(config.uptime_slack_ms) < last
        );
        self.last_peer_uptime = Some(uptime_ms);

        if rewound {
            self.peer_reboot_until = Some(clock::deadline(now, config.peer_reboot_grace_ms));
            info!("Peer restarted (uptime {} ms)", uptime_ms);
        }
        rewound
    }

    /// True while the peer-reboot grace window is open; clears it on expiry
    pub fn peer_reboot_active(&mut self, now: u32) -> bool {
        match self.peer_reboot_until {
            Some(until) if clock::is_before(now, until) => true,
            Some(_) => {
                self.peer_reboot_until = None;
                false
            }
            None => false,
        }
    }

    /// Presentation for the UI given the current liveness
    pub fn presentation(&mut self, now: u32, alive: bool) -> LinkPresentation {
        if alive {
            LinkPresentation::Up
        } else if self.peer_reboot_active(now) {
            LinkPresentation::Recovering
        } else {
            LinkPresentation::Down
        }
    }

    /// Forget all activity (link re-init)
    pub fn reset(&mut self) {
        let enabled = self.link_enabled;
        *self = Self::new();
        self.link_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u32 = 1000;
    const CONFIRM: u32 = 2000;

    #[test]
    fn test_debounce_sequence() {
        let mut monitor = LinkMonitor::new();

        // Nothing received yet
        assert!(!monitor.is_link_alive(1500, TIMEOUT, CONFIRM));

        monitor.note_activity(1500);
        // Past the hard timeout: debounce starts here
        assert!(monitor.is_link_alive(2600, TIMEOUT, CONFIRM));
        // Still within the debounce window
        assert!(monitor.is_link_alive(3600, TIMEOUT, CONFIRM));
        // Debounce window elapsed
        assert!(!monitor.is_link_alive(4600, TIMEOUT, CONFIRM));
    }

    #[test]
    fn test_activity_clears_debounce() {
        let mut monitor = LinkMonitor::new();
        monitor.note_activity(0);
        assert!(monitor.is_link_alive(1200, TIMEOUT, CONFIRM));

        monitor.note_activity(1300);
        assert!(monitor.is_link_alive(1400, TIMEOUT, CONFIRM));

        // New silence starts a fresh debounce window
        assert!(monitor.is_link_alive(2500, TIMEOUT, CONFIRM));
        assert!(monitor.is_link_alive(4400, TIMEOUT, CONFIRM));
        assert!(!monitor.is_link_alive(4500, TIMEOUT, CONFIRM));
    }

    #[test]
    fn test_byte_at_time_zero_counts() {
        let mut monitor = LinkMonitor::new();
        monitor.note_activity(0);
        assert!(monitor.is_link_alive(500, TIMEOUT, CONFIRM));
    }

    #[test]
    fn test_clock_behind_last_byte_is_alive() {
        let mut monitor = LinkMonitor::new();
        monitor.note_activity(u32::MAX - 10);
        assert!(monitor.is_link_alive(u32::MAX - 20, TIMEOUT, CONFIRM));
        // Across the wrap, still within timeout
        assert!(monitor.is_link_alive(100, TIMEOUT, CONFIRM));
    }

    #[test]
    fn test_disabled_link_is_down() {
        let mut monitor = LinkMonitor::new();
        monitor.note_activity(100);
        monitor.set_enabled(false);
        assert!(!monitor.is_link_alive(200, TIMEOUT, CONFIRM));
    }

    #[test]
    fn test_tick_transitions() {
        let config = MonitorConfig::default();
        let mut monitor = LinkMonitor::new();

        assert_eq!(monitor.tick(0, &config), None);
        monitor.note_activity(10);
        assert_eq!(monitor.tick(20, &config), Some(LinkTransition::Up));
        assert_eq!(monitor.tick(30, &config), None);
        assert_eq!(monitor.link_lost_since(), None);

        // Timeout, then debounce
        assert_eq!(monitor.tick(1100, &config), None);
        assert_eq!(monitor.tick(3100, &config), Some(LinkTransition::Down));
        assert_eq!(monitor.link_lost_since(), Some(3100));
        assert_eq!(monitor.tick(3200, &config), None);
        assert_eq!(monitor.link_lost_since(), Some(3100));

        monitor.note_activity(3300);
        assert_eq!(monitor.tick(3300, &config), Some(LinkTransition::Up));
        assert_eq!(monitor.link_lost_since(), None);
    }

    #[test]
    fn test_peer_reboot_grace() {
        let config = MonitorConfig::default();
        let mut monitor = LinkMonitor::new();

        assert!(!monitor.note_peer_uptime(60_000, 1000, &config));
        // Small jitter is tolerated
        assert!(!monitor.note_peer_uptime(59_800, 1100, &config));
        // Uptime rewound: peer restarted
        assert!(monitor.note_peer_uptime(200, 1200, &config));

        assert!(monitor.peer_reboot_active(1300));
        assert_eq!(
            monitor.presentation(1300, false),
            LinkPresentation::Recovering
        );
        assert_eq!(monitor.presentation(1300, true), LinkPresentation::Up);

        let expiry = 1200 + config.peer_reboot_grace_ms;
        assert!(!monitor.peer_reboot_active(expiry));
        assert_eq!(monitor.presentation(expiry, false), LinkPresentation::Down);
    }

    #[test]
    fn test_peer_reboot_grace_across_wrap() {
        let config = MonitorConfig::default();
        let mut monitor = LinkMonitor::new();
        let now = u32::MAX - 1000;

        monitor.note_peer_uptime(50_000, now, &config);
        assert!(monitor.note_peer_uptime(10, now, &config));
        assert!(monitor.peer_reboot_active(now.wrapping_add(5000)));
        assert!(!monitor.peer_reboot_active(now.wrapping_add(config.peer_reboot_grace_ms)));
    }
}
