//! Link timing configuration
//!
//! All durations are milliseconds on the shared wrapping clock. The values
//! are plain numbers chosen by the integrator; nothing here is negotiated
//! with the peer.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current config layout version
pub const CONFIG_VERSION: u8 = 1;

/// Largest serialized `LinkConfig`
pub const MAX_CONFIG_SIZE: usize = 64;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A period or timeout is zero
    ZeroPeriod,
    /// `change_min_period_ms` exceeds `update_period_ms`
    ChangeMinExceedsUpdate,
    /// Heartbeat would never fire before the hard timeout
    HeartbeatNotBelowTimeout,
    /// Serialization buffer too small
    Serialize,
    /// Stored bytes are not a valid config
    Deserialize,
    /// Stored config layout version differs
    VersionMismatch,
}

/// Liveness monitor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitorConfig {
    /// Hard physical timeout since the last received byte
    pub timeout_ms: u32,
    /// Debounce window before a timed-out link is reported down
    pub down_confirm_ms: u32,
    /// How long silence reads as "peer restarting" after an uptime rewind
    pub peer_reboot_grace_ms: u32,
    /// Uptime jitter tolerated before a rewind counts as a reboot
    pub uptime_slack_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            down_confirm_ms: 2000,
            peer_reboot_grace_ms: 8000,
            uptime_slack_ms: 500,
        }
    }
}

/// State throttle timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThrottleConfig {
    /// Periodic keyframe interval
    pub update_period_ms: u32,
    /// Minimum spacing between change-triggered sends
    pub change_min_period_ms: u32,
    /// Forces a keyframe after this long without a successful send
    pub watchdog_ms: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            update_period_ms: 1000,
            change_min_period_ms: 200,
            watchdog_ms: 5000,
        }
    }
}

/// Link session timing and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionConfig {
    /// PING interval while connected (driver role)
    pub heartbeat_interval_ms: u32,
    /// Silence after which `connected` is cleared
    pub hard_timeout_ms: u32,
    /// HELLO retry interval while disconnected (follower role)
    pub hello_interval_ms: u32,
    /// Bytes drained from the stream per poll
    pub max_bytes_per_poll: u16,
    /// Reject lines without a `*CC` suffix
    pub require_crc: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            hard_timeout_ms: 3000,
            hello_interval_ms: 500,
            max_bytes_per_poll: 256,
            require_crc: false,
        }
    }
}

/// Complete link configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Layout version, checked on load
    pub version: u8,
    pub monitor: MonitorConfig,
    pub throttle: ThrottleConfig,
    pub session: SessionConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            monitor: MonitorConfig::default(),
            throttle: ThrottleConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Check the timing relationships the runtime relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            self.monitor.timeout_ms,
            self.monitor.down_confirm_ms,
            self.throttle.update_period_ms,
            self.throttle.change_min_period_ms,
            self.throttle.watchdog_ms,
            self.session.heartbeat_interval_ms,
            self.session.hard_timeout_ms,
            self.session.hello_interval_ms,
            self.session.max_bytes_per_poll as u32,
        ];
        if periods.contains(&0) {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.throttle.change_min_period_ms > self.throttle.update_period_ms {
            return Err(ConfigError::ChangeMinExceedsUpdate);
        }
        if self.session.heartbeat_interval_ms >= self.session.hard_timeout_ms {
            return Err(ConfigError::HeartbeatNotBelowTimeout);
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl LinkConfig {
    /// Serialize into `buf`, returning the used prefix
    pub fn store<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize and validate a stored config
    pub fn load(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: LinkConfig =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;

        if config.version != CONFIG_VERSION {
            warn!(
                "Link config version mismatch: found {}, expected {}",
                config.version,
                CONFIG_VERSION
            );
            return Err(ConfigError::VersionMismatch);
        }

        config.validate()?;
        Ok(config)
    }
}
