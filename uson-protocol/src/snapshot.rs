//! Device state snapshot synchronized from the main board to the screens
//!
//! The snapshot is the application payload of STAT and KEYFRAME lines (and
//! of the legacy comma-separated STAT frame). Every bounded field is clamped
//! on decode; pass-through counters are range-checked against their storage
//! type only.

use crate::fields::{FieldError, FieldList};
use crate::frame::FrameError;

/// Lowest accepted tuning offset
pub const TUNING_OFFSET_MIN: i8 = -8;
/// Highest accepted tuning offset
pub const TUNING_OFFSET_MAX: i8 = 8;
/// Upper bound of every percentage field
pub const PERCENT_MAX: u8 = 100;

/// Wire keys of the snapshot fields on v2 STAT/KEYFRAME lines
pub mod keys {
    pub const SEQ: &str = "seq";
    pub const UPTIME: &str = "ms";
    pub const MODE: &str = "mode";
    pub const LA: &str = "la";
    pub const MP3: &str = "mp3";
    pub const SD: &str = "sd";
    pub const KEY: &str = "key";
    pub const TRACK: &str = "track";
    pub const TRACK_TOTAL: &str = "track_total";
    pub const VOLUME: &str = "vol";
    pub const LOCK: &str = "u_lock";
    pub const FUNCTIONAL: &str = "u_son";
    pub const TUNE_OFFSET: &str = "tune_off";
    pub const TUNE_CONFIDENCE: &str = "tune_conf";
    pub const LOCK_LISTEN: &str = "u_lock_listen";
    pub const MIC: &str = "mic";
    pub const HOLD: &str = "hold";
    pub const STARTUP: &str = "startup";
    pub const APP: &str = "app";
    pub const UI_PAGE: &str = "ui_page";
    pub const REPEAT: &str = "repeat";
    pub const FX: &str = "fx";
    pub const BACKEND: &str = "backend";
    pub const SCAN: &str = "scan";
    pub const ERROR: &str = "err";
    pub const UI_CURSOR: &str = "ui_cursor";
    pub const UI_OFFSET: &str = "ui_offset";
    pub const UI_COUNT: &str = "ui_count";
    pub const QUEUE: &str = "queue";
}

/// Application stage shown by the screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppStage {
    /// Waiting for the player to start the puzzle
    #[default]
    Waiting,
    /// Lock is listening for the tuning signal
    Listening,
    /// U-SON unlocked and functional
    Functional,
    /// MP3 player mode
    Mp3,
}

impl AppStage {
    /// Decode a wire value; out-of-range values collapse to `Waiting`
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => AppStage::Listening,
            2 => AppStage::Functional,
            3 => AppStage::Mp3,
            _ => AppStage::Waiting,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            AppStage::Waiting => 0,
            AppStage::Listening => 1,
            AppStage::Functional => 2,
            AppStage::Mp3 => 3,
        }
    }

    /// Stage implied by the mode flags when an older peer omits it
    ///
    /// Precedence: MP3 mode, then functional, then lock listening.
    pub fn derive(mp3_mode: bool, functional: bool, lock_mode: bool, lock_listening: bool) -> Self {
        if mp3_mode {
            AppStage::Mp3
        } else if functional {
            AppStage::Functional
        } else if lock_mode && lock_listening {
            AppStage::Listening
        } else {
            AppStage::Waiting
        }
    }
}

/// Boot progress of the main board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupStage {
    #[default]
    Inactive,
    Booting,
    Ready,
}

impl StartupStage {
    /// Decode a wire value; out-of-range values collapse to `Inactive`
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => StartupStage::Booting,
            2 => StartupStage::Ready,
            _ => StartupStage::Inactive,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            StartupStage::Inactive => 0,
            StartupStage::Booting => 1,
            StartupStage::Ready => 2,
        }
    }
}

/// Playlist repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// Decode a wire value; out-of-range values collapse to `Off`
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => RepeatMode::One,
            2 => RepeatMode::All,
            _ => RepeatMode::Off,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            RepeatMode::Off => 0,
            RepeatMode::One => 1,
            RepeatMode::All => 2,
        }
    }
}

/// Clamp a raw percentage into [0, 100]
pub fn clamp_percent(raw: i64) -> u8 {
    raw.clamp(0, PERCENT_MAX as i64) as u8
}

/// Clamp a raw tuning offset into [-8, 8]
pub fn clamp_tuning_offset(raw: i64) -> i8 {
    raw.clamp(TUNING_OFFSET_MIN as i64, TUNING_OFFSET_MAX as i64) as i8
}

/// Synchronized application state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStateSnapshot {
    /// Main board reports its upstream link healthy
    pub link_ok: bool,
    /// LA (tuning signal) detected by the audio subsystem
    pub la_detected: bool,
    pub mp3_playing: bool,
    /// MP3 mode (false = U-SON mode)
    pub mp3_mode: bool,
    pub lock_mode: bool,
    pub lock_listening: bool,
    pub u_son_functional: bool,
    pub sd_ready: bool,
    pub fx_active: bool,
    pub scan_busy: bool,

    /// Volume, 0-100
    pub volume_percent: u8,
    /// Microphone level, 0-100
    pub mic_level_percent: u8,
    /// Unlock hold progress, 0-100
    pub unlock_hold_percent: u8,
    /// Tuning offset, -8..=8
    pub tuning_offset: i8,
    /// Tuning confidence, 0-100
    pub tuning_confidence: u8,

    pub track: u16,
    pub track_count: u16,
    pub ui_page: u8,
    pub ui_cursor: u16,
    pub ui_offset: u16,
    pub ui_count: u16,
    pub queue_count: u16,
    /// Last hardware key code (0 = none)
    pub key_code: u8,
    pub backend_mode: u8,
    pub error_code: u8,

    pub repeat_mode: RepeatMode,
    pub app_stage: AppStage,
    pub startup_stage: StartupStage,

    /// Sender uptime (ms), used to detect peer restarts
    pub uptime_ms: u32,
    /// Sender sequence number, stamped per transmit
    pub frame_seq: u32,
    /// Receiver clock when this snapshot was accepted (never sent)
    pub last_rx_time: u32,
}

impl DeviceStateSnapshot {
    /// Compare every synchronized field
    ///
    /// Sequencing fields (`uptime_ms`, `frame_seq`, `last_rx_time`) are
    /// excluded. A field missing from this list never triggers a send.
    pub fn same_tracked_state(&self, other: &Self) -> bool {
        self.link_ok == other.link_ok
            && self.la_detected == other.la_detected
            && self.mp3_playing == other.mp3_playing
            && self.mp3_mode == other.mp3_mode
            && self.lock_mode == other.lock_mode
            && self.lock_listening == other.lock_listening
            && self.u_son_functional == other.u_son_functional
            && self.sd_ready == other.sd_ready
            && self.fx_active == other.fx_active
            && self.scan_busy == other.scan_busy
            && self.volume_percent == other.volume_percent
            && self.mic_level_percent == other.mic_level_percent
            && self.unlock_hold_percent == other.unlock_hold_percent
            && self.tuning_offset == other.tuning_offset
            && self.tuning_confidence == other.tuning_confidence
            && self.track == other.track
            && self.track_count == other.track_count
            && self.ui_page == other.ui_page
            && self.ui_cursor == other.ui_cursor
            && self.ui_offset == other.ui_offset
            && self.ui_count == other.ui_count
            && self.queue_count == other.queue_count
            && self.key_code == other.key_code
            && self.backend_mode == other.backend_mode
            && self.error_code == other.error_code
            && self.repeat_mode == other.repeat_mode
            && self.app_stage == other.app_stage
            && self.startup_stage == other.startup_stage
    }

    /// Clamp every bounded field in place
    pub fn clamp(&mut self) {
        self.volume_percent = clamp_percent(self.volume_percent as i64);
        self.mic_level_percent = clamp_percent(self.mic_level_percent as i64);
        self.unlock_hold_percent = clamp_percent(self.unlock_hold_percent as i64);
        self.tuning_confidence = clamp_percent(self.tuning_confidence as i64);
        self.tuning_offset = clamp_tuning_offset(self.tuning_offset as i64);
    }

    /// Serialize into v2 fields (STAT / KEYFRAME payload)
    pub fn to_fields(&self) -> Result<FieldList, FieldError> {
        let mut f = FieldList::new();
        f.push_u32(keys::SEQ, self.frame_seq)?;
        f.push_u32(keys::UPTIME, self.uptime_ms)?;
        f.push_bool(keys::MODE, self.mp3_mode)?;
        f.push_bool(keys::LA, self.la_detected)?;
        f.push_bool(keys::MP3, self.mp3_playing)?;
        f.push_bool(keys::SD, self.sd_ready)?;
        f.push_u32(keys::KEY, self.key_code as u32)?;
        f.push_u32(keys::TRACK, self.track as u32)?;
        f.push_u32(keys::TRACK_TOTAL, self.track_count as u32)?;
        f.push_u32(keys::VOLUME, self.volume_percent as u32)?;
        f.push_bool(keys::LOCK, self.lock_mode)?;
        f.push_bool(keys::FUNCTIONAL, self.u_son_functional)?;
        f.push_i32(keys::TUNE_OFFSET, self.tuning_offset as i32)?;
        f.push_u32(keys::TUNE_CONFIDENCE, self.tuning_confidence as u32)?;
        f.push_bool(keys::LOCK_LISTEN, self.lock_listening)?;
        f.push_u32(keys::MIC, self.mic_level_percent as u32)?;
        f.push_u32(keys::HOLD, self.unlock_hold_percent as u32)?;
        f.push_u32(keys::STARTUP, self.startup_stage.as_raw() as u32)?;
        f.push_u32(keys::APP, self.app_stage.as_raw() as u32)?;
        f.push_u32(keys::UI_PAGE, self.ui_page as u32)?;
        f.push_u32(keys::REPEAT, self.repeat_mode.as_raw() as u32)?;
        f.push_bool(keys::FX, self.fx_active)?;
        f.push_u32(keys::BACKEND, self.backend_mode as u32)?;
        f.push_bool(keys::SCAN, self.scan_busy)?;
        f.push_u32(keys::ERROR, self.error_code as u32)?;
        f.push_u32(keys::UI_CURSOR, self.ui_cursor as u32)?;
        f.push_u32(keys::UI_OFFSET, self.ui_offset as u32)?;
        f.push_u32(keys::UI_COUNT, self.ui_count as u32)?;
        f.push_u32(keys::QUEUE, self.queue_count as u32)?;
        Ok(f)
    }

    /// Decode v2 fields, clamping bounded values
    ///
    /// Absent keys keep their default. Present keys that are not valid
    /// numbers (or do not fit their storage type) reject the whole frame.
    pub fn from_fields(fields: &FieldList) -> Result<Self, FrameError> {
        let mut s = Self::default();
        let r = FieldReader { fields };

        s.frame_seq = r.unsigned(keys::SEQ, u32::MAX)?.unwrap_or(0);
        s.uptime_ms = r.unsigned(keys::UPTIME, u32::MAX)?.unwrap_or(0);
        s.mp3_mode = r.flag(keys::MODE)?;
        s.la_detected = r.flag(keys::LA)?;
        s.mp3_playing = r.flag(keys::MP3)?;
        s.sd_ready = r.flag(keys::SD)?;
        s.key_code = r.narrow(keys::KEY)?;
        s.track = r.narrow(keys::TRACK)?;
        s.track_count = r.narrow(keys::TRACK_TOTAL)?;
        s.volume_percent = r.signed(keys::VOLUME)?.map_or(0, clamp_percent);
        s.lock_mode = r.flag(keys::LOCK)?;
        s.u_son_functional = r.flag(keys::FUNCTIONAL)?;
        s.tuning_offset = r.signed(keys::TUNE_OFFSET)?.map_or(0, clamp_tuning_offset);
        s.tuning_confidence = r.signed(keys::TUNE_CONFIDENCE)?.map_or(0, clamp_percent);
        s.lock_listening = r.flag(keys::LOCK_LISTEN)?;
        s.mic_level_percent = r.signed(keys::MIC)?.map_or(0, clamp_percent);
        s.unlock_hold_percent = r.signed(keys::HOLD)?.map_or(0, clamp_percent);
        s.startup_stage = r
            .signed(keys::STARTUP)?
            .map_or(StartupStage::default(), StartupStage::from_raw);
        s.ui_page = r.narrow(keys::UI_PAGE)?;
        s.repeat_mode = r
            .signed(keys::REPEAT)?
            .map_or(RepeatMode::default(), RepeatMode::from_raw);
        s.fx_active = r.flag(keys::FX)?;
        s.backend_mode = r.narrow(keys::BACKEND)?;
        s.scan_busy = r.flag(keys::SCAN)?;
        s.error_code = r.narrow(keys::ERROR)?;
        s.ui_cursor = r.narrow(keys::UI_CURSOR)?;
        s.ui_offset = r.narrow(keys::UI_OFFSET)?;
        s.ui_count = r.narrow(keys::UI_COUNT)?;
        s.queue_count = r.narrow(keys::QUEUE)?;

        s.app_stage = match r.signed(keys::APP)? {
            Some(raw) => AppStage::from_raw(raw),
            None => AppStage::derive(
                s.mp3_mode,
                s.u_son_functional,
                s.lock_mode,
                s.lock_listening,
            ),
        };

        Ok(s)
    }
}

/// Typed lookups over a field list for snapshot decoding
struct FieldReader<'a> {
    fields: &'a FieldList,
}

impl FieldReader<'_> {
    fn signed(&self, key: &str) -> Result<Option<i64>, FrameError> {
        self.fields
            .get(key)
            .map(|v| v.parse::<i64>().map_err(|_| FrameError::InvalidValue))
            .transpose()
    }

    fn unsigned(&self, key: &str, max: u32) -> Result<Option<u32>, FrameError> {
        match self.fields.get_u32(key).transpose()? {
            Some(v) if v > max => Err(FrameError::InvalidValue),
            other => Ok(other),
        }
    }

    fn narrow<T: TryFrom<u32> + Default>(&self, key: &str) -> Result<T, FrameError> {
        match self.unsigned(key, u32::MAX)? {
            Some(v) => T::try_from(v).map_err(|_| FrameError::InvalidValue),
            None => Ok(T::default()),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, FrameError> {
        Ok(self.fields.get_bool(key).transpose()?.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, MessageType, MAX_LINE_LEN};

    fn playing() -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            link_ok: true,
            mp3_playing: true,
            mp3_mode: true,
            track: 3,
            track_count: 12,
            volume_percent: 80,
            app_stage: AppStage::Mp3,
            frame_seq: 7,
            uptime_ms: 1234,
            ..Default::default()
        }
    }

    #[test]
    fn test_fields_roundtrip() {
        let mut snap = playing();
        snap.link_ok = false; // not carried on v2
        snap.tuning_offset = -5;
        snap.repeat_mode = RepeatMode::All;
        let fields = snap.to_fields().unwrap();
        assert_eq!(fields.len(), 29);
        assert_eq!(DeviceStateSnapshot::from_fields(&fields).unwrap(), snap);
    }

    #[test]
    fn test_worst_case_keyframe_fits_line() {
        let snap = DeviceStateSnapshot {
            volume_percent: 100,
            mic_level_percent: 100,
            unlock_hold_percent: 100,
            tuning_offset: -8,
            tuning_confidence: 100,
            track: u16::MAX,
            track_count: u16::MAX,
            ui_page: u8::MAX,
            ui_cursor: u16::MAX,
            ui_offset: u16::MAX,
            ui_count: u16::MAX,
            queue_count: u16::MAX,
            key_code: u8::MAX,
            backend_mode: u8::MAX,
            error_code: u8::MAX,
            uptime_ms: u32::MAX,
            frame_seq: u32::MAX,
            ..Default::default()
        };
        let frame = Frame::with_fields(MessageType::Keyframe, snap.to_fields().unwrap());
        let line = frame.encode_to_vec().unwrap();
        assert!(line.len() <= MAX_LINE_LEN);
    }

    #[test]
    fn test_from_fields_clamps() {
        let mut fields = FieldList::new();
        fields.push_i32(keys::TUNE_OFFSET, 99).unwrap();
        fields.push_u32(keys::MIC, 255).unwrap();
        fields.push_i32(keys::VOLUME, -20).unwrap();
        fields.push_u32(keys::APP, 42).unwrap();
        let snap = DeviceStateSnapshot::from_fields(&fields).unwrap();
        assert_eq!(snap.tuning_offset, 8);
        assert_eq!(snap.mic_level_percent, 100);
        assert_eq!(snap.volume_percent, 0);
        assert_eq!(snap.app_stage, AppStage::Waiting);
    }

    #[test]
    fn test_from_fields_rejects_garbage() {
        let mut fields = FieldList::new();
        fields.push(keys::TRACK, "abc").unwrap();
        assert_eq!(
            DeviceStateSnapshot::from_fields(&fields),
            Err(FrameError::InvalidValue)
        );

        let mut fields = FieldList::new();
        fields.push_u32(keys::TRACK, 70_000).unwrap();
        assert_eq!(
            DeviceStateSnapshot::from_fields(&fields),
            Err(FrameError::InvalidValue)
        );
    }

    #[test]
    fn test_from_fields_derives_missing_app_stage() {
        let mut fields = FieldList::new();
        fields.push_bool(keys::FUNCTIONAL, true).unwrap();
        let snap = DeviceStateSnapshot::from_fields(&fields).unwrap();
        assert_eq!(snap.app_stage, AppStage::Functional);
    }

    #[test]
    fn test_derive_precedence() {
        assert_eq!(AppStage::derive(true, true, true, true), AppStage::Mp3);
        assert_eq!(AppStage::derive(false, true, true, true), AppStage::Functional);
        assert_eq!(AppStage::derive(false, false, true, true), AppStage::Listening);
        assert_eq!(AppStage::derive(false, false, true, false), AppStage::Waiting);
        assert_eq!(AppStage::derive(false, false, false, true), AppStage::Waiting);
    }

    #[test]
    fn test_tracked_state_ignores_sequencing() {
        let a = playing();
        let mut b = a;
        b.frame_seq += 10;
        b.uptime_ms += 500;
        b.last_rx_time = 99;
        assert!(a.same_tracked_state(&b));

        b.tuning_confidence = 1;
        assert!(!a.same_tracked_state(&b));
    }

    #[test]
    fn test_clamp_in_place() {
        let mut snap = DeviceStateSnapshot {
            volume_percent: 200,
            tuning_offset: -100,
            ..Default::default()
        };
        snap.clamp();
        assert_eq!(snap.volume_percent, 100);
        assert_eq!(snap.tuning_offset, -8);
    }

    #[test]
    fn test_enum_fallbacks() {
        assert_eq!(StartupStage::from_raw(-1), StartupStage::Inactive);
        assert_eq!(StartupStage::from_raw(2), StartupStage::Ready);
        assert_eq!(RepeatMode::from_raw(9), RepeatMode::Off);
        assert_eq!(AppStage::from_raw(3), AppStage::Mp3);
    }
}
