//! Legacy comma-separated STAT / TXT frames
//!
//! Older screen firmware speaks this format instead of the v2 line codec.
//! Both families follow one versioning policy:
//! - fixed value order,
//! - a minimum token count below which the frame is rejected,
//! - missing trailing values default (older senders emit fewer),
//! - a trailing CRC token once enough tokens are present to imply one.
//!
//! Token counts include the `STAT` / `TXT` header token.
//!
//! STAT value order:
//! ```text
//!  1 link_ok          8 mp3_mode        15 unlock_hold     22 fx_active
//!  2 la_detected      9 lock_mode       16 sd_ready        23 backend_mode
//!  3 mp3_playing     10 u_son_func      17 startup_stage   24 scan_busy
//!  4 uptime_ms       11 tuning_offset   18 frame_seq       25 error_code
//!  5 track           12 tuning_conf     19 app_stage       26 ui_cursor
//!  6 track_count     13 lock_listening  20 ui_page         27 ui_offset
//!  7 volume          14 mic_level       21 repeat_mode     28 ui_count
//! ```

use core::fmt::Write;
use heapless::{String, Vec};

use crate::crc8::{crc8, parse_hex_byte};
use crate::snapshot::{
    clamp_percent, clamp_tuning_offset, AppStage, DeviceStateSnapshot, RepeatMode, StartupStage,
};

pub const STAT_HEADER: &str = "STAT";
pub const TXT_HEADER: &str = "TXT";

/// Fewest STAT tokens accepted (header + 18 values)
pub const STAT_MIN_TOKENS: usize = 19;
/// From this many tokens on, the last STAT token is a CRC
pub const STAT_CRC_MIN_TOKENS: usize = 27;
/// Most STAT tokens accepted (header + 28 values + CRC)
pub const STAT_MAX_TOKENS: usize = 30;
/// Number of values in a complete STAT frame
pub const STAT_VALUE_COUNT: usize = 28;

/// TXT tokens without CRC (header, seq, slot, text)
pub const TXT_MIN_TOKENS: usize = 4;
/// TXT tokens with CRC
pub const TXT_CRC_TOKENS: usize = 5;

/// Longest text payload in a TXT frame
pub const MAX_TEXT_LEN: usize = 63;

/// Longest legacy line accepted or produced (including `\n`)
pub const MAX_LEGACY_LINE_LEN: usize = 128;

/// Zero-based value index of app_stage
const APP_STAGE_INDEX: usize = 18;

/// Encoded legacy line
pub type LegacyLine = String<MAX_LEGACY_LINE_LEN>;

/// Errors that can occur decoding or encoding legacy frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LegacyError {
    /// Header is neither `STAT` nor `TXT` (or not the one expected)
    UnknownHeader,
    /// Fewer tokens than the format minimum
    TooFewFields,
    /// More tokens than the format maximum
    TooManyFields,
    /// A value token is not a valid number
    InvalidValue,
    /// Line exceeds `MAX_LEGACY_LINE_LEN`
    LineTooLong,
    /// Non-printable or non-ASCII byte in the line
    InvalidEncoding,
    /// CRC token is not two hex digits
    MalformedChecksum,
    /// CRC does not match the line prefix
    CrcMismatch,
    /// TXT slot token not in the known set
    UnknownSlot,
    /// TXT text longer than `MAX_TEXT_LEN` or containing a comma
    TextTooLong,
}

/// Text slots a TXT frame can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TextSlot {
    Title,
    Artist,
    Status,
    Hint,
    Error,
}

impl TextSlot {
    pub const ALL: [TextSlot; 5] = [
        TextSlot::Title,
        TextSlot::Artist,
        TextSlot::Status,
        TextSlot::Hint,
        TextSlot::Error,
    ];

    pub fn token(self) -> &'static str {
        match self {
            TextSlot::Title => "TITLE",
            TextSlot::Artist => "ARTIST",
            TextSlot::Status => "STATUS",
            TextSlot::Hint => "HINT",
            TextSlot::Error => "ERROR",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.token() == token)
    }
}

/// Decoded TXT frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TextFrame {
    pub seq: u32,
    pub slot: TextSlot,
    pub text: String<MAX_TEXT_LEN>,
}

/// Any decoded legacy frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LegacyFrame {
    Stat(DeviceStateSnapshot),
    Text(TextFrame),
}

/// Tokenized legacy line
struct Tokens<'a> {
    line: &'a str,
    tokens: Vec<&'a str, { STAT_MAX_TOKENS + 1 }>,
}

impl<'a> Tokens<'a> {
    fn split(raw: &'a [u8], max_tokens: usize) -> Result<Self, LegacyError> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() > MAX_LEGACY_LINE_LEN - 1 {
            return Err(LegacyError::LineTooLong);
        }
        if !raw.iter().all(|&b| (0x20..0x7F).contains(&b)) {
            return Err(LegacyError::InvalidEncoding);
        }
        let line = core::str::from_utf8(raw).map_err(|_| LegacyError::InvalidEncoding)?;

        let mut tokens = Vec::new();
        for token in line.split(',') {
            if tokens.len() == max_tokens {
                return Err(LegacyError::TooManyFields);
            }
            tokens.push(token).map_err(|_| LegacyError::TooManyFields)?;
        }
        Ok(Self { line, tokens })
    }

    fn header(&self) -> &str {
        self.tokens.first().copied().unwrap_or("")
    }

    /// Validate the trailing CRC token against everything before the last comma
    fn verify_crc(&self) -> Result<(), LegacyError> {
        let split = self.line.rfind(',').ok_or(LegacyError::MalformedChecksum)?;
        let expected = parse_hex_byte(self.line[split + 1..].as_bytes())
            .ok_or(LegacyError::MalformedChecksum)?;
        if crc8(self.line[..split].as_bytes()) != expected {
            return Err(LegacyError::CrcMismatch);
        }
        Ok(())
    }
}

/// Positional numeric values of a STAT frame
struct Values<'a> {
    values: &'a [&'a str],
}

impl Values<'_> {
    fn signed(&self, index: usize) -> Result<Option<i64>, LegacyError> {
        self.values
            .get(index)
            .map(|t| t.trim().parse::<i64>().map_err(|_| LegacyError::InvalidValue))
            .transpose()
    }

    fn flag(&self, index: usize) -> Result<bool, LegacyError> {
        Ok(self.signed(index)?.map_or(false, |v| v != 0))
    }

    fn narrow<T: TryFrom<i64> + Default>(&self, index: usize) -> Result<T, LegacyError> {
        match self.signed(index)? {
            Some(v) => T::try_from(v).map_err(|_| LegacyError::InvalidValue),
            None => Ok(T::default()),
        }
    }

    fn percent(&self, index: usize) -> Result<u8, LegacyError> {
        Ok(self.signed(index)?.map_or(0, clamp_percent))
    }
}

/// Decode a STAT line into a snapshot
///
/// `last_rx_time` is left at zero; the receiver stamps it.
pub fn decode_stat(line: &[u8]) -> Result<DeviceStateSnapshot, LegacyError> {
    let tokens = Tokens::split(line, STAT_MAX_TOKENS)?;
    if tokens.header() != STAT_HEADER {
        return Err(LegacyError::UnknownHeader);
    }
    let count = tokens.tokens.len();
    if count < STAT_MIN_TOKENS {
        return Err(LegacyError::TooFewFields);
    }

    let values_end = if count >= STAT_CRC_MIN_TOKENS {
        tokens.verify_crc()?;
        count - 1
    } else {
        count
    };
    let v = Values {
        values: &tokens.tokens[1..values_end],
    };

    let mut s = DeviceStateSnapshot {
        link_ok: v.flag(0)?,
        la_detected: v.flag(1)?,
        mp3_playing: v.flag(2)?,
        uptime_ms: v.narrow(3)?,
        track: v.narrow(4)?,
        track_count: v.narrow(5)?,
        volume_percent: v.percent(6)?,
        mp3_mode: v.flag(7)?,
        lock_mode: v.flag(8)?,
        u_son_functional: v.flag(9)?,
        tuning_offset: v.signed(10)?.map_or(0, clamp_tuning_offset),
        tuning_confidence: v.percent(11)?,
        lock_listening: v.flag(12)?,
        mic_level_percent: v.percent(13)?,
        unlock_hold_percent: v.percent(14)?,
        sd_ready: v.flag(15)?,
        startup_stage: v
            .signed(16)?
            .map_or(StartupStage::default(), StartupStage::from_raw),
        frame_seq: v.narrow(17)?,
        ui_page: v.narrow(19)?,
        repeat_mode: v
            .signed(20)?
            .map_or(RepeatMode::default(), RepeatMode::from_raw),
        fx_active: v.flag(21)?,
        backend_mode: v.narrow(22)?,
        scan_busy: v.flag(23)?,
        error_code: v.narrow(24)?,
        ui_cursor: v.narrow(25)?,
        ui_offset: v.narrow(26)?,
        ui_count: v.narrow(27)?,
        ..Default::default()
    };

    s.app_stage = match v.signed(APP_STAGE_INDEX)? {
        Some(raw) => AppStage::from_raw(raw),
        None => AppStage::derive(s.mp3_mode, s.u_son_functional, s.lock_mode, s.lock_listening),
    };

    Ok(s)
}

/// Decode a TXT line
pub fn decode_text(line: &[u8]) -> Result<TextFrame, LegacyError> {
    let tokens = Tokens::split(line, TXT_CRC_TOKENS)?;
    if tokens.header() != TXT_HEADER {
        return Err(LegacyError::UnknownHeader);
    }
    match tokens.tokens.len() {
        TXT_MIN_TOKENS => {}
        TXT_CRC_TOKENS => tokens.verify_crc()?,
        _ => return Err(LegacyError::TooFewFields),
    }

    let seq = tokens.tokens[1]
        .trim()
        .parse::<u32>()
        .map_err(|_| LegacyError::InvalidValue)?;
    let slot = TextSlot::from_token(tokens.tokens[2]).ok_or(LegacyError::UnknownSlot)?;
    let mut text = String::new();
    text.push_str(tokens.tokens[3])
        .map_err(|_| LegacyError::TextTooLong)?;

    Ok(TextFrame { seq, slot, text })
}

/// Decode either family by its header token
pub fn decode_line(line: &[u8]) -> Result<LegacyFrame, LegacyError> {
    if line.starts_with(b"STAT,") {
        decode_stat(line).map(LegacyFrame::Stat)
    } else if line.starts_with(b"TXT,") {
        decode_text(line).map(LegacyFrame::Text)
    } else {
        Err(LegacyError::UnknownHeader)
    }
}

/// Append `,CC\n` where CC covers everything written so far
fn finish_line(line: &mut LegacyLine) -> Result<(), LegacyError> {
    let crc = crc8(line.as_bytes());
    write!(line, ",{:02X}\n", crc).map_err(|_| LegacyError::LineTooLong)
}

/// Encode a complete STAT line (28 values + CRC)
pub fn encode_stat(s: &DeviceStateSnapshot) -> Result<LegacyLine, LegacyError> {
    let values: [i64; STAT_VALUE_COUNT] = [
        s.link_ok as i64,
        s.la_detected as i64,
        s.mp3_playing as i64,
        s.uptime_ms as i64,
        s.track as i64,
        s.track_count as i64,
        s.volume_percent as i64,
        s.mp3_mode as i64,
        s.lock_mode as i64,
        s.u_son_functional as i64,
        s.tuning_offset as i64,
        s.tuning_confidence as i64,
        s.lock_listening as i64,
        s.mic_level_percent as i64,
        s.unlock_hold_percent as i64,
        s.sd_ready as i64,
        s.startup_stage.as_raw() as i64,
        s.frame_seq as i64,
        s.app_stage.as_raw() as i64,
        s.ui_page as i64,
        s.repeat_mode.as_raw() as i64,
        s.fx_active as i64,
        s.backend_mode as i64,
        s.scan_busy as i64,
        s.error_code as i64,
        s.ui_cursor as i64,
        s.ui_offset as i64,
        s.ui_count as i64,
    ];

    let mut line = LegacyLine::new();
    line.push_str(STAT_HEADER)
        .map_err(|_| LegacyError::LineTooLong)?;
    for value in values {
        write!(line, ",{}", value).map_err(|_| LegacyError::LineTooLong)?;
    }
    finish_line(&mut line)?;
    Ok(line)
}

/// Encode a TXT line with CRC
pub fn encode_text(seq: u32, slot: TextSlot, text: &str) -> Result<LegacyLine, LegacyError> {
    if text.len() > MAX_TEXT_LEN || text.contains(',') {
        return Err(LegacyError::TextTooLong);
    }
    if !text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return Err(LegacyError::InvalidEncoding);
    }
    let mut line = LegacyLine::new();
    write!(line, "{},{},{},{}", TXT_HEADER, seq, slot.token(), text)
        .map_err(|_| LegacyError::LineTooLong)?;
    finish_line(&mut line)?;
    Ok(line)
}

/// Counters kept by [`StatReceiver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LegacyStats {
    pub stat_frames: u32,
    pub text_frames: u32,
    pub parse_errors: u32,
    pub crc_errors: u32,
}

/// What [`StatReceiver::apply`] did with a line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LegacyOutcome {
    /// State snapshot replaced
    State,
    /// Text frame decoded, state untouched
    Text(TextFrame),
    /// Integrity failure, state untouched
    CrcRejected,
    /// Framing failure, state untouched
    Malformed(LegacyError),
}

/// Applies legacy lines to the receiver's accepted state
#[derive(Debug, Clone, Default)]
pub struct StatReceiver {
    stats: LegacyStats,
}

impl StatReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> LegacyStats {
        self.stats
    }

    /// Decode `line` and, for STAT frames, replace `state`
    ///
    /// CRC failures count separately from framing failures; neither
    /// touches `state`.
    pub fn apply(
        &mut self,
        line: &[u8],
        now: u32,
        state: &mut DeviceStateSnapshot,
    ) -> LegacyOutcome {
        match decode_line(line) {
            Ok(LegacyFrame::Stat(mut snapshot)) => {
                snapshot.last_rx_time = now;
                *state = snapshot;
                self.stats.stat_frames = self.stats.stat_frames.wrapping_add(1);
                LegacyOutcome::State
            }
            Ok(LegacyFrame::Text(text)) => {
                self.stats.text_frames = self.stats.text_frames.wrapping_add(1);
                LegacyOutcome::Text(text)
            }
            Err(LegacyError::CrcMismatch) => {
                self.stats.crc_errors = self.stats.crc_errors.wrapping_add(1);
                LegacyOutcome::CrcRejected
            }
            Err(e) => {
                self.stats.parse_errors = self.stats.parse_errors.wrapping_add(1);
                LegacyOutcome::Malformed(e)
            }
        }
    }
}
