//! Session counters

/// Counters kept by a [`LinkSession`](super::LinkSession)
///
/// All counters wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionStats {
    /// Lines written
    pub tx_lines: u32,
    /// Non-empty lines received
    pub rx_lines: u32,
    /// Bytes received
    pub rx_bytes: u32,
    /// Framing failures, CRC-less lines when CRC is required, unknown types
    pub parse_errors: u32,
    /// Lines whose CRC did not match
    pub crc_errors: u32,
    /// Lines discarded for exceeding the line buffer
    pub line_overflows: u32,
    /// Input events dropped because the queue was full
    pub input_drops: u32,
    /// Lines not written (backpressure or stream error)
    pub tx_drops: u32,
    /// HELLO / ACK with a different protocol version
    pub proto_mismatches: u32,
}

pub(crate) fn bump(counter: &mut u32) {
    *counter = counter.wrapping_add(1);
}
