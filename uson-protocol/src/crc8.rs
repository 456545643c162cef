//! CRC-8 checksum shared by the v2 line codec and the legacy STAT/TXT frames.
//!
//! Polynomial 0x07, initial value 0x00, MSB-first, no reflection and no final
//! XOR. Both peers must run it over byte-identical ranges: everything before
//! the `*` (v2 lines) or before the final comma (legacy frames).

/// Generator polynomial (x^8 + x^2 + x + 1)
pub const POLYNOMIAL: u8 = 0x07;

/// Incremental CRC-8 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc8 {
    value: u8,
}

impl Crc8 {
    /// Create a new digest with the initial value
    pub const fn new() -> Self {
        Self { value: 0x00 }
    }

    /// Feed a single byte
    pub fn update_byte(&mut self, byte: u8) {
        let mut crc = self.value ^ byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
        self.value = crc;
    }

    /// Feed a slice of bytes
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.update_byte(byte);
        }
    }

    /// Current checksum value
    pub fn finish(&self) -> u8 {
        self.value
    }
}

/// Compute the CRC-8 of `data` in one shot
pub fn crc8(data: &[u8]) -> u8 {
    let mut digest = Crc8::new();
    digest.update(data);
    digest.finish()
}

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Render a checksum as two uppercase hex digits
pub fn hex_digits(value: u8) -> [u8; 2] {
    [
        HEX_UPPER[(value >> 4) as usize],
        HEX_UPPER[(value & 0x0F) as usize],
    ]
}

fn hex_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Parse exactly two hex digits (either case) into a byte
pub fn parse_hex_byte(digits: &[u8]) -> Option<u8> {
    match digits {
        [hi, lo] => Some((hex_nibble(*hi)? << 4) | hex_nibble(*lo)?),
        _ => None,
    }
}
