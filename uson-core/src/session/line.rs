//! Receive line accumulation
//!
//! Bytes are collected until `\n`. A line that outgrows the buffer is
//! discarded and everything up to the next `\n` is skipped, so one garbled
//! line never corrupts the one after it.

use uson_protocol::frame::{Line, MAX_LINE_LEN};

/// Result of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineStatus {
    /// Byte buffered, line not finished
    Pending,
    /// `\n` received; the line is ready in the buffer
    Complete,
    /// Buffer overflowed; dropping until the next `\n`
    Overflow,
    /// `\n` ended a dropped line
    Resynced,
}

/// Line accumulation buffer with a drop-until-newline flag
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    buf: Line,
    dropping: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: Line::new(),
            dropping: false,
        }
    }

    /// Feed one received byte
    pub fn push(&mut self, byte: u8) -> LineStatus {
        if byte == b'\n' {
            if self.dropping {
                self.dropping = false;
                self.buf.clear();
                return LineStatus::Resynced;
            }
            return LineStatus::Complete;
        }
        if self.dropping {
            return LineStatus::Pending;
        }
        if self.buf.push(byte).is_err() {
            self.buf.clear();
            self.dropping = true;
            return LineStatus::Overflow;
        }
        LineStatus::Pending
    }

    /// Take the completed line (without `\n`), leaving the buffer empty
    pub fn take(&mut self) -> Line {
        core::mem::take(&mut self.buf)
    }

    /// True while skipping the rest of an oversized line
    pub fn is_dropping(&self) -> bool {
        self.dropping
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.dropping = false;
    }
}

/// Capacity of the line buffer
pub const LINE_CAPACITY: usize = MAX_LINE_LEN;

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut LineBuffer, bytes: &[u8]) -> LineStatus {
        let mut last = LineStatus::Pending;
        for &b in bytes {
            last = buf.push(b);
        }
        last
    }

    #[test]
    fn test_complete_line() {
        let mut buf = LineBuffer::new();
        assert_eq!(feed(&mut buf, b"PING*00\n"), LineStatus::Complete);
        assert_eq!(buf.take().as_slice(), b"PING*00");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overflow_resyncs_at_newline() {
        let mut buf = LineBuffer::new();
        let mut saw_overflow = false;
        for _ in 0..LINE_CAPACITY + 10 {
            if buf.push(b'x') == LineStatus::Overflow {
                saw_overflow = true;
            }
        }
        assert!(saw_overflow);
        assert!(buf.is_dropping());

        assert_eq!(buf.push(b'\n'), LineStatus::Resynced);
        assert!(!buf.is_dropping());

        assert_eq!(feed(&mut buf, b"PONG\n"), LineStatus::Complete);
        assert_eq!(buf.take().as_slice(), b"PONG");
    }

    #[test]
    fn test_full_capacity_line_fits() {
        let mut buf = LineBuffer::new();
        for _ in 0..LINE_CAPACITY {
            assert_eq!(buf.push(b'a'), LineStatus::Pending);
        }
        assert_eq!(buf.push(b'\n'), LineStatus::Complete);
        assert_eq!(buf.len(), LINE_CAPACITY);
    }
}
