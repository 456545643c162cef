//! Non-blocking byte stream
//!
//! Implemented by board glue (a UART, or an adapter over the radio receive
//! ring). Every call returns immediately; the session never waits on the
//! transport.

use embedded_io::ErrorType;

/// Polled, non-blocking byte transport
pub trait ByteStream: ErrorType {
    /// Open or reset the transport
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Bytes ready to read
    fn available(&mut self) -> usize;

    /// Read one byte if one is ready
    fn read_byte(&mut self) -> Option<u8>;

    /// Bytes that can be written right now without blocking
    fn available_for_write(&mut self) -> usize;

    /// Write `data`, returning the number of bytes accepted
    ///
    /// Callers check `available_for_write` first; a short write is treated
    /// as a drop.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;
}
