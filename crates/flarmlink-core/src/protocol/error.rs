//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The serial driver rejected an operation
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No device behind the given port name
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// The deadline passed before the operation completed
    #[error("Timed out waiting for the device")]
    Timeout,

    /// Payload does not fit the 16-bit frame length
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// The transmitter refused further bytes for good
    #[error("Write stalled: {written} of {requested} bytes sent")]
    WriteStalled {
        /// Bytes accepted before the stall
        written: usize,
        /// Bytes the caller asked to write
        requested: usize,
    },

    /// Only produced by the low-level codec; a [`super::Session`] absorbs
    /// it by resynchronizing on the next START byte.
    #[error("Corrupt frame: {0}")]
    CorruptFrame(#[from] FrameError),

    /// Transport failure reported by the port
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Reasons a received frame is rejected as corrupt
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// ESCAPE followed by a byte other than the two substitution codes
    #[error("Unknown escape code {0:#04x}")]
    UnknownEscape(u8),

    /// A raw START byte appeared before the frame was complete
    #[error("Unescaped START byte inside a frame")]
    UnexpectedStart,

    /// Input ended right after an ESCAPE byte
    #[error("Escape byte at end of input")]
    TruncatedEscape,

    /// Declared length too small for the header plus sequence echo
    #[error("Frame length {0} leaves no room for a payload")]
    LengthTooShort(u16),

    /// Declared length disagrees with the bytes received
    #[error("Frame length {declared} does not match {actual} received bytes")]
    LengthMismatch {
        /// Length from the header
        declared: usize,
        /// Header plus payload bytes actually present
        actual: usize,
    },

    /// Checksum field does not match the computed checksum
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Checksum computed over the received bytes
        expected: u16,
        /// Checksum carried in the header
        actual: u16,
    },
}
