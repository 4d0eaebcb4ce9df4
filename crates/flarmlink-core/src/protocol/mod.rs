//! Binary Protocol Communication
//!
//! Implements the FLARM binary link-layer protocol.
//!
//! Every frame on the wire is a START byte followed by the byte-stuffed
//! header and payload. Requests are matched to their ACK/NACK reply by
//! sequence number.

mod deadline;
pub mod dump;
mod error;
pub mod escape;
pub mod frame;
mod integrity;
mod message;
mod port;
pub mod serial;
mod session;

pub use deadline::Deadline;
pub use dump::DumpPort;
pub use error::{FrameError, ProtocolError};
pub use escape::{escape, escape_into, send_escaped, unescape, FrameReader};
pub use frame::{parse_and_validate, Frame, FrameHeader};
pub use integrity::{Crc16Ccitt, Integrity};
pub use message::MessageType;
pub use port::{Port, WaitResult};
pub use serial::{connect, list_ports, PortInfo, SerialLink};
pub use session::{Reply, Session, SessionState, SessionStats};

/// Marks the beginning of every frame
pub const START_FRAME: u8 = 0x73;

/// Introduces a two-byte escape sequence
pub const ESCAPE: u8 = 0x78;

/// Substitute code for a literal [`START_FRAME`] byte
pub const ESCAPE_START: u8 = 0x31;

/// Substitute code for a literal [`ESCAPE`] byte
pub const ESCAPE_ESCAPE: u8 = 0x55;

/// Size of the unescaped frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Default baud rate of the transponder's data port
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default timeout for request/response exchanges in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
