//! # FlarmLink Core Library
//!
//! Link-layer engine for the binary protocol spoken by FLARM-compatible
//! collision-avoidance transponders.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Byte-stuffing (escape) encoding and resynchronizing decoding
//! - Checksum-protected frame headers
//! - A request/response session with ACK/NACK matching and deadlines
//! - A serial port backend and a traffic dump decorator
//! - A simulated transponder for hardware-less testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use flarmlink_core::{config::LinkConfig, protocol};
//!
//! let config = LinkConfig::load("flarm.json")?;
//! let mut session = protocol::connect(&config)?;
//!
//! if session.ping(config.ping_timeout()) {
//!     session.reset(config.timeout())?;
//! }
//! ```

pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LinkConfig;
    pub use crate::demo::SimulatedDevice;
    pub use crate::protocol::{
        Crc16Ccitt, Deadline, Frame, FrameHeader, Integrity, MessageType, Port, ProtocolError,
        Reply, Session, SessionState, WaitResult,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
