//! Transport session
//!
//! Sends requests and matches ACK/NACK replies by sequence number.
//!
//! One request is outstanding at a time. Every operation computes a single
//! [`Deadline`] up front and hands it to each blocking step, so the frame
//! resync loop can never outlive the caller's timeout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    escape::send_escaped, parse_and_validate, Crc16Ccitt, Deadline, Frame, FrameHeader,
    FrameReader, Integrity, MessageType, Port, ProtocolError, WaitResult, HEADER_SIZE,
    START_FRAME,
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No request in flight
    Idle,
    /// Writing a frame to the port
    Sending,
    /// Scanning the inbound stream for a matching reply
    AwaitingReply,
}

/// Outcome of a request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Device answered ACK; carries the full reply payload
    Acknowledge(Vec<u8>),
    /// Device answered NACK; carries the full reply payload
    NegativeAcknowledge(Vec<u8>),
    /// No valid matching reply before the deadline
    Timeout,
}

impl Reply {
    /// Check for a positive acknowledgement
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Acknowledge(_))
    }

    /// Reply payload, if a reply arrived
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Reply::Acknowledge(payload) | Reply::NegativeAcknowledge(payload) => Some(payload),
            Reply::Timeout => None,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        match frame.message_type() {
            MessageType::Ack => Reply::Acknowledge(frame.payload),
            _ => Reply::NegativeAcknowledge(frame.payload),
        }
    }
}

/// Cumulative session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames written to the port
    pub frames_sent: u64,
    /// Unescaped header and payload bytes written
    pub bytes_sent: u64,
    /// Replies matched to a request
    pub frames_matched: u64,
    /// Frames dropped as corrupt or not matching
    pub frames_discarded: u64,
    /// Waits that ended without a match
    pub timeouts: u64,
}

/// Request/response engine on top of a [`Port`]
pub struct Session<P: Port, I: Integrity = Crc16Ccitt> {
    port: P,
    integrity: I,
    /// Sequence number of the next outbound request (wraps at 16 bits)
    next_sequence_number: u16,
    state: SessionState,
    reader: FrameReader,
    /// Payload buffer reused by every receive
    payload: Vec<u8>,
    stats: SessionStats,
}

impl<P: Port> Session<P> {
    /// Create a session using the device's CRC-16/CCITT checksum
    pub fn new(port: P) -> Self {
        Self::with_integrity(port, Crc16Ccitt)
    }
}

impl<P: Port, I: Integrity> Session<P, I> {
    /// Create a session with a custom integrity function
    pub fn with_integrity(port: P, integrity: I) -> Self {
        Self {
            port,
            integrity,
            next_sequence_number: 0,
            state: SessionState::Idle,
            reader: FrameReader::new(),
            payload: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get cumulative counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Sequence number the next request will carry
    pub fn next_sequence_number(&self) -> u16 {
        self.next_sequence_number
    }

    /// Override the sequence counter (e.g. to continue a previous session)
    pub fn set_next_sequence_number(&mut self, sequence_number: u16) {
        self.next_sequence_number = sequence_number;
    }

    /// Borrow the underlying port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the underlying port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the session and return the port
    pub fn into_port(self) -> P {
        self.port
    }

    /// Build a header for `payload`, consuming the next sequence number
    pub fn prepare_header(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<FrameHeader, ProtocolError> {
        let header = FrameHeader::build(
            self.next_sequence_number,
            message_type,
            payload,
            &self.integrity,
        )?;
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
        Ok(header)
    }

    /// Write a single unescaped START byte
    pub fn send_start_byte(&mut self, deadline: Deadline) -> Result<(), ProtocolError> {
        self.port.full_write(&[START_FRAME], deadline)
    }

    /// Write a complete frame: START, escaped header, escaped payload.
    ///
    /// A partial write is reported as-is and never retried.
    pub fn send_frame(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        deadline: Deadline,
    ) -> Result<(), ProtocolError> {
        self.state = SessionState::Sending;
        let result = self.write_frame(header, payload, deadline);
        self.state = SessionState::Idle;

        match &result {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += header.total_length as u64;
                tracing::debug!(
                    "sent {:?} frame seq={} len={}",
                    header.message_type,
                    header.sequence_number,
                    header.total_length
                );
            }
            Err(e) => tracing::warn!("failed to send {:?} frame: {e}", header.message_type),
        }
        result
    }

    fn write_frame(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        deadline: Deadline,
    ) -> Result<(), ProtocolError> {
        self.send_start_byte(deadline)?;
        send_escaped(&mut self.port, &header.to_bytes(), deadline)?;
        if !payload.is_empty() {
            send_escaped(&mut self.port, payload, deadline)?;
        }
        Ok(())
    }

    /// Send a request frame and return its sequence number
    pub fn send_request(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<u16, ProtocolError> {
        let deadline = Deadline::after(timeout);
        let header = self.prepare_header(message_type, payload)?;
        self.send_frame(&header, payload, deadline)?;
        Ok(header.sequence_number)
    }

    /// Scan the inbound stream for a frame of one of the `expected` types.
    ///
    /// ACK and NACK frames only match when their payload echoes
    /// `sequence_number`. Corrupt and non-matching frames are dropped and
    /// scanning resumes at the next START byte. Returns `None` once the
    /// deadline passes; only transport failures are errors.
    pub fn await_frame(
        &mut self,
        sequence_number: u16,
        expected: &[MessageType],
        deadline: Deadline,
    ) -> Result<Option<Frame>, ProtocolError> {
        self.state = SessionState::AwaitingReply;
        let result = self.scan_for_reply(sequence_number, expected, deadline);
        self.state = SessionState::Idle;

        match &result {
            Ok(Some(frame)) => {
                self.stats.frames_matched += 1;
                tracing::debug!(
                    "matched {:?} reply for seq={sequence_number}",
                    frame.message_type()
                );
            }
            Ok(None) => {
                self.stats.timeouts += 1;
                tracing::debug!("no reply for seq={sequence_number} before deadline");
            }
            Err(e) => tracing::warn!("transport failure awaiting seq={sequence_number}: {e}"),
        }
        result
    }

    fn scan_for_reply(
        &mut self,
        sequence_number: u16,
        expected: &[MessageType],
        deadline: Deadline,
    ) -> Result<Option<Frame>, ProtocolError> {
        while !deadline.has_expired() {
            match self.reader.wait_for_start(&mut self.port, deadline)? {
                WaitResult::Ready => {}
                WaitResult::Timeout => break,
            }

            let header = match self.receive_frame(deadline) {
                Ok(header) => header,
                Err(ProtocolError::CorruptFrame(reason)) => {
                    self.discard(format_args!("{reason}"));
                    continue;
                }
                Err(ProtocolError::Timeout) => break,
                Err(e) => return Err(e),
            };

            if !expected.contains(&header.message_type) {
                self.discard(format_args!("unexpected {:?}", header.message_type));
                continue;
            }

            if header.message_type.is_acknowledgement() {
                let frame_sequence = self
                    .payload
                    .get(0..2)
                    .map(|echo| u16::from_le_bytes([echo[0], echo[1]]));
                if frame_sequence != Some(sequence_number) {
                    self.discard(format_args!(
                        "acknowledges {frame_sequence:?}, want {sequence_number}"
                    ));
                    continue;
                }
            }

            return Ok(Some(Frame {
                header,
                payload: self.payload.clone(),
            }));
        }

        Ok(None)
    }

    /// Read and validate one frame following a START byte. The payload is
    /// left in `self.payload`.
    fn receive_frame(&mut self, deadline: Deadline) -> Result<FrameHeader, ProtocolError> {
        let mut raw = [0u8; HEADER_SIZE];
        self.reader.read_unescaped(&mut self.port, &mut raw, deadline)?;

        let payload_length = FrameHeader::from_bytes(&raw).payload_length()?;

        self.payload.clear();
        self.payload.resize(payload_length, 0);
        self.reader
            .read_unescaped(&mut self.port, &mut self.payload, deadline)?;

        Ok(parse_and_validate(&raw, &self.payload, &self.integrity)?)
    }

    fn discard(&mut self, reason: std::fmt::Arguments<'_>) {
        self.stats.frames_discarded += 1;
        tracing::trace!("discarding frame: {reason}");
    }

    /// Wait for the ACK or NACK answering `sequence_number`
    pub fn wait_for_ack_or_nack(
        &mut self,
        sequence_number: u16,
        timeout: Duration,
    ) -> Result<Reply, ProtocolError> {
        self.await_acknowledgement(sequence_number, Deadline::after(timeout))
    }

    /// Wait for an ACK answering `sequence_number`; NACK and timeout are `false`
    pub fn wait_for_ack(
        &mut self,
        sequence_number: u16,
        timeout: Duration,
    ) -> Result<bool, ProtocolError> {
        Ok(self.wait_for_ack_or_nack(sequence_number, timeout)?.is_ack())
    }

    fn await_acknowledgement(
        &mut self,
        sequence_number: u16,
        deadline: Deadline,
    ) -> Result<Reply, ProtocolError> {
        let frame = self.await_frame(
            sequence_number,
            &[MessageType::Ack, MessageType::Nack],
            deadline,
        )?;
        Ok(frame.map(Reply::from_frame).unwrap_or(Reply::Timeout))
    }

    /// Send a request and wait for its ACK/NACK, all within `timeout`
    pub fn request(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Reply, ProtocolError> {
        let deadline = Deadline::after(timeout);
        let header = self.prepare_header(message_type, payload)?;

        match self.send_frame(&header, payload, deadline) {
            Ok(()) => {}
            Err(ProtocolError::Timeout) => return Ok(Reply::Timeout),
            Err(e) => return Err(e),
        }

        self.await_acknowledgement(header.sequence_number, deadline)
    }

    /// Check whether the device answers a binary PING with an ACK
    pub fn ping(&mut self, timeout: Duration) -> bool {
        match self.request(MessageType::Ping, &[], timeout) {
            Ok(Reply::Acknowledge(_)) => true,
            Ok(reply) => {
                tracing::debug!("ping failed: {reply:?}");
                false
            }
            Err(e) => {
                tracing::debug!("ping failed: {e}");
                false
            }
        }
    }

    /// Ask the device to leave binary mode. No reply is awaited.
    pub fn reset(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        let deadline = Deadline::after(timeout);
        let header = self.prepare_header(MessageType::Exit, &[])?;
        self.send_frame(&header, &[], deadline)
    }
}
