//! Frame encoding/decoding
//!
//! Every frame starts with a fixed 8-byte header (little-endian):
//! - 2 bytes: Total length (header + payload, before escaping)
//! - 1 byte:  Protocol version (always 0)
//! - 2 bytes: Sequence number
//! - 1 byte:  Message type
//! - 2 bytes: CRC over the first 6 header bytes followed by the payload

use byteorder::{ByteOrder, LittleEndian};

use super::{escape_into, FrameError, Integrity, MessageType, ProtocolError, HEADER_SIZE, START_FRAME};

/// Header bytes covered by the checksum
const CRC_OFFSET: usize = 6;

/// Largest payload whose length still fits the 16-bit length field
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Fixed-size header preceding every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Header plus payload size in bytes, without escape overhead
    pub total_length: u16,
    /// Protocol version
    pub version: u8,
    /// Identifies a request so its reply can be matched
    pub sequence_number: u16,
    /// Message type
    pub message_type: MessageType,
    /// Integrity checksum
    pub checksum: u16,
}

impl FrameHeader {
    /// Build the header for `payload`, computing its checksum
    pub fn build<I: Integrity + ?Sized>(
        sequence_number: u16,
        message_type: MessageType,
        payload: &[u8],
        integrity: &I,
    ) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        let mut header = Self {
            total_length: (HEADER_SIZE + payload.len()) as u16,
            version: 0,
            sequence_number,
            message_type,
            checksum: 0,
        };
        header.checksum = header.compute_checksum(payload, integrity);
        Ok(header)
    }

    /// Serialize to the unescaped wire layout
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut bytes[0..2], self.total_length);
        bytes[2] = self.version;
        LittleEndian::write_u16(&mut bytes[3..5], self.sequence_number);
        bytes[5] = self.message_type.code();
        LittleEndian::write_u16(&mut bytes[6..8], self.checksum);
        bytes
    }

    /// Decode the fixed-width fields without any validation
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            total_length: LittleEndian::read_u16(&bytes[0..2]),
            version: bytes[2],
            sequence_number: LittleEndian::read_u16(&bytes[3..5]),
            message_type: MessageType::from(bytes[5]),
            checksum: LittleEndian::read_u16(&bytes[6..8]),
        }
    }

    /// Payload size announced by the header.
    ///
    /// Fails with [`FrameError::LengthTooShort`] unless at least one payload
    /// byte follows.
    pub fn payload_length(&self) -> Result<usize, FrameError> {
        let total = self.total_length as usize;
        if total <= HEADER_SIZE {
            return Err(FrameError::LengthTooShort(self.total_length));
        }
        Ok(total - HEADER_SIZE)
    }

    /// Checksum of this header (crc field excluded) and `payload`
    pub fn compute_checksum<I: Integrity + ?Sized>(&self, payload: &[u8], integrity: &I) -> u16 {
        let bytes = self.to_bytes();
        integrity.checksum(&bytes[..CRC_OFFSET], payload)
    }
}

/// Decode a received header and verify it against its payload
pub fn parse_and_validate<I: Integrity + ?Sized>(
    raw_header: &[u8; HEADER_SIZE],
    payload: &[u8],
    integrity: &I,
) -> Result<FrameHeader, FrameError> {
    let header = FrameHeader::from_bytes(raw_header);

    let declared = header.total_length as usize;
    if declared < HEADER_SIZE {
        return Err(FrameError::LengthTooShort(header.total_length));
    }
    if declared != HEADER_SIZE + payload.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: HEADER_SIZE + payload.len(),
        });
    }

    let expected = integrity.checksum(&raw_header[..CRC_OFFSET], payload);
    if header.checksum != expected {
        return Err(FrameError::CrcMismatch {
            expected,
            actual: header.checksum,
        });
    }

    Ok(header)
}

/// A complete frame: header plus unescaped payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with a freshly computed header
    pub fn new<I: Integrity + ?Sized>(
        sequence_number: u16,
        message_type: MessageType,
        payload: Vec<u8>,
        integrity: &I,
    ) -> Result<Self, ProtocolError> {
        let header = FrameHeader::build(sequence_number, message_type, &payload, integrity)?;
        Ok(Self { header, payload })
    }

    /// Message type from the header
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// Sequence number echoed in the first two payload bytes of an ACK/NACK
    pub fn acknowledged_sequence(&self) -> Option<u16> {
        if self.payload.len() < 2 {
            return None;
        }
        Some(LittleEndian::read_u16(&self.payload[0..2]))
    }

    /// Full wire image: START byte, escaped header, escaped payload
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + HEADER_SIZE + self.payload.len() + 4);
        bytes.push(START_FRAME);
        escape_into(&self.header.to_bytes(), &mut bytes);
        escape_into(&self.payload, &mut bytes);
        bytes
    }
}
