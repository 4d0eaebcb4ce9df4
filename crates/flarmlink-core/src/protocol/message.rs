//! Message types
//!
//! Defines the message type codes carried in the frame header.

use serde::{Deserialize, Serialize};

/// Message type carried in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Sentinel for "no valid reply"; never sent on the wire
    Error,

    /// Liveness check, answered with ACK
    Ping,

    /// Change the baud rate of the data port
    SetBaudRate,

    /// Firmware upload block
    FlashUpload,

    /// Leave binary mode / reset the device
    Exit,

    /// Select a flight record for download
    SelectRecord,

    /// Query information about the selected record
    GetRecordInfo,

    /// Download a block of IGC data
    GetIgcData,

    /// Positive acknowledgement
    Ack,

    /// Negative acknowledgement
    Nack,

    /// Device-specific type without a dedicated variant
    Other(u8),
}

impl MessageType {
    /// Get the wire code of this message type
    pub fn code(&self) -> u8 {
        match self {
            MessageType::Error => 0x00,
            MessageType::Ping => 0x01,
            MessageType::SetBaudRate => 0x02,
            MessageType::FlashUpload => 0x10,
            MessageType::Exit => 0x12,
            MessageType::SelectRecord => 0x20,
            MessageType::GetRecordInfo => 0x21,
            MessageType::GetIgcData => 0x22,
            MessageType::Ack => 0xA0,
            MessageType::Nack => 0xB7,
            MessageType::Other(code) => *code,
        }
    }

    /// Check if this is an ACK or NACK reply
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, MessageType::Ack | MessageType::Nack)
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            0x00 => MessageType::Error,
            0x01 => MessageType::Ping,
            0x02 => MessageType::SetBaudRate,
            0x10 => MessageType::FlashUpload,
            0x12 => MessageType::Exit,
            0x20 => MessageType::SelectRecord,
            0x21 => MessageType::GetRecordInfo,
            0x22 => MessageType::GetIgcData,
            0xA0 => MessageType::Ack,
            0xB7 => MessageType::Nack,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> Self {
        message_type.code()
    }
}
