//! Frame integrity checksums
//!
//! The checksum has to match the device firmware bit for bit, so it sits
//! behind a trait and can be swapped without touching the framing code.

use crc::{Crc, CRC_16_XMODEM};

/// Checksum over a frame header (without its crc field) and payload
pub trait Integrity {
    /// Compute the checksum of `header` followed by `payload`
    fn checksum(&self, header: &[u8], payload: &[u8]) -> u16;
}

/// CRC-16/CCITT with a zero initial value, as used by FLARM firmware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc16Ccitt;

const CRC16_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

impl Integrity for Crc16Ccitt {
    fn checksum(&self, header: &[u8], payload: &[u8]) -> u16 {
        let mut digest = CRC16_CCITT.digest();
        digest.update(header);
        digest.update(payload);
        digest.finalize()
    }
}

impl<F> Integrity for F
where
    F: Fn(&[u8], &[u8]) -> u16,
{
    fn checksum(&self, header: &[u8], payload: &[u8]) -> u16 {
        self(header, payload)
    }
}
