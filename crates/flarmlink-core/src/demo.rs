//! Demo Mode - Simulated FLARM transponder for testing
//!
//! Answers binary requests the way a real device does, without any
//! hardware attached. Noise and corrupted frames can be injected in front
//! of every reply to exercise the resynchronization logic.

use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io;

use crate::protocol::{
    parse_and_validate, Crc16Ccitt, Deadline, Frame, MessageType, Port, WaitResult, ESCAPE,
    ESCAPE_ESCAPE, ESCAPE_START, HEADER_SIZE, START_FRAME,
};

/// How the simulated device answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// ACK every request
    Ack,
    /// NACK every request
    Nack,
    /// ACK with a sequence number that belongs to no request
    WrongSequence,
    /// Never answer
    Silent,
}

/// Simulated transponder implementing [`Port`] from the host's side
pub struct SimulatedDevice {
    /// Bytes queued for the host to read
    outbound: VecDeque<u8>,
    /// Unescaped bytes of the request currently being received
    rx: Vec<u8>,
    /// Inside a frame (a START was seen)
    in_frame: bool,
    /// Previous byte was ESCAPE
    escaped: bool,
    mode: ReplyMode,
    /// Random garbage bytes sent before each reply
    noise: usize,
    /// Corrupted copies sent before each reply
    corrupt_copies: usize,
    received: Vec<Frame>,
    exited: bool,
    /// Random number generator for noise
    rng: StdRng,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl SimulatedDevice {
    /// Create a device with a fixed seed so noise is reproducible
    pub fn new(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            outbound: VecDeque::new(),
            rx: Vec::new(),
            in_frame: false,
            escaped: false,
            mode: ReplyMode::Ack,
            noise: 0,
            corrupt_copies: 0,
            received: Vec::new(),
            exited: false,
            rng,
        }
    }

    /// Set how requests are answered
    pub fn with_mode(mut self, mode: ReplyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Send `bytes` random non-START bytes ahead of every reply
    pub fn with_noise(mut self, bytes: usize) -> Self {
        self.noise = bytes;
        self
    }

    /// Send `copies` frames with a broken CRC ahead of every reply
    pub fn with_corrupt_copies(mut self, copies: usize) -> Self {
        self.corrupt_copies = copies;
        self
    }

    /// Requests received so far
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Whether an EXIT request has been received
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Queue raw bytes for the host, bypassing the protocol
    pub fn inject(&mut self, bytes: &[u8]) {
        self.outbound.extend(bytes);
    }

    /// Bytes not yet read by the host
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            if byte == START_FRAME {
                self.rx.clear();
                self.in_frame = true;
                self.escaped = false;
                continue;
            }
            if !self.in_frame {
                continue;
            }

            if self.escaped {
                self.escaped = false;
                match byte {
                    ESCAPE_START => self.rx.push(START_FRAME),
                    ESCAPE_ESCAPE => self.rx.push(ESCAPE),
                    _ => {
                        self.in_frame = false;
                        continue;
                    }
                }
            } else if byte == ESCAPE {
                self.escaped = true;
                continue;
            } else {
                self.rx.push(byte);
            }

            if self.rx.len() >= HEADER_SIZE {
                let total = LittleEndian::read_u16(&self.rx[0..2]) as usize;
                if total < HEADER_SIZE {
                    self.in_frame = false;
                } else if self.rx.len() == total {
                    self.in_frame = false;
                    self.handle_request();
                }
            }
        }
    }

    fn handle_request(&mut self) {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.rx[..HEADER_SIZE]);
        let payload = self.rx[HEADER_SIZE..].to_vec();

        let header = match parse_and_validate(&raw, &payload, &Crc16Ccitt) {
            Ok(header) => header,
            Err(e) => {
                tracing::trace!("simulated device dropped request: {e}");
                return;
            }
        };
        self.received.push(Frame { header, payload });

        if header.message_type == MessageType::Exit {
            self.exited = true;
            return;
        }

        let (reply_type, echoed) = match self.mode {
            ReplyMode::Ack => (MessageType::Ack, header.sequence_number),
            ReplyMode::Nack => (MessageType::Nack, header.sequence_number),
            ReplyMode::WrongSequence => (MessageType::Ack, header.sequence_number.wrapping_add(1)),
            ReplyMode::Silent => return,
        };
        self.queue_reply(reply_type, echoed);
    }

    fn queue_reply(&mut self, message_type: MessageType, echoed: u16) {
        for _ in 0..self.noise {
            let byte: u8 = self.rng.gen();
            // Keep the garbage free of START but rich in ESCAPE
            self.outbound
                .push_back(if byte == START_FRAME { ESCAPE } else { byte });
        }

        let Ok(frame) = Frame::new(
            echoed,
            message_type,
            echoed.to_le_bytes().to_vec(),
            &Crc16Ccitt,
        ) else {
            return;
        };

        for _ in 0..self.corrupt_copies {
            let mut broken = frame.clone();
            broken.header.checksum ^= 1 << self.rng.gen_range(0..16);
            self.outbound.extend(broken.encode());
        }
        self.outbound.extend(frame.encode());
    }
}

impl Port for SimulatedDevice {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.feed(data);
        Ok(data.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    // The device answers synchronously inside `write`, so once the queue is
    // empty nothing more can arrive and waits time out immediately.
    fn wait_for_byte(&mut self, byte: u8, _deadline: Deadline) -> io::Result<WaitResult> {
        match self.outbound.iter().position(|&b| b == byte) {
            Some(pos) => {
                self.outbound.drain(..=pos);
                Ok(WaitResult::Ready)
            }
            None => Ok(WaitResult::Timeout),
        }
    }

    fn wait_readable(&mut self, _deadline: Deadline) -> io::Result<WaitResult> {
        if self.outbound.is_empty() {
            Ok(WaitResult::Timeout)
        } else {
            Ok(WaitResult::Ready)
        }
    }
}
