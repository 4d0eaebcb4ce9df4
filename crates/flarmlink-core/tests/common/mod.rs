#![allow(dead_code)]

use flarmlink_core::protocol::{Crc16Ccitt, Deadline, Frame, MessageType, Port, WaitResult};
use std::io;

/// Mock serial port for testing
pub struct MockSerial {
    pub send_buffer: Vec<u8>,
    pub recv_buffer: Vec<u8>,
    pub recv_idx: usize,
    /// Maximum bytes handed out per read, to exercise read boundaries
    pub max_read: usize,
    pub fail_on_send: bool,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::with_response(Vec::new())
    }

    pub fn with_response(response: Vec<u8>) -> Self {
        Self {
            send_buffer: Vec::new(),
            recv_buffer: response,
            recv_idx: 0,
            max_read: usize::MAX,
            fail_on_send: false,
        }
    }

    pub fn trickle(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    pub fn remaining(&self) -> &[u8] {
        &self.recv_buffer[self.recv_idx..]
    }
}

impl Port for MockSerial {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.fail_on_send {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "Serial write failed"));
        }
        self.send_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining().len()).min(self.max_read);
        buf[..n].copy_from_slice(&self.recv_buffer[self.recv_idx..self.recv_idx + n]);
        self.recv_idx += n;
        Ok(n)
    }

    fn wait_for_byte(&mut self, byte: u8, _deadline: Deadline) -> io::Result<WaitResult> {
        match self.remaining().iter().position(|&b| b == byte) {
            Some(pos) => {
                self.recv_idx += pos + 1;
                Ok(WaitResult::Ready)
            }
            None => Ok(WaitResult::Timeout),
        }
    }

    fn wait_readable(&mut self, _deadline: Deadline) -> io::Result<WaitResult> {
        if self.remaining().is_empty() {
            Ok(WaitResult::Timeout)
        } else {
            Ok(WaitResult::Ready)
        }
    }
}

/// Endless stream repeating `pattern`; never runs dry, so only the
/// caller's deadline can end a wait on it
pub struct EndlessPort {
    pub pattern: Vec<u8>,
    pub pos: usize,
}

impl EndlessPort {
    pub fn new(pattern: Vec<u8>) -> Self {
        assert!(!pattern.is_empty());
        Self { pattern, pos: 0 }
    }

    fn next(&mut self) -> u8 {
        let byte = self.pattern[self.pos];
        self.pos = (self.pos + 1) % self.pattern.len();
        byte
    }
}

impl Port for EndlessPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for slot in buf.iter_mut() {
            *slot = self.next();
        }
        Ok(buf.len())
    }

    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult> {
        if !self.pattern.contains(&byte) {
            std::thread::sleep(deadline.remaining());
            return Ok(WaitResult::Timeout);
        }
        while self.next() != byte {}
        Ok(WaitResult::Ready)
    }

    fn wait_readable(&mut self, _deadline: Deadline) -> io::Result<WaitResult> {
        Ok(WaitResult::Ready)
    }
}

/// Wraps a port whose transmit buffer is full for the first `busy_writes`
/// write attempts
pub struct BusyPort<P> {
    pub inner: P,
    pub busy_writes: usize,
}

impl<P: Port> BusyPort<P> {
    pub fn new(inner: P, busy_writes: usize) -> Self {
        Self { inner, busy_writes }
    }
}

impl<P: Port> Port for BusyPort<P> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.busy_writes > 0 {
            self.busy_writes -= 1;
            return Ok(0);
        }
        self.inner.write(data)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_available(buf)
    }

    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult> {
        self.inner.wait_for_byte(byte, deadline)
    }

    fn wait_readable(&mut self, deadline: Deadline) -> io::Result<WaitResult> {
        self.inner.wait_readable(deadline)
    }
}

/// Wire image of an ACK/NACK frame echoing `echoed`
pub fn reply_frame(message_type: MessageType, sequence_number: u16, echoed: &[u8]) -> Vec<u8> {
    Frame::new(sequence_number, message_type, echoed.to_vec(), &Crc16Ccitt)
        .expect("valid frame")
        .encode()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
