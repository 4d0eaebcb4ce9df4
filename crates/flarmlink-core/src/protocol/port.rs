//! Byte-level port contract
//!
//! The protocol engine only talks to the transport through this trait.
//! Backends (serial, USB, Bluetooth, simulated devices) implement the four
//! primitives; the blocking helpers built on top of them are provided.

use std::io;
use std::time::Duration;

use super::{Deadline, ProtocolError};

/// Pause between retries while the transmit side accepts nothing
const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of a blocking wait on a [`Port`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The awaited condition occurred
    Ready,
    /// The deadline passed first
    Timeout,
}

/// Half-duplex byte channel to the device.
///
/// A port is single-owner: one request/reply cycle at a time. Sharing one
/// instance between threads must be serialized by the caller.
pub trait Port {
    /// Write some bytes, returning how many were accepted (possibly fewer
    /// than requested)
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever is currently available; 0 means nothing is buffered
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Block until `byte` shows up in the stream, consuming everything up
    /// to and including it. Bytes scanned before a timeout may be consumed
    /// as noise.
    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult>;

    /// Block until at least one byte can be read
    fn wait_readable(&mut self, deadline: Deadline) -> io::Result<WaitResult>;

    /// Write all of `data`, looping over short writes until the deadline.
    ///
    /// A write accepting nothing is a full transmit buffer and is retried
    /// after a short pause; only the deadline ends the loop. A backend that
    /// can never accept more reports [`io::ErrorKind::WriteZero`], which
    /// surfaces as [`ProtocolError::WriteStalled`].
    fn full_write(&mut self, data: &[u8], deadline: Deadline) -> Result<(), ProtocolError> {
        let mut written = 0;
        while written < data.len() {
            if deadline.has_expired() {
                return Err(ProtocolError::Timeout);
            }

            match self.write(&data[written..]) {
                Ok(0) => std::thread::sleep(deadline.remaining().min(WRITE_RETRY_INTERVAL)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WriteZero => {
                    return Err(ProtocolError::WriteStalled {
                        written,
                        requested: data.len(),
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Block until some bytes arrive and read them into `buf`.
    ///
    /// Returns the number of bytes read, at least 1 unless `buf` is empty.
    fn wait_and_read(
        &mut self,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize, ProtocolError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.read_available(buf)?;
            if n > 0 {
                return Ok(n);
            }

            if self.wait_readable(deadline)? == WaitResult::Timeout {
                return Err(ProtocolError::Timeout);
            }
        }
    }

    /// Block until exactly one byte can be read
    fn wait_read_byte(&mut self, deadline: Deadline) -> Result<u8, ProtocolError> {
        let mut byte = [0u8; 1];
        self.wait_and_read(&mut byte, deadline)?;
        Ok(byte[0])
    }
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }

    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult> {
        (**self).wait_for_byte(byte, deadline)
    }

    fn wait_readable(&mut self, deadline: Deadline) -> io::Result<WaitResult> {
        (**self).wait_readable(deadline)
    }
}
