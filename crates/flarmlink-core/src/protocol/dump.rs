//! Traffic dump decorator
//!
//! Wraps any [`Port`] and logs every operation plus a hex dump of the
//! bytes moved. Pure pass-through otherwise. Dumping can be switched on
//! for a limited time so a field problem can be captured without
//! flooding the log forever.

use std::fmt::Write as _;
use std::io;
use std::time::{Duration, Instant};

use super::{Deadline, Port, WaitResult};

/// Bytes per hex dump line
const DUMP_LINE_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DumpWindow {
    Off,
    Until(Instant),
    Forever,
}

/// [`Port`] decorator logging all traffic through `tracing`
pub struct DumpPort<P> {
    port: P,
    window: DumpWindow,
}

impl<P: Port> DumpPort<P> {
    /// Wrap `port` with dumping disabled
    pub fn new(port: P) -> Self {
        Self {
            port,
            window: DumpWindow::Off,
        }
    }

    /// Dump until further notice
    pub fn enable(&mut self) {
        self.window = DumpWindow::Forever;
    }

    /// Dump for `duration`, then switch off automatically
    pub fn enable_for(&mut self, duration: Duration) {
        self.window = match Instant::now().checked_add(duration) {
            Some(until) => DumpWindow::Until(until),
            None => DumpWindow::Forever,
        };
    }

    /// Stop dumping
    pub fn disable(&mut self) {
        self.window = DumpWindow::Off;
    }

    /// Check whether dumping is active, switching it off once expired
    pub fn is_enabled(&mut self) -> bool {
        match self.window {
            DumpWindow::Off => false,
            DumpWindow::Forever => true,
            DumpWindow::Until(until) => {
                if Instant::now() >= until {
                    self.window = DumpWindow::Off;
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Borrow the wrapped port
    pub fn inner(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the wrapped port
    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Unwrap the decorator
    pub fn into_inner(self) -> P {
        self.port
    }
}

/// Format `data` as hex dump lines, each starting with `prefix`
pub fn hex_dump(prefix: &str, data: &[u8]) -> Vec<String> {
    data.chunks(DUMP_LINE_WIDTH)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("{prefix}{:04x} ", i * DUMP_LINE_WIDTH);
            for byte in chunk {
                let _ = write!(line, " {byte:02x}");
            }
            for _ in chunk.len()..DUMP_LINE_WIDTH {
                line.push_str("   ");
            }
            line.push_str("  ");
            line.extend(chunk.iter().map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            }));
            line
        })
        .collect()
}

fn log_dump(prefix: &str, data: &[u8]) {
    for line in hex_dump(prefix, data) {
        tracing::debug!("{line}");
    }
}

impl<P: Port> Port for DumpPort<P> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let enabled = self.is_enabled();
        if enabled {
            tracing::debug!("Write({})", data.len());
        }

        let nbytes = match self.port.write(data) {
            Ok(n) => n,
            Err(e) => {
                if enabled {
                    tracing::debug!("Write({})=error: {e}", data.len());
                }
                return Err(e);
            }
        };

        if enabled {
            tracing::debug!("Write({})={nbytes}", data.len());
            log_dump("W ", &data[..nbytes.min(data.len())]);
        }
        Ok(nbytes)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let enabled = self.is_enabled();
        if enabled {
            tracing::debug!("Read({})", buf.len());
        }

        let nbytes = self.port.read_available(buf)?;

        if enabled {
            tracing::debug!("Read({})={nbytes}", buf.len());
            if nbytes > 0 {
                log_dump("R ", &buf[..nbytes.min(buf.len())]);
            }
        }
        Ok(nbytes)
    }

    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult> {
        let enabled = self.is_enabled();
        if enabled {
            tracing::debug!("WaitForByte({byte:#04x}) {:?}", deadline.remaining());
        }

        let result = self.port.wait_for_byte(byte, deadline);

        if enabled {
            match &result {
                Ok(outcome) => tracing::debug!("WaitForByte({byte:#04x})={outcome:?}"),
                Err(e) => tracing::debug!("WaitForByte({byte:#04x})=error: {e}"),
            }
        }
        result
    }

    fn wait_readable(&mut self, deadline: Deadline) -> io::Result<WaitResult> {
        let enabled = self.is_enabled();
        if enabled {
            tracing::debug!("WaitRead {:?}", deadline.remaining());
        }

        let result = self.port.wait_readable(deadline);

        if enabled {
            match &result {
                Ok(outcome) => tracing::debug!("WaitRead={outcome:?}"),
                Err(e) => tracing::debug!("WaitRead=error: {e}"),
            }
        }
        result
    }
}
