//! Serial port handling
//!
//! Implements the [`Port`] contract on top of the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{Deadline, DumpPort, Port, ProtocolError, Session, WaitResult};
use crate::config::LinkConfig;

/// Upper bound for a single blocking poll, so deadlines are checked often
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self {
                name: info.port_name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }
}

/// List available serial ports, sorted by name
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    ports
}

/// Serial connection to a transponder (8N1, no flow control)
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
    /// Byte picked up by a blocking [`Port::wait_readable`]
    peeked: Option<u8>,
}

impl SerialLink {
    /// Open and configure a serial port
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        let port = serialport::new(name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
                _ => ProtocolError::SerialError(e.to_string()),
            })?;

        tracing::debug!("opened {name} at {baud_rate} baud");
        Ok(Self {
            port,
            name: name.to_string(),
            peeked: None,
        })
    }

    /// Wrap a port that is already open and configured
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        let name = port.name().unwrap_or_default();
        Self {
            port,
            name,
            peeked: None,
        }
    }

    /// Port name this link was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current baud rate
    pub fn baud_rate(&self) -> Result<u32, ProtocolError> {
        self.port
            .baud_rate()
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    /// Change the baud rate, e.g. after the device acknowledged SETBAUDRATE
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    /// Drop everything buffered in either direction
    pub fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.peeked = None;
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    fn poll_timeout(deadline: Deadline) -> Duration {
        deadline
            .remaining()
            .min(POLL_INTERVAL)
            .max(Duration::from_millis(1))
    }
}

impl Port for SerialLink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.port.write(data) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            result => result,
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut n = 0;
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            n = 1;
        }

        let available = self.port.bytes_to_read()? as usize;
        let wanted = available.min(buf.len() - n);
        if wanted > 0 {
            n += self.port.read(&mut buf[n..n + wanted])?;
        }
        Ok(n)
    }

    // Bytes preceding the wanted one are noise and are dropped as they are
    // scanned, also when the deadline passes first.
    fn wait_for_byte(&mut self, byte: u8, deadline: Deadline) -> io::Result<WaitResult> {
        if self.peeked.take() == Some(byte) {
            return Ok(WaitResult::Ready);
        }

        let mut b = [0u8; 1];
        while !deadline.has_expired() {
            self.port.set_timeout(Self::poll_timeout(deadline))?;
            match self.port.read(&mut b) {
                Ok(1) if b[0] == byte => return Ok(WaitResult::Ready),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }
        Ok(WaitResult::Timeout)
    }

    // Blocks in the driver rather than polling; the byte it returns is kept
    // for the next read.
    fn wait_readable(&mut self, deadline: Deadline) -> io::Result<WaitResult> {
        if self.peeked.is_some() || self.port.bytes_to_read()? > 0 {
            return Ok(WaitResult::Ready);
        }

        let mut b = [0u8; 1];
        while !deadline.has_expired() {
            self.port.set_timeout(Self::poll_timeout(deadline))?;
            match self.port.read(&mut b) {
                Ok(1) => {
                    self.peeked = Some(b[0]);
                    return Ok(WaitResult::Ready);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }
        Ok(WaitResult::Timeout)
    }
}

/// Open the configured port and start a session on it.
///
/// The port is wrapped in a [`DumpPort`] that logs all traffic when
/// `config.dump_traffic` is set.
pub fn connect(config: &LinkConfig) -> Result<Session<DumpPort<SerialLink>>, ProtocolError> {
    let link = SerialLink::open(&config.port_name, config.baud_rate)?;
    let mut port = DumpPort::new(link);
    if config.dump_traffic {
        port.enable();
    }
    tracing::info!("connected to {}", config.port_name);
    Ok(Session::new(port))
}
