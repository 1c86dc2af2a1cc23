//! Serial port link backed by the `serialport` crate
//!
//! Reads are served from a small read-ahead buffer so that pulling one byte
//! at a time does not cost one system call per byte.

use super::{DeviceHandle, DeviceLink};
use crate::config::DeviceConfig;
use crate::error::{BridgeError, ConnectionError, ReadError, Result};
use serde::Serialize;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::Read;
use std::time::Duration;

/// Timeout used for each underlying read when the caller asked to block
/// indefinitely; the read is simply retried when it expires
const BLOCKING_SLICE: Duration = Duration::from_secs(1);

/// Size of the read-ahead buffer
const READ_AHEAD: usize = 256;

/// Information about an available serial port
#[derive(Debug, Clone, Serialize)]
pub struct PortSummary {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl std::fmt::Display for PortSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.port_name, self.port_type)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " {:04x}:{:04x}", vid, pid)?;
        }
        if let Some(ref product) = self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// List serial ports available on this host
pub fn list_ports() -> Result<Vec<PortSummary>> {
    let ports = serialport::available_ports()
        .map_err(|e| BridgeError::Config(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let mut summary = PortSummary {
                port_name: p.port_name,
                port_type: String::new(),
                manufacturer: None,
                product: None,
                serial_number: None,
                vid: None,
                pid: None,
            };
            summary.port_type = match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    summary.manufacturer = usb.manufacturer;
                    summary.product = usb.product;
                    summary.serial_number = usb.serial_number;
                    summary.vid = Some(usb.vid);
                    summary.pid = Some(usb.pid);
                    "USB".to_string()
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "Unknown".to_string(),
            };
            summary
        })
        .collect())
}

/// A [`DeviceLink`] over a real serial port
pub struct SerialLink {
    /// Line settings (data bits, parity, stop bits)
    settings: DeviceConfig,
    port: Option<Box<dyn SerialPort>>,
    handle: Option<DeviceHandle>,
    /// Timeout currently programmed into the port
    timeout: Option<Duration>,
    buf: [u8; READ_AHEAD],
    pos: usize,
    len: usize,
}

impl SerialLink {
    /// Create a closed link that will use the line settings in `settings`
    ///
    /// The port and baud rate come from [`DeviceLink::open`].
    pub fn new(settings: DeviceConfig) -> Self {
        Self {
            settings,
            port: None,
            handle: None,
            timeout: None,
            buf: [0; READ_AHEAD],
            pos: 0,
            len: 0,
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::result::Result<(), ReadError> {
        if self.timeout == Some(timeout) {
            return Ok(());
        }
        let port = self.port.as_mut().ok_or(ReadError::Closed)?;
        port.set_timeout(timeout).map_err(|e| {
            tracing::debug!("Failed to set read timeout: {}", e);
            ReadError::Closed
        })?;
        self.timeout = Some(timeout);
        Ok(())
    }

    /// Refill the read-ahead buffer with one read
    fn fill(&mut self, timeout: Duration) -> std::result::Result<(), ReadError> {
        self.set_timeout(timeout)?;
        let port = self.port.as_mut().ok_or(ReadError::Closed)?;
        match port.read(&mut self.buf) {
            // End of stream on a serial device means it went away
            Ok(0) => Err(ReadError::Closed),
            Ok(n) => {
                self.pos = 0;
                self.len = n;
                Ok(())
            }
            Err(e) => Err(ReadError::from_io(&e)),
        }
    }

    /// Close after an I/O fault and pass the error on
    fn fault(&mut self, err: ReadError) -> ReadError {
        if err == ReadError::Closed {
            tracing::debug!("Serial read failed, closing port");
            self.close();
        }
        err
    }
}

impl DeviceLink for SerialLink {
    fn open(&mut self, port: &str, baud_rate: u32) -> std::result::Result<(), ConnectionError> {
        self.close();

        let opened = serialport::new(port, baud_rate)
            .data_bits(self.settings.serial_data_bits())
            .parity(self.settings.parity.into())
            .stop_bits(self.settings.serial_stop_bits())
            .timeout(BLOCKING_SLICE)
            .open()
            .map_err(|e| ConnectionError::new(port, e.to_string()))?;

        self.port = Some(opened);
        self.timeout = Some(BLOCKING_SLICE);
        self.handle = Some(DeviceHandle {
            port: port.to_string(),
            baud_rate,
            open: true,
        });
        tracing::debug!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(())
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> std::result::Result<u8, ReadError> {
        if self.pos < self.len {
            let byte = self.buf[self.pos];
            self.pos += 1;
            return Ok(byte);
        }
        if self.port.is_none() {
            return Err(ReadError::Closed);
        }

        loop {
            match self.fill(timeout.unwrap_or(BLOCKING_SLICE)) {
                Ok(()) => break,
                Err(ReadError::TimedOut) if timeout.is_none() => continue,
                Err(e) => return Err(self.fault(e)),
            }
        }

        let byte = self.buf[0];
        self.pos = 1;
        Ok(byte)
    }

    fn flush_input(&mut self) -> std::result::Result<(), ReadError> {
        self.pos = 0;
        self.len = 0;
        let port = self.port.as_mut().ok_or(ReadError::Closed)?;
        if let Err(e) = port.clear(ClearBuffer::Input) {
            tracing::debug!("Failed to clear input buffer: {}", e);
            return Err(self.fault(ReadError::Closed));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.pos = 0;
        self.len = 0;
        self.timeout = None;
        if self.port.take().is_some() {
            if let Some(ref mut handle) = self.handle {
                handle.open = false;
                tracing::debug!("Closed serial port {}", handle.port);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn handle(&self) -> Option<DeviceHandle> {
        self.handle.clone()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
