// src/io/serial/backend.rs
//
// Host serial I/O provider. The discovery loop and connection manager only
// talk to the host through `SerialBackend`, which keeps them testable
// without hardware.

use std::io::{Read, Write};
use std::time::Duration;

use super::ports::{list_serial_ports, PortDescriptor};
use super::utils::{to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, LineConfig};
use crate::error::{MonitorError, Result};

/// Read timeout for open links. Short so the reader notices cancellation quickly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// An open serial connection
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}

pub trait SerialBackend: Send + Sync + 'static {
    /// Enumerate currently attached serial devices
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open a connection. Reads on the returned link must time out rather
    /// than block indefinitely.
    fn open(&self, config: &LineConfig) -> Result<Box<dyn SerialLink>>;
}

/// Backend over the host's real serial ports
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBackend;

/// Wrapper giving a `serialport` handle the `SerialLink` shape
struct PortLink(Box<dyn serialport::SerialPort>);

impl Read for PortLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl SerialBackend for SystemBackend {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        list_serial_ports()
    }

    fn open(&self, config: &LineConfig) -> Result<Box<dyn SerialLink>> {
        let port = serialport::new(&config.port, config.baud_rate.as_u32())
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(config.parity))
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| MonitorError::Open {
                path: config.port.clone(),
                source,
            })?;
        Ok(Box::new(PortLink(port)))
    }
}
