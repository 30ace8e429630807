// src/io/serial/ports.rs
//
// Serial port enumeration. Converts the serialport crate's port info into
// the descriptors shown by the port selection control.

use serde::Serialize;
use serialport::SerialPortType;

use crate::error::{MonitorError, Result};

/// Information about an available serial port
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortDescriptor {
    pub path: String,
    pub manufacturer: Option<String>,
    pub port_type: String,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortDescriptor {
    /// Descriptor with only a path and manufacturer, as reported by hosts
    /// that expose nothing else.
    pub fn new(path: impl Into<String>, manufacturer: Option<&str>) -> Self {
        Self {
            path: path.into(),
            manufacturer: manufacturer.map(str::to_string),
            port_type: "Unknown".to_string(),
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Option label: "<path> - <manufacturer>"
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.path,
            self.manufacturer.as_deref().unwrap_or("Unknown")
        )
    }
}

impl From<serialport::SerialPortInfo> for PortDescriptor {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
            SerialPortType::UsbPort(info) => (
                "USB".to_string(),
                info.manufacturer,
                info.product,
                info.serial_number,
                Some(info.vid),
                Some(info.pid),
            ),
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None, None, None),
            SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
            SerialPortType::Unknown => ("Unknown".to_string(), None, None, None, None, None),
        };
        PortDescriptor {
            path: p.port_name,
            manufacturer,
            port_type,
            product,
            serial_number,
            vid,
            pid,
        }
    }
}

/// Whether a port should be offered to the user.
///
/// On macOS only /dev/cu.* (calling unit) devices are shown. The /dev/tty.*
/// twins block on open waiting for carrier detect.
pub fn is_listable(path: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        !path.starts_with("/dev/tty.")
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = path;
        true
    }
}

/// List available serial ports on this host
pub fn list_serial_ports() -> Result<Vec<PortDescriptor>> {
    let ports = serialport::available_ports().map_err(MonitorError::Enumerate)?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listable(&p.port_name))
        .map(PortDescriptor::from)
        .collect())
}

/// True when both sets hold the same descriptors, ignoring order
pub fn same_port_set(a: &[PortDescriptor], b: &[PortDescriptor]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&PortDescriptor> = a.iter().collect();
    let mut b: Vec<&PortDescriptor> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

// ============================================================================
// Tests
// ============================================================================
