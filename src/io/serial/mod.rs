// src/io/serial/mod.rs
//
// Serial port driver for the monitor.
//
// Features:
// - Port enumeration (path, manufacturer and USB details)
// - A single managed connection with a background reader
// - Raw byte streaming to the controller, plus transmit

pub mod backend;
pub mod connection;
pub mod ports;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{SerialBackend, SerialLink, SystemBackend};
pub use connection::{
    CloseReason, ConnectionEvent, ConnectionEventKind, ConnectionId, ConnectionManager,
    ConnectionState, LineSettings,
};
pub use ports::{list_serial_ports, PortDescriptor};
pub use utils::{BaudRate, LineConfig, Parity};
