// src/io/mod.rs
//
// Host I/O for the monitor: the serial driver and the port discovery loop
// that feeds the port selection control.

pub mod discovery;
pub mod serial;

pub use discovery::{spawn_discovery, DiscoveryEvent, DiscoveryHandle};
pub use serial::{
    BaudRate, CloseReason, ConnectionEvent, ConnectionEventKind, ConnectionManager,
    ConnectionState, LineSettings, Parity, PortDescriptor, SerialBackend, SystemBackend,
};
