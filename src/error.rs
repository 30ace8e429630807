// src/error.rs
//
// Error type shared by the discovery loop, the connection manager and settings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to enumerate ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported baud rate {0} (supported: 4800, 9600, 19200, 38400, 57600, 115200)")]
    UnsupportedBaudRate(u32),

    #[error("a connection to {0} is already active")]
    AlreadyConnected(String),

    #[error("not connected")]
    NotConnected,

    #[error("no port selected")]
    NoPortSelected,

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serial task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
