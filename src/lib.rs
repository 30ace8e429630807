// src/lib.rs
//
// Serial monitor core: port discovery, the connection lifecycle and the
// session state behind the UI. The terminal UI and command line live behind
// the `cli` feature.

pub mod display;
pub mod error;
pub mod io;
pub mod logging;
pub mod port_select;
pub mod session;
pub mod settings;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod tui;

pub use error::{MonitorError, Result};

/// Parse the command line and run the selected command
#[cfg(feature = "cli")]
pub fn run() -> anyhow::Result<()> {
    cli::run()
}
