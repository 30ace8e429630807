// src/session.rs
//
// Monitor session: all state behind the UI surface, owned by the controller.
// Holds the port and baud selections, the connection manager, the display
// buffer and the notice text, and applies discovery and connection events
// to them.

use crate::display::DisplayBuffer;
use crate::error::{MonitorError, Result};
use crate::io::discovery::DiscoveryEvent;
use crate::io::serial::{
    BaudRate, CloseReason, ConnectionEvent, ConnectionEventKind, ConnectionId, ConnectionManager,
    ConnectionState,
};
use crate::port_select::{notice_for, PortSelector, RefreshOutcome};
use crate::settings::LineEnding;

pub struct MonitorSession {
    ports: PortSelector,
    baud_rate: BaudRate,
    connection: ConnectionManager,
    display: DisplayBuffer,
    notice: Option<String>,
    last_error: Option<String>,
}

impl MonitorSession {
    pub fn new(connection: ConnectionManager, display: DisplayBuffer) -> Self {
        Self {
            ports: PortSelector::new(),
            baud_rate: BaudRate::default(),
            connection,
            display,
            notice: None,
            last_error: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: BaudRate) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn ports(&self) -> &PortSelector {
        &self.ports
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayBuffer {
        &mut self.display
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn connect_enabled(&self) -> bool {
        self.connection.is_disconnected()
    }

    pub fn disconnect_enabled(&self) -> bool {
        !self.connection.is_disconnected()
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn select_port(&mut self, path: &str) -> bool {
        self.ports.select(path)
    }

    pub fn select_next_port(&mut self) {
        self.ports.select_next();
    }

    pub fn select_prev_port(&mut self) {
        self.ports.select_prev();
    }

    /// Takes effect on the next Connect
    pub fn select_baud(&mut self, baud_rate: BaudRate) {
        self.baud_rate = baud_rate;
    }

    pub fn select_next_baud(&mut self) {
        self.baud_rate = self.baud_rate.next();
    }

    pub fn select_prev_baud(&mut self) {
        self.baud_rate = self.baud_rate.prev();
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Apply one discovery cycle. A failed enumeration counts as an empty set.
    pub fn apply_discovery(&mut self, event: DiscoveryEvent) -> RefreshOutcome {
        let ports = match event {
            DiscoveryEvent::Ports(ports) => ports,
            DiscoveryEvent::Failed(e) => {
                tracing::warn!("[session] Treating failed discovery as no ports: {}", e);
                Vec::new()
            }
        };

        self.notice = notice_for(&ports).map(str::to_string);
        let outcome = self.ports.refresh(ports);
        if outcome == RefreshOutcome::Repopulated {
            tracing::info!(
                "[session] Port list changed: {} port(s), selected {:?}",
                self.ports.options().len(),
                self.ports.selected_path()
            );
        }
        outcome
    }

    pub fn apply_connection_event(&mut self, event: ConnectionEvent) {
        let Some(kind) = self.connection.handle_event(event) else {
            return;
        };

        match kind {
            ConnectionEventKind::Opened => {
                self.last_error = None;
            }
            ConnectionEventKind::Data(bytes) => {
                self.display.append(&bytes);
            }
            ConnectionEventKind::Error(message) => {
                tracing::warn!("[session] Connection error: {}", message);
                self.last_error = Some(message);
            }
            ConnectionEventKind::Closed(CloseReason::Requested) => {
                tracing::info!("[session] Connection closed");
            }
            ConnectionEventKind::Closed(CloseReason::Failed) => {
                tracing::info!("[session] Connection closed after failure");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Connect to the selected port at the selected baud rate
    pub fn connect(&mut self) -> Result<ConnectionId> {
        let result = match self.ports.selected_path() {
            Some(path) => self.connection.connect(path, self.baud_rate),
            None => Err(MonitorError::NoPortSelected),
        };
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
        result
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Err(e) = self.connection.disconnect().await {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Transmit a typed line with the configured line ending
    pub async fn send_line(&mut self, line: &str, ending: LineEnding) -> Result<()> {
        let bytes = ending.terminate(line);
        if let Err(e) = self.connection.send(&bytes).await {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
