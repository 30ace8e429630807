// src/tui/mod.rs
//
// Terminal UI for the monitor. The controller loop multiplexes terminal
// input, discovery results and connection events on one task.

mod app;
mod ui;

pub use app::{App, InputMode};
pub use ui::render;

use std::sync::Arc;

use anyhow::Context;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use crate::display::DisplayBuffer;
use crate::io::discovery::{spawn_discovery, DiscoveryEvent};
use crate::io::serial::{BaudRate, ConnectionEvent, ConnectionManager, SerialBackend, SystemBackend};
use crate::session::MonitorSession;
use crate::settings::AppSettings;

/// Run the TUI until the user quits. Discovery is stopped and any open
/// connection closed before returning.
pub async fn run(settings: AppSettings, port: Option<String>, baud_rate: BaudRate) -> anyhow::Result<()> {
    let backend: Arc<dyn SerialBackend> = Arc::new(SystemBackend);
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    let (disc_tx, mut disc_rx) = mpsc::unbounded_channel();

    let manager = ConnectionManager::new(backend.clone(), conn_tx)
        .with_line_settings(settings.line_settings());
    let session = MonitorSession::new(manager, DisplayBuffer::new(settings.scrollback_bytes))
        .with_baud_rate(baud_rate);
    let mut app = App::new(session, settings.line_ending, port);

    let discovery = spawn_discovery(backend, settings.poll_interval(), disc_tx);

    let mut terminal = ratatui::try_init().context("Failed to initialise terminal")?;
    let result = event_loop(&mut terminal, &mut app, &mut conn_rx, &mut disc_rx).await;
    ratatui::restore();

    discovery.stop().await;
    app.shutdown().await;
    tracing::info!("[tui] Exited");
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    conn_rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    disc_rx: &mut mpsc::UnboundedReceiver<DiscoveryEvent>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();

    while !app.should_quit() {
        terminal.draw(|frame| render(frame, app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Terminal input failed"),
                None => break,
            },
            Some(event) = disc_rx.recv() => app.on_discovery(event),
            Some(event) = conn_rx.recv() => app.on_connection(event),
            else => break,
        }
    }
    Ok(())
}
