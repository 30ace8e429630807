// src/tui/app.rs
//
// TUI controller state: the monitor session plus the send line and key
// handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::io::discovery::DiscoveryEvent;
use crate::io::serial::ConnectionEvent;
use crate::session::MonitorSession;
use crate::settings::LineEnding;

/// Lines moved by PageUp/PageDown
const PAGE_LINES: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the send line
    Editing,
}

pub struct App {
    pub session: MonitorSession,
    mode: InputMode,
    input: String,
    line_ending: LineEnding,
    /// Port requested on the command line, selected once it shows up
    preferred_port: Option<String>,
    quit: bool,
}

impl App {
    pub fn new(session: MonitorSession, line_ending: LineEnding, preferred_port: Option<String>) -> Self {
        Self {
            session,
            mode: InputMode::Normal,
            input: String::new(),
            line_ending,
            preferred_port,
            quit: false,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn on_discovery(&mut self, event: DiscoveryEvent) {
        self.session.apply_discovery(event);
        if let Some(path) = self.preferred_port.as_deref() {
            if self.session.select_port(path) {
                self.preferred_port = None;
            }
        }
    }

    pub fn on_connection(&mut self, event: ConnectionEvent) {
        self.session.apply_connection_event(event);
    }

    pub async fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        match self.mode {
            InputMode::Normal => self.handle_normal_key(key).await,
            InputMode::Editing => self.handle_editing_key(key).await,
        }
    }

    async fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.session.select_prev_port(),
            KeyCode::Down | KeyCode::Char('j') => self.session.select_next_port(),
            KeyCode::Left | KeyCode::Char('h') => self.session.select_prev_baud(),
            KeyCode::Right | KeyCode::Char('l') => self.session.select_next_baud(),
            KeyCode::Char('c') => {
                if let Err(e) = self.session.connect() {
                    tracing::warn!("[tui] Connect refused: {}", e);
                }
            }
            KeyCode::Char('d') => {
                if let Err(e) = self.session.disconnect().await {
                    tracing::error!("[tui] Disconnect failed: {}", e);
                }
            }
            KeyCode::PageUp => self.session.display_mut().scroll_up(PAGE_LINES),
            KeyCode::PageDown => self.session.display_mut().scroll_down(PAGE_LINES),
            KeyCode::End => self.session.display_mut().follow_tail(),
            KeyCode::Char('x') => self.session.display_mut().clear(),
            KeyCode::Char('i') => self.mode = InputMode::Editing,
            _ => {}
        }
    }

    async fn handle_editing_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = InputMode::Normal,
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.input);
                if let Err(e) = self.session.send_line(&line, self.line_ending).await {
                    tracing::warn!("[tui] Send failed: {}", e);
                    self.input = line;
                }
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    /// Release the connection before exit
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.session.disconnect().await {
            tracing::error!("[tui] Disconnect on exit failed: {}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
