// src/tui/ui.rs
//
// Rendering. Port and baud selectors with the connect/disconnect buttons on
// top, then the notice and error lines, the data pane, the send line and key
// help.

use ratatui::layout::{Constraint, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::Frame;

use super::app::{App, InputMode};
use crate::io::serial::ConnectionState;

const HELP: &str =
    " ↑/↓ port  ←/→ baud  c connect  d disconnect  i send  PgUp/PgDn scroll  End follow  x clear  q quit";

fn button(label: &str, enabled: bool) -> Span<'static> {
    let style = if enabled {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!("[ {} ]", label), style)
}

fn state_line(state: &ConnectionState) -> Line<'static> {
    match state {
        ConnectionState::Disconnected => Line::from(Span::styled(
            "Disconnected",
            Style::default().fg(Color::Gray),
        )),
        ConnectionState::Connecting { port, baud_rate } => Line::from(Span::styled(
            format!("Connecting to {} @ {}", port, baud_rate),
            Style::default().fg(Color::Yellow),
        )),
        ConnectionState::Connected { port, baud_rate } => Line::from(Span::styled(
            format!("Connected to {} @ {}", port, baud_rate),
            Style::default().fg(Color::Green),
        )),
    }
}

pub fn render(frame: &mut Frame, app: &App) {
    let [header, notice, data, input, help] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(2),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(frame, app, header);
    render_notice(frame, app, notice);
    render_data(frame, app, data);
    render_input(frame, app, input);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        help,
    );
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let [port_area, baud_area, button_area] = Layout::horizontal([
        Constraint::Min(20),
        Constraint::Length(14),
        Constraint::Length(34),
    ])
    .areas(area);

    let ports = session.ports();
    let port_text = match ports.selected_index() {
        Some(i) => format!("{} ({}/{})", ports.options()[i].label(), i + 1, ports.options().len()),
        None => "(none)".to_string(),
    };
    frame.render_widget(
        Paragraph::new(port_text).block(Block::bordered().title(" Port ")),
        port_area,
    );

    frame.render_widget(
        Paragraph::new(session.baud_rate().label()).block(Block::bordered().title(" Baud ")),
        baud_area,
    );

    let buttons = Line::from(vec![
        button("Connect", session.connect_enabled()),
        Span::raw(" "),
        button("Disconnect", session.disconnect_enabled()),
    ]);
    frame.render_widget(
        Paragraph::new(buttons).block(Block::bordered().title(state_line(session.connection_state()))),
        button_area,
    );
}

/// Discovery notice above the last connection error. Both can be live at
/// once, e.g. a failed open followed by the port disappearing.
fn render_notice(frame: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let mut lines = Vec::with_capacity(2);
    if let Some(notice) = session.notice() {
        lines.push(Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Yellow),
        )));
    }
    if let Some(error) = session.last_error() {
        lines.push(Line::from(Span::styled(
            format!(" {}", error),
            Style::default().fg(Color::Red),
        )));
    }
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_data(frame: &mut Frame, app: &App, area: Rect) {
    let display = app.session.display();
    let height = area.height.saturating_sub(2) as usize;
    let offset = display.scroll_offset(height);

    let lines: Vec<Line> = display
        .text()
        .split('\n')
        .skip(offset)
        .take(height)
        .map(Line::raw)
        .collect();

    let title = format!(
        " Data ({} bytes){} ",
        display.total_bytes(),
        if display.is_following() { "" } else { " [scrolled]" }
    );
    frame.render_widget(Paragraph::new(lines).block(Block::bordered().title(title)), area);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let editing = app.mode() == InputMode::Editing;
    let style = if editing {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    frame.render_widget(
        Paragraph::new(app.input())
            .block(Block::bordered().title(" Send ").border_style(style)),
        area,
    );

    if editing {
        let x = area.x + 1 + app.input().chars().count() as u16;
        frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayBuffer;
    use crate::io::discovery::DiscoveryEvent;
    use crate::io::serial::mock::MockBackend;
    use crate::io::serial::{ConnectionManager, PortDescriptor};
    use crate::session::MonitorSession;
    use crate::settings::LineEnding;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    fn app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(Arc::new(MockBackend::default()), tx);
        App::new(
            MonitorSession::new(manager, DisplayBuffer::default()),
            LineEnding::Lf,
            None,
        )
    }

    #[tokio::test]
    async fn test_renders_selected_port_and_baud() {
        let mut app = app();
        app.on_discovery(DiscoveryEvent::Ports(vec![PortDescriptor::new(
            "/dev/ttyUSB0",
            Some("Acme"),
        )]));

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("/dev/ttyUSB0 - Acme (1/1)"));
        assert!(text.contains("9600 bps"));
        assert!(text.contains("Disconnected"));
        assert!(!text.contains("No ports discovered"));
    }

    #[tokio::test]
    async fn test_renders_notice_when_no_ports() {
        let mut app = app();
        app.on_discovery(DiscoveryEvent::Ports(Vec::new()));

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("No ports discovered"));
        assert!(text.contains("(none)"));
    }

    #[tokio::test]
    async fn test_notice_shown_alongside_stale_error() {
        let port = PortDescriptor::new("/dev/ttyUSB0", Some("Acme"));
        let backend = Arc::new(MockBackend::with_ports(vec![port.clone()]));
        backend.set_fail_open(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(backend, tx);
        let mut app = App::new(
            MonitorSession::new(manager, DisplayBuffer::default()),
            LineEnding::Lf,
            None,
        );

        app.on_discovery(DiscoveryEvent::Ports(vec![port]));
        app.session.connect().unwrap();
        while !app.session.connect_enabled() {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            app.on_connection(event);
        }
        app.on_discovery(DiscoveryEvent::Ports(Vec::new()));

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("No ports discovered"));
        assert!(text.contains("no such device"));
    }

    #[tokio::test]
    async fn test_data_pane_shows_newest_lines() {
        let mut app = app();
        let data: String = (0..50).map(|i| format!("line{}\n", i)).collect();
        app.session.display_mut().append(data.as_bytes());

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("line49"));
        assert!(!text.contains("line0 "));
    }
}
