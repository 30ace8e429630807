// src/io/serial/connection.rs
//
// Connection manager. Owns the single active serial connection, runs its
// reader on the blocking pool and reports open/data/error/close events to
// the controller over a channel.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::backend::SerialBackend;
use super::utils::{BaudRate, LineConfig, Parity};
use crate::error::{MonitorError, Result};

/// Bytes are batched into a single `Data` event at most this often
const EMIT_INTERVAL: Duration = Duration::from_millis(25);

/// How long `send` waits for the reader thread to report the write result
const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

/// Identifies one Connect call. Events from older ids are stale.
pub type ConnectionId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { port: String, baud_rate: BaudRate },
    Connected { port: String, baud_rate: BaudRate },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by Disconnect or controller teardown
    Requested,
    /// Open failed or the link died
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Opened,
    Data(Vec<u8>),
    Error(String),
    Closed(CloseReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub id: ConnectionId,
    pub kind: ConnectionEventKind,
}

pub type ConnectionEventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Write request handed to the reader thread, which owns the link
struct TransmitRequest {
    data: Vec<u8>,
    result_tx: oneshot::Sender<std::io::Result<()>>,
}

/// Data bits, stop bits and parity applied to every connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSettings {
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

struct ActiveConnection {
    id: ConnectionId,
    port: String,
    cancel_flag: Arc<AtomicBool>,
    transmit_tx: std_mpsc::SyncSender<TransmitRequest>,
    task_handle: JoinHandle<()>,
}

// ============================================================================
// Connection Manager
// ============================================================================

pub struct ConnectionManager {
    backend: Arc<dyn SerialBackend>,
    events_tx: ConnectionEventSender,
    line: LineSettings,
    state: ConnectionState,
    active: Option<ActiveConnection>,
    last_id: ConnectionId,
    /// Id whose events are still applied; `None` once disconnected
    current: Option<ConnectionId>,
    /// Reader abandoned while its open was still pending
    retiring: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn SerialBackend>, events_tx: ConnectionEventSender) -> Self {
        Self {
            backend,
            events_tx,
            line: LineSettings::default(),
            state: ConnectionState::Disconnected,
            active: None,
            last_id: 0,
            current: None,
            retiring: None,
        }
    }

    pub fn with_line_settings(mut self, line: LineSettings) -> Self {
        self.line = line;
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == ConnectionState::Disconnected
    }

    /// Start opening `port`. The result arrives later as `Opened`, or as
    /// `Error` followed by `Closed(Failed)`.
    ///
    /// A second Connect while Connecting or Connected is rejected.
    pub fn connect(&mut self, port: &str, baud_rate: BaudRate) -> Result<ConnectionId> {
        if let Some(active) = &self.active {
            return Err(MonitorError::AlreadyConnected(active.port.clone()));
        }
        match &self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting { port, .. } | ConnectionState::Connected { port, .. } => {
                return Err(MonitorError::AlreadyConnected(port.clone()));
            }
        }
        if port.is_empty() {
            return Err(MonitorError::NoPortSelected);
        }

        self.last_id += 1;
        let id = self.last_id;

        let config = LineConfig {
            data_bits: self.line.data_bits,
            stop_bits: self.line.stop_bits,
            parity: self.line.parity,
            ..LineConfig::new(port, baud_rate)
        };

        let cancel_flag = Arc::new(AtomicBool::new(false));
        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel::<TransmitRequest>(32);

        let task_handle = spawn_reader(
            self.retiring.take(),
            self.backend.clone(),
            id,
            config,
            cancel_flag.clone(),
            transmit_rx,
            self.events_tx.clone(),
        );

        tracing::info!("[serial:{}] Connecting to {} at {} baud", id, port, baud_rate);

        self.active = Some(ActiveConnection {
            id,
            port: port.to_string(),
            cancel_flag,
            transmit_tx,
            task_handle,
        });
        self.current = Some(id);
        self.state = ConnectionState::Connecting {
            port: port.to_string(),
            baud_rate,
        };
        Ok(id)
    }

    /// Close the active connection. A no-op when nothing is open.
    ///
    /// An open connection is released before this returns. An open that is
    /// still pending is abandoned without waiting: its reader drops the link
    /// as soon as the OS call returns, and the next Connect waits for that
    /// before opening.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            tracing::debug!("[serial] Disconnect with no active connection");
            return Ok(());
        };

        active.cancel_flag.store(true, Ordering::Relaxed);
        drop(active.transmit_tx);
        self.current = None;
        let opening = matches!(self.state, ConnectionState::Connecting { .. });
        self.state = ConnectionState::Disconnected;

        if opening {
            tracing::info!("[serial:{}] Abandoning pending open of {}", active.id, active.port);
            self.retiring = Some(active.task_handle);
            return Ok(());
        }

        tracing::info!("[serial:{}] Disconnecting from {}", active.id, active.port);
        active.task_handle.await?;
        Ok(())
    }

    /// Write bytes to the open port
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let active = match (&self.state, &self.active) {
            (ConnectionState::Connected { .. }, Some(active)) => active,
            _ => return Err(MonitorError::NotConnected),
        };
        if data.is_empty() {
            return Ok(());
        }

        let (result_tx, result_rx) = oneshot::channel();
        active
            .transmit_tx
            .try_send(TransmitRequest {
                data: data.to_vec(),
                result_tx,
            })
            .map_err(|_| MonitorError::NotConnected)?;

        match tokio::time::timeout(TRANSMIT_TIMEOUT, result_rx).await {
            Ok(Ok(result)) => result.map_err(MonitorError::from),
            Ok(Err(_)) => Err(MonitorError::NotConnected),
            Err(_) => Err(MonitorError::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                "transmit timed out",
            ))),
        }
    }

    /// Apply a reader event to the state machine. Returns the event kind
    /// when it belongs to the current connection, `None` when stale.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> Option<ConnectionEventKind> {
        if self.current != Some(event.id) {
            tracing::debug!(
                "[serial:{}] Ignoring stale event (current connection is {:?})",
                event.id,
                self.current
            );
            return None;
        }

        match &event.kind {
            ConnectionEventKind::Opened => {
                if let ConnectionState::Connecting { port, baud_rate } = &self.state {
                    self.state = ConnectionState::Connected {
                        port: port.clone(),
                        baud_rate: *baud_rate,
                    };
                }
            }
            ConnectionEventKind::Closed(_) => {
                self.state = ConnectionState::Disconnected;
                self.current = None;
                // The reader has already dropped its link; the task is finishing.
                if self.active.as_ref().is_some_and(|a| a.id == event.id) {
                    self.active = None;
                }
            }
            ConnectionEventKind::Data(_) | ConnectionEventKind::Error(_) => {}
        }
        Some(event.kind)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Spawn the reader task. Blocking serial I/O runs in a dedicated thread.
/// A `previous` reader still finishing an abandoned open is awaited first so
/// two links are never held at once.
fn spawn_reader(
    previous: Option<JoinHandle<()>>,
    backend: Arc<dyn SerialBackend>,
    id: ConnectionId,
    config: LineConfig,
    cancel_flag: Arc<AtomicBool>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
    events_tx: ConnectionEventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(previous) = previous {
            tracing::debug!("[serial:{}] Waiting for abandoned open to finish", id);
            let _ = previous.await;
        }
        let events_for_panic = events_tx.clone();

        let result = tokio::task::spawn_blocking(move || {
            run_reader_blocking(backend, id, config, cancel_flag, transmit_rx, events_tx)
        })
        .await;

        if let Err(e) = result {
            tracing::error!("[serial:{}] Reader task panicked: {:?}", id, e);
            let _ = events_for_panic.send(ConnectionEvent {
                id,
                kind: ConnectionEventKind::Error(format!("Reader task failed: {}", e)),
            });
            let _ = events_for_panic.send(ConnectionEvent {
                id,
                kind: ConnectionEventKind::Closed(CloseReason::Failed),
            });
        }
    })
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Open the port, then read until cancelled or the link fails.
/// Always finishes with exactly one `Closed` event, sent after the link
/// has been dropped.
fn run_reader_blocking(
    backend: Arc<dyn SerialBackend>,
    id: ConnectionId,
    config: LineConfig,
    cancel_flag: Arc<AtomicBool>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
    events_tx: ConnectionEventSender,
) {
    let emit = |kind: ConnectionEventKind| {
        let _ = events_tx.send(ConnectionEvent { id, kind });
    };

    if cancel_flag.load(Ordering::Relaxed) {
        emit(ConnectionEventKind::Closed(CloseReason::Requested));
        return;
    }

    let mut link = match backend.open(&config) {
        Ok(link) => link,
        Err(e) => {
            tracing::error!("[serial:{}] {}", id, e);
            emit(ConnectionEventKind::Error(e.to_string()));
            emit(ConnectionEventKind::Closed(CloseReason::Failed));
            return;
        }
    };

    if cancel_flag.load(Ordering::Relaxed) {
        drop(link);
        tracing::info!("[serial:{}] Open of {} finished after cancel, released", id, config.port);
        emit(ConnectionEventKind::Closed(CloseReason::Requested));
        return;
    }

    tracing::info!(
        "[serial:{}] Opened {} at {} baud ({})",
        id,
        config.port,
        config.baud_rate,
        config.framing_summary()
    );
    emit(ConnectionEventKind::Opened);

    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::with_capacity(256);
    let mut last_emit = Instant::now();
    let mut total_bytes: u64 = 0;
    let reason;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            reason = CloseReason::Requested;
            break;
        }
        if events_tx.is_closed() {
            tracing::debug!("[serial:{}] Event receiver gone, stopping", id);
            reason = CloseReason::Requested;
            break;
        }

        // Process pending transmit requests (non-blocking)
        while let Ok(req) = transmit_rx.try_recv() {
            let result = link.write_all(&req.data).and_then(|_| link.flush());
            if let Err(e) = &result {
                tracing::warn!("[serial:{}] Write error: {}", id, e);
            }
            let _ = req.result_tx.send(result);
        }

        match link.read(&mut buf) {
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                total_bytes += n as u64;
            }
            Err(e) if is_transient(e.kind()) => {}
            Err(e) => {
                tracing::error!("[serial:{}] Read error on {}: {}", id, config.port, e);
                if !pending.is_empty() {
                    emit(ConnectionEventKind::Data(std::mem::take(&mut pending)));
                }
                emit(ConnectionEventKind::Error(format!(
                    "Read error on {}: {}",
                    config.port, e
                )));
                reason = CloseReason::Failed;
                break;
            }
        }

        if !pending.is_empty() && last_emit.elapsed() >= EMIT_INTERVAL {
            emit(ConnectionEventKind::Data(std::mem::take(&mut pending)));
            last_emit = Instant::now();
        }
    }

    if !pending.is_empty() {
        emit(ConnectionEventKind::Data(pending));
    }
    drop(link);

    tracing::info!(
        "[serial:{}] Closed {} ({:?}, {} bytes read)",
        id,
        config.port,
        reason,
        total_bytes
    );
    emit(ConnectionEventKind::Closed(reason));
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::mock::MockBackend;
    use crate::io::serial::ports::PortDescriptor;

    const WAIT: Duration = Duration::from_secs(5);

    fn manager_with(
        backend: Arc<MockBackend>,
    ) -> (ConnectionManager, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(backend, tx), rx)
    }

    fn backend() -> Arc<MockBackend> {
        Arc::new(MockBackend::with_ports(vec![PortDescriptor::new(
            "/dev/ttyUSB0",
            Some("Acme"),
        )]))
    }

    /// Receive and apply events until one matches `pred`
    async fn pump_until(
        manager: &mut ConnectionManager,
        rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
        mut pred: impl FnMut(&ConnectionEventKind) -> bool,
    ) -> Vec<ConnectionEventKind> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(WAIT, rx.recv())
                .await
                .expect("timed out waiting for connection event")
                .expect("event channel closed");
            if let Some(kind) = manager.handle_event(event) {
                let done = pred(&kind);
                seen.push(kind);
                if done {
                    return seen;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_connect_opens_and_streams_bytes_in_order() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        assert!(matches!(manager.state(), ConnectionState::Connecting { .. }));

        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
        assert_eq!(
            *manager.state(),
            ConnectionState::Connected {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: BaudRate::B9600
            }
        );

        let link = backend.link().unwrap();
        link.push(b"AB");
        link.push(b"CD");

        let mut received = Vec::new();
        pump_until(&mut manager, &mut rx, |k| {
            if let ConnectionEventKind::Data(bytes) = k {
                received.extend_from_slice(bytes);
            }
            received.len() >= 4
        })
        .await;
        assert_eq!(received, b"ABCD");

        manager.disconnect().await.unwrap();
        assert!(manager.is_disconnected());
        assert_eq!(backend.live_links(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let (mut manager, _rx) = manager_with(backend());
        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();
        assert!(manager.is_disconnected());
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        let err = manager.connect("/dev/ttyUSB0", BaudRate::B115200).unwrap_err();
        assert!(matches!(err, MonitorError::AlreadyConnected(p) if p == "/dev/ttyUSB0"));

        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
        assert!(manager.connect("/dev/ttyUSB0", BaudRate::B9600).is_err());
        assert_eq!(backend.opens(), 1);

        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_cycles_keep_one_open_link() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        for _ in 0..5 {
            manager.connect("/dev/ttyUSB0", BaudRate::B19200).unwrap();
            pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
            assert_eq!(backend.live_links(), 1);

            manager.disconnect().await.unwrap();
            assert_eq!(backend.live_links(), 0);
        }
        assert_eq!(backend.opens(), 5);
    }

    #[tokio::test]
    async fn test_open_failure_returns_to_disconnected() {
        let backend = backend();
        backend.set_fail_open(true);
        let (mut manager, mut rx) = manager_with(backend.clone());

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        let seen = pump_until(&mut manager, &mut rx, |k| {
            matches!(k, ConnectionEventKind::Closed(_))
        })
        .await;

        assert!(matches!(seen[0], ConnectionEventKind::Error(_)));
        assert_eq!(
            seen.last(),
            Some(&ConnectionEventKind::Closed(CloseReason::Failed))
        );
        assert!(manager.is_disconnected());

        // A fresh connect is allowed after the failure
        backend.set_fail_open(false);
        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_error_closes_connection() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;

        backend.link().unwrap().fail(ErrorKind::BrokenPipe);
        let seen = pump_until(&mut manager, &mut rx, |k| {
            matches!(k, ConnectionEventKind::Closed(_))
        })
        .await;

        assert!(seen.iter().any(|k| matches!(k, ConnectionEventKind::Error(_))));
        assert!(manager.is_disconnected());
        assert_eq!(backend.live_links(), 0);

        // Disconnect after a fatal error is still a no-op
        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let (mut manager, _rx) = manager_with(backend());
        let stale = ConnectionEvent {
            id: 42,
            kind: ConnectionEventKind::Closed(CloseReason::Failed),
        };
        assert_eq!(manager.handle_event(stale), None);
    }

    #[tokio::test]
    async fn test_send_writes_to_link() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        assert!(matches!(
            manager.send(b"hi").await,
            Err(MonitorError::NotConnected)
        ));

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;

        manager.send(b"hello\n").await.unwrap();
        assert_eq!(backend.link().unwrap().written(), b"hello\n");

        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_during_slow_open_returns_immediately() {
        let backend = backend();
        backend.set_open_delay(Duration::from_secs(1));
        let (mut manager, mut rx) = manager_with(backend.clone());

        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        assert!(matches!(manager.state(), ConnectionState::Connecting { .. }));

        tokio::time::timeout(Duration::from_millis(500), manager.disconnect())
            .await
            .expect("disconnect waited on the pending open")
            .unwrap();
        assert!(manager.is_disconnected());

        // The next open waits for the abandoned one to release its link
        backend.set_open_delay(Duration::ZERO);
        manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        let seen = pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
        assert_eq!(seen, vec![ConnectionEventKind::Opened]);
        assert_eq!(backend.opens(), 2);
        assert_eq!(backend.live_links(), 1);

        manager.disconnect().await.unwrap();
        assert_eq!(backend.live_links(), 0);
    }

    #[tokio::test]
    async fn test_events_after_disconnect_are_stale() {
        let backend = backend();
        let (mut manager, mut rx) = manager_with(backend.clone());

        let id = manager.connect("/dev/ttyUSB0", BaudRate::B9600).unwrap();
        pump_until(&mut manager, &mut rx, |k| *k == ConnectionEventKind::Opened).await;
        manager.disconnect().await.unwrap();

        let late = ConnectionEvent {
            id,
            kind: ConnectionEventKind::Data(b"late".to_vec()),
        };
        assert_eq!(manager.handle_event(late), None);
    }

    #[tokio::test]
    async fn test_empty_port_is_rejected() {
        let (mut manager, _rx) = manager_with(backend());
        assert!(matches!(
            manager.connect("", BaudRate::B9600),
            Err(MonitorError::NoPortSelected)
        ));
        assert!(manager.is_disconnected());
    }
}
