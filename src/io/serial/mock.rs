// src/io/serial/mock.rs
//
// In-memory serial backend for tests. Links count how many handles are
// alive so lifecycle tests can check nothing leaks.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::backend::{SerialBackend, SerialLink};
use super::ports::PortDescriptor;
use super::utils::LineConfig;
use crate::error::{MonitorError, Result};

enum LinkInput {
    Data(Vec<u8>),
    Fail(std::io::ErrorKind),
}

/// Test handle onto the most recently opened link
#[derive(Clone)]
pub(crate) struct LinkControl {
    tx: std_mpsc::Sender<LinkInput>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl LinkControl {
    pub fn push(&self, bytes: &[u8]) {
        let _ = self.tx.send(LinkInput::Data(bytes.to_vec()));
    }

    pub fn fail(&self, kind: std::io::ErrorKind) {
        let _ = self.tx.send(LinkInput::Fail(kind));
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

struct MockLink {
    rx: std_mpsc::Receiver<LinkInput>,
    leftover: Vec<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    live: Arc<AtomicUsize>,
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(5)) {
                Ok(LinkInput::Data(bytes)) => self.leftover = bytes,
                Ok(LinkInput::Fail(kind)) => return Err(kind.into()),
                Err(_) => return Err(std::io::ErrorKind::TimedOut.into()),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut w) = self.written.lock() {
            w.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MockBackend {
    /// `None` makes enumeration fail
    ports: Mutex<Option<Vec<PortDescriptor>>>,
    fail_open: Mutex<bool>,
    /// `open` blocks this long before returning, like a slow OS open
    open_delay: Mutex<Duration>,
    last_link: Mutex<Option<LinkControl>>,
    live: Arc<AtomicUsize>,
    opens: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MockBackend {
    pub fn with_ports(ports: Vec<PortDescriptor>) -> Self {
        let backend = Self::default();
        backend.set_ports(Some(ports));
        backend
    }

    pub fn set_ports(&self, ports: Option<Vec<PortDescriptor>>) {
        if let Ok(mut guard) = self.ports.lock() {
            *guard = ports;
        }
    }

    pub fn set_fail_open(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_open.lock() {
            *guard = fail;
        }
    }

    pub fn set_open_delay(&self, delay: Duration) {
        if let Ok(mut guard) = self.open_delay.lock() {
            *guard = delay;
        }
    }

    pub fn link(&self) -> Option<LinkControl> {
        self.last_link.lock().ok().and_then(|l| l.clone())
    }

    pub fn live_links(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl SerialBackend for MockBackend {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let ports = self.ports.lock().map(|p| p.clone()).unwrap_or_default();
        ports.ok_or_else(|| {
            MonitorError::Enumerate(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "enumeration unavailable",
            ))
        })
    }

    fn open(&self, config: &LineConfig) -> Result<Box<dyn SerialLink>> {
        let delay = self.open_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.fail_open.lock().map(|f| *f).unwrap_or(false) {
            return Err(MonitorError::Open {
                path: config.port.clone(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
            });
        }

        let (tx, rx) = std_mpsc::channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        if let Ok(mut guard) = self.last_link.lock() {
            *guard = Some(LinkControl {
                tx,
                written: written.clone(),
            });
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockLink {
            rx,
            leftover: Vec::new(),
            written,
            live: self.live.clone(),
        }))
    }
}
