// src/io/discovery.rs
//
// Port discovery loop. Lists the host's serial ports, hands the result to
// the controller, then sleeps for the poll interval before the next run.
// The interval is measured from the end of one run, so a slow enumeration
// delays the next one rather than overlapping it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use super::serial::{PortDescriptor, SerialBackend};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Result of one discovery cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Ports(Vec<PortDescriptor>),
    Failed(String),
}

/// Cancellation handle for a running discovery loop. Dropping it also stops
/// the loop.
pub struct DiscoveryHandle {
    cancel_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl DiscoveryHandle {
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.wake.notify_one();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }
}

/// Start polling `backend` for ports. The first cycle runs immediately.
pub fn spawn_discovery(
    backend: Arc<dyn SerialBackend>,
    interval: Duration,
    events_tx: mpsc::UnboundedSender<DiscoveryEvent>,
) -> DiscoveryHandle {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());

    let cancel = cancel_flag.clone();
    let wake_rx = wake.clone();

    let task_handle = tokio::spawn(async move {
        tracing::info!("[discovery] Polling for ports every {:?}", interval);
        let mut cycles: u64 = 0;

        while !cancel.load(Ordering::Relaxed) {
            let backend = backend.clone();
            let result = tokio::task::spawn_blocking(move || backend.list_ports()).await;
            cycles += 1;

            let event = match result {
                Ok(Ok(ports)) => DiscoveryEvent::Ports(ports),
                Ok(Err(e)) => {
                    tracing::warn!("[discovery] {}", e);
                    DiscoveryEvent::Failed(e.to_string())
                }
                Err(e) => {
                    tracing::error!("[discovery] Enumeration task failed: {}", e);
                    DiscoveryEvent::Failed(format!("Enumeration task failed: {}", e))
                }
            };

            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if events_tx.send(event).is_err() {
                tracing::debug!("[discovery] Receiver gone, stopping");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake_rx.notified() => {}
            }
        }

        tracing::info!("[discovery] Stopped after {} cycles", cycles);
    });

    DiscoveryHandle {
        cancel_flag,
        wake,
        task_handle: Some(task_handle),
    }
}

// ============================================================================
// Tests
// ============================================================================
