// src/cli.rs
//
// Command line entry point: argument parsing, settings and logging setup,
// and the headless `list` and `monitor` commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::io::serial::{
    BaudRate, CloseReason, ConnectionEventKind, ConnectionManager, PortDescriptor, SerialBackend,
    SystemBackend,
};
use crate::logging;
use crate::port_select::NO_PORTS_NOTICE;
use crate::settings::{default_settings_path, load_settings, AppSettings};

#[derive(Debug, Parser)]
#[command(name = "serialmon", version, about = "Watch serial ports and stream their output")]
pub struct Cli {
    /// Settings file (default: <config dir>/serialmon/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Directory for TUI log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Port discovery interval in milliseconds
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Interactive monitor (default)
    Tui {
        /// Port to select once it is discovered
        #[arg(long)]
        port: Option<String>,
        /// Initial baud rate
        #[arg(long)]
        baud: Option<u32>,
    },
    /// Print the currently attached serial ports
    List {
        #[arg(long)]
        json: bool,
    },
    /// Stream one port to stdout until Ctrl-C
    Monitor {
        #[arg(long)]
        port: String,
        #[arg(long)]
        baud: Option<u32>,
    },
}

/// Settings after command line overrides
struct ResolvedSettings {
    settings: AppSettings,
    /// Set when the file did not exist and was written with defaults
    created: Option<PathBuf>,
}

/// How long exit waits for a serial open the OS has not returned from
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

impl Cli {
    /// Load the settings file and apply command line overrides
    fn resolve_settings(&self) -> anyhow::Result<ResolvedSettings> {
        let path = self.settings.clone().unwrap_or_else(default_settings_path);
        let created = (!path.exists()).then(|| path.clone());
        let mut settings = load_settings(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(dir) = &self.log_dir {
            settings.log_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval_ms = ms;
        }
        settings.validate()?;
        Ok(ResolvedSettings { settings, created })
    }
}

/// Baud rate from the command line, else the settings default
fn resolve_baud(arg: Option<u32>, settings: &AppSettings) -> anyhow::Result<BaudRate> {
    match arg {
        Some(rate) => Ok(BaudRate::try_from(rate)?),
        None => Ok(settings.baud_rate()),
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Tui {
        port: None,
        baud: None,
    });

    // The TUI owns the terminal, so it logs to a file instead
    if !matches!(command, Command::Tui { .. }) {
        logging::init_stderr_logging();
    }

    let ResolvedSettings { settings, created } = cli.resolve_settings()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = match command {
        Command::Tui { port, baud } => {
            let baud_rate = resolve_baud(baud, &settings)?;
            let log_path = logging::init_file_logging(&PathBuf::from(&settings.log_dir))?;
            tracing::info!("[tui] Starting (log file {})", log_path.display());
            // Settings load before the file subscriber exists
            if let Some(path) = created {
                tracing::info!("[settings] Created default settings at {}", path.display());
            }
            runtime.block_on(crate::tui::run(settings, port, baud_rate))
        }
        Command::List { json } => list_ports(&SystemBackend, json),
        Command::Monitor { port, baud } => {
            let baud_rate = resolve_baud(baud, &settings)?;
            runtime.block_on(monitor(Arc::new(SystemBackend), &settings, &port, baud_rate))
        }
    };

    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

fn list_ports(backend: &dyn SerialBackend, json: bool) -> anyhow::Result<()> {
    let ports = match backend.list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!("[list] {}", e);
            Vec::new()
        }
    };
    let mut stdout = std::io::stdout().lock();
    write_port_list(&mut stdout, &ports, json)?;
    Ok(())
}

fn write_port_list(out: &mut impl Write, ports: &[PortDescriptor], json: bool) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(ports)?)?;
    } else if ports.is_empty() {
        writeln!(out, "{}", NO_PORTS_NOTICE)?;
    } else {
        for port in ports {
            writeln!(out, "{}\t{}", port.label(), port.port_type)?;
        }
    }
    Ok(())
}

/// Stream `port` to stdout. Ends on Ctrl-C or when the link fails.
async fn monitor(
    backend: Arc<dyn SerialBackend>,
    settings: &AppSettings,
    port: &str,
    baud_rate: BaudRate,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager =
        ConnectionManager::new(backend, tx).with_line_settings(settings.line_settings());
    manager.connect(port, baud_rate)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                match manager.handle_event(event) {
                    Some(ConnectionEventKind::Data(bytes)) => {
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    Some(ConnectionEventKind::Error(message)) => {
                        tracing::error!("[monitor] {}", message);
                    }
                    Some(ConnectionEventKind::Closed(CloseReason::Failed)) => {
                        bail!("Connection to {} failed", port);
                    }
                    Some(ConnectionEventKind::Closed(CloseReason::Requested)) => break,
                    Some(ConnectionEventKind::Opened) | None => {}
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("[monitor] Interrupted, closing {}", port);
                manager.disconnect().await?;
                break;
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
