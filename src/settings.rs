// src/settings.rs
//
// Persistent user settings, stored as JSON in the platform config dir.
// Every field has a serde default so older files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::display::DEFAULT_SCROLLBACK_BYTES;
use crate::error::{MonitorError, Result};
use crate::io::serial::utils::{parse_parity, BaudRate};
use crate::io::serial::LineSettings;

/// Poll intervals below this are raised to it
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Line ending appended to lines typed into the send box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Cr,
    Crlf,
    None,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::Crlf => b"\r\n",
            LineEnding::None => b"",
        }
    }

    /// Bytes to transmit for one typed line
    pub fn terminate(self, line: &str) -> Vec<u8> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(self.as_bytes());
        bytes
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String, // "none" | "odd" | "even"
    #[serde(default = "default_scrollback_bytes")]
    pub scrollback_bytes: usize,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub line_ending: LineEnding,
}

fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_scrollback_bytes() -> usize {
    DEFAULT_SCROLLBACK_BYTES
}
fn default_log_dir() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serialmon")
        .join("logs")
        .to_string_lossy()
        .to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            default_baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            scrollback_bytes: default_scrollback_bytes(),
            log_dir: default_log_dir(),
            line_ending: LineEnding::default(),
        }
    }
}

impl AppSettings {
    /// Check values that cannot be fixed up silently and clamp the rest
    pub fn validate(&mut self) -> Result<()> {
        BaudRate::try_from(self.default_baud_rate)?;

        if !(5..=8).contains(&self.data_bits) {
            return Err(MonitorError::Settings(format!(
                "data_bits must be 5-8, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(MonitorError::Settings(format!(
                "stop_bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        if !matches!(self.parity.to_lowercase().as_str(), "none" | "odd" | "even") {
            return Err(MonitorError::Settings(format!(
                "parity must be none, odd or even, got '{}'",
                self.parity
            )));
        }

        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            tracing::warn!(
                "[settings] poll_interval_ms {} too small, using {}",
                self.poll_interval_ms,
                MIN_POLL_INTERVAL_MS
            );
            self.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn baud_rate(&self) -> BaudRate {
        BaudRate::try_from(self.default_baud_rate).unwrap_or_default()
    }

    pub fn line_settings(&self) -> LineSettings {
        LineSettings {
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: parse_parity(&self.parity),
        }
    }
}

/// `<config dir>/serialmon/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serialmon")
        .join("settings.json")
}

/// Load settings from `path`. On first run the file is created with defaults.
pub fn load_settings(path: &Path) -> Result<AppSettings> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let mut settings: AppSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    } else {
        let settings = AppSettings::default();
        save_settings(path, &settings)?;
        tracing::info!("[settings] Created default settings at {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
