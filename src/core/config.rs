//! Configuration management

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub metering: MeteringConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl Config {
    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join("pulsemeter");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        let m = &self.metering;
        if m.input_channel_count > 7 {
            return Err(Error::Config(format!(
                "metering.input_channel_count must be 0-7, got {}",
                m.input_channel_count
            )));
        }
        if !m.pulses_per_watt.is_finite() || m.pulses_per_watt < 0.0 {
            return Err(Error::Config(format!(
                "metering.pulses_per_watt must be >= 0, got {}",
                m.pulses_per_watt
            )));
        }
        if m.tick_interval_ms == 0 {
            return Err(Error::Config("metering.tick_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Where the board exposes its signal files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Directory holding the inN_value / inN_counter / inN_periode files
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Directory holding the LED and output brightness files
    #[serde(default = "default_led_dir")]
    pub led_dir: PathBuf,
    /// Always use the in-memory emulated board
    #[serde(default)]
    pub emulate: bool,
    /// Fall back to the emulated board when the real one is absent
    #[serde(default = "default_true")]
    pub emulation_fallback: bool,
}

fn default_input_dir() -> PathBuf { PathBuf::from("/sys/kernel/lgw4m-8di/") }
fn default_led_dir() -> PathBuf { PathBuf::from("/sys/class/leds/") }
fn default_true() -> bool { true }

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            led_dir: default_led_dir(),
            emulate: false,
            emulation_fallback: true,
        }
    }
}

/// Metering calibration and sampling cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Channels below this index are plain inputs, the rest are meters (0-7)
    #[serde(default = "default_input_channel_count")]
    pub input_channel_count: u8,
    /// Meter pulses per watt-hour constant
    #[serde(default = "default_pulses_per_watt")]
    pub pulses_per_watt: f64,
    /// Sampling interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u32,
    /// How often raw counters are published (<= 0 means every tick)
    #[serde(default = "default_send_counters_every")]
    pub send_counters_every_ms: i64,
}

fn default_input_channel_count() -> u8 { 6 }
fn default_pulses_per_watt() -> f64 { 1.0 }
fn default_tick_interval() -> u32 { 1000 }
fn default_send_counters_every() -> i64 { 60_000 }

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            input_channel_count: default_input_channel_count(),
            pulses_per_watt: default_pulses_per_watt(),
            tick_interval_ms: default_tick_interval(),
            send_counters_every_ms: default_send_counters_every(),
        }
    }
}

/// How events are delivered by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFormat {
    /// One JSON object per line on stdout
    Json,
    /// Through the log facade
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_format")]
    pub format: EventFormat,
}

fn default_event_format() -> EventFormat { EventFormat::Json }

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            format: default_event_format(),
        }
    }
}
