//! Board access module
//!
//! Provides the pin address map and abstractions for reading and writing
//! the board's per-signal files:
//! - Linux: the lgw4m-8di sysfs driver plus LED brightness files
//! - Fallback: an in-memory emulated board for desktop runs

mod emulated;
mod sysfs;

pub use emulated::EmulatedBoard;
pub use sysfs::SysfsBoard;

use crate::core::{BoardConfig, Error, Result};
use std::path::{Path, PathBuf};

/// Number of channels polled on every tick
pub const MONITORED_CHANNELS: u8 = 8;
/// Counter register of channel `n` lives at `n + COUNTER_OFFSET`
pub const COUNTER_OFFSET: u8 = 16;
/// Period register of channel `n` lives at `n + PERIOD_OFFSET`
pub const PERIOD_OFFSET: u8 = 32;
/// LEDs and relay outputs
pub const OUTPUT_ADDRESSES: [u8; 4] = [8, 9, 10, 11];

/// Period files report microseconds
const PERIOD_UNITS_PER_MS: u32 = 1000;

/// Addresses above 15 are counter/period registers, the rest are GPIO lines
pub fn is_register(address: u8) -> bool {
    address > 15
}

/// Whether `address` is backed by a pin file
pub fn is_mapped(address: u8) -> bool {
    matches!(address, 0..=11 | 16..=23 | 32..=39)
}

/// Every counter and period register address, in ascending order
pub fn register_addresses() -> impl Iterator<Item = u8> {
    let counters = COUNTER_OFFSET..COUNTER_OFFSET + MONITORED_CHANNELS;
    let periods = PERIOD_OFFSET..PERIOD_OFFSET + MONITORED_CHANNELS;
    counters.chain(periods)
}

/// Every GPIO address (inputs then outputs)
pub fn gpio_addresses() -> impl Iterator<Item = u8> {
    (0..MONITORED_CHANNELS).chain(OUTPUT_ADDRESSES)
}

/// Resolve the file backing `address`
pub fn pin_path(address: u8, input_dir: &Path, led_dir: &Path) -> Result<PathBuf> {
    let path = match address {
        0..=7 => input_dir.join(format!("in{}_value", address)),
        8 => led_dir.join("led_orange").join("brightness"),
        9 => led_dir.join("led_green").join("brightness"),
        10 => led_dir.join("output1").join("brightness"),
        11 => led_dir.join("output2").join("brightness"),
        16..=23 => input_dir.join(format!("in{}_counter", address - COUNTER_OFFSET)),
        32..=39 => input_dir.join(format!("in{}_periode", address - PERIOD_OFFSET)),
        _ => return Err(Error::UnknownAddress(address)),
    };
    Ok(path)
}

/// Parse the text of a pin file into a register value
pub fn parse_register(address: u8, raw: &str) -> Result<u32> {
    raw.trim().parse().map_err(|_| Error::InvalidValue {
        address,
        value: raw.to_string(),
    })
}

/// One channel's raw status, counter, and period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSample {
    pub status: u32,
    pub counter: u32,
    /// Time between the last two pulses, milliseconds
    pub period_ms: u32,
}

/// Trait for the per-signal file backend
pub trait PinSource: Send {
    /// Read the raw text of a pin
    fn read(&self, address: u8) -> Result<String>;

    /// Write a raw value to a pin
    fn write(&self, address: u8, value: &str) -> Result<()>;

    /// Name of this backend
    fn name(&self) -> &str;

    /// Whether values come from an emulation rather than the board
    fn is_emulated(&self) -> bool;

    /// Read status, counter and period of a monitored channel
    fn read_channel(&self, channel: u8) -> Result<ChannelSample> {
        let counter_address = channel + COUNTER_OFFSET;
        let period_address = channel + PERIOD_OFFSET;

        let status = parse_register(channel, &self.read(channel)?)?;
        let counter = parse_register(counter_address, &self.read(counter_address)?)?;
        let period_raw = parse_register(period_address, &self.read(period_address)?)?;

        Ok(ChannelSample {
            status,
            counter,
            period_ms: period_raw / PERIOD_UNITS_PER_MS,
        })
    }
}

/// Open the pin source described by `config`
///
/// Returns the sysfs board when present, the emulated board when emulation
/// is requested or allowed as a fallback, and an error otherwise.
pub fn open_board(config: &BoardConfig) -> Result<Box<dyn PinSource>> {
    if config.emulate {
        log::info!("Board emulation requested");
        return Ok(Box::new(EmulatedBoard::new()));
    }

    match SysfsBoard::detect(&config.input_dir, &config.led_dir) {
        Ok(board) => {
            log::info!("Using sysfs board at {:?}", config.input_dir);
            Ok(Box::new(board))
        }
        Err(e) if config.emulation_fallback => {
            log::warn!("{}; falling back to emulated board", e);
            Ok(Box::new(EmulatedBoard::new()))
        }
        Err(e) => Err(e),
    }
}
