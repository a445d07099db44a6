//! Emulated board for desktop runs
//!
//! When the real board is absent the driver can still be exercised end to
//! end: every channel sample toggles the input level, counts one pulse and
//! stretches the period by a few milliseconds.

use crate::core::{Error, Result};
use crate::hardware::{
    is_mapped, parse_register, ChannelSample, PinSource, COUNTER_OFFSET, PERIOD_OFFSET,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Period growth per sample, milliseconds
const PERIOD_STEP_MS: u32 = 4;

/// In-memory board
pub struct EmulatedBoard {
    pins: Mutex<BTreeMap<u8, u32>>,
}

impl EmulatedBoard {
    pub fn new() -> Self {
        Self {
            pins: Mutex::new(BTreeMap::new()),
        }
    }

    fn check(address: u8) -> Result<()> {
        if is_mapped(address) {
            Ok(())
        } else {
            Err(Error::UnknownAddress(address))
        }
    }
}

impl Default for EmulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PinSource for EmulatedBoard {
    fn read(&self, address: u8) -> Result<String> {
        Self::check(address)?;
        let pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(pins.get(&address).copied().unwrap_or(0).to_string())
    }

    fn write(&self, address: u8, value: &str) -> Result<()> {
        Self::check(address)?;
        let value = parse_register(address, value)?;
        self.pins.lock().unwrap_or_else(PoisonError::into_inner).insert(address, value);
        Ok(())
    }

    fn name(&self) -> &str {
        "Emulation (no board)"
    }

    fn is_emulated(&self) -> bool {
        true
    }

    fn read_channel(&self, channel: u8) -> Result<ChannelSample> {
        Self::check(channel)?;
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);

        let status = pins.entry(channel).or_insert(0);
        *status = if *status == 0 { 1 } else { 0 };
        let status = *status;

        let counter = pins.entry(channel + COUNTER_OFFSET).or_insert(0);
        *counter = counter.wrapping_add(1);
        let counter = *counter;

        // stored in microseconds like the real periode files
        let period = pins.entry(channel + PERIOD_OFFSET).or_insert(0);
        *period = period.saturating_add(PERIOD_STEP_MS * 1000);
        let period_ms = *period / 1000;

        Ok(ChannelSample {
            status,
            counter,
            period_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_advance() {
        let board = EmulatedBoard::new();

        let first = board.read_channel(7).unwrap();
        assert_eq!(first, ChannelSample { status: 1, counter: 1, period_ms: 4 });

        let second = board.read_channel(7).unwrap();
        assert_eq!(second, ChannelSample { status: 0, counter: 2, period_ms: 8 });

        assert_eq!(board.read(23).unwrap(), "2");
    }

    #[test]
    fn test_writes_are_kept() {
        let board = EmulatedBoard::new();

        board.write(9, "1").unwrap();
        assert_eq!(board.read(9).unwrap(), "1");
        assert!(matches!(board.write(12, "1"), Err(Error::UnknownAddress(12))));
        assert!(matches!(board.write(9, "on"), Err(Error::InvalidValue { .. })));
    }
}
