//! Calibration state shared by the sampler and the power estimator

use crate::core::{Error, MeteringConfig, Result};

/// Highest accepted input channel count
pub const MAX_INPUT_CHANNELS: u8 = 7;

/// How a monitored channel is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Plain digital input, reported on level change
    Input,
    /// Pulse output of an energy meter
    Metering,
}

/// Channel partition and meter constant
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    input_channel_count: u8,
    pulses_per_watt: f64,
}

impl Calibration {
    pub fn new() -> Self {
        Self {
            input_channel_count: 6,
            pulses_per_watt: 1.0,
        }
    }

    /// Build a calibration from configuration, validating both values
    pub fn from_config(config: &MeteringConfig) -> Result<Self> {
        let mut calibration = Self::new();
        calibration.set_input_channel_count(config.input_channel_count)?;
        calibration.set_pulses_per_watt(config.pulses_per_watt)?;
        Ok(calibration)
    }

    pub fn input_channel_count(&self) -> u8 {
        self.input_channel_count
    }

    /// Effective pulses-per-watt; never zero
    pub fn pulses_per_watt(&self) -> f64 {
        self.pulses_per_watt
    }

    /// Set how many leading channels are plain inputs (0-7)
    pub fn set_input_channel_count(&mut self, count: u8) -> Result<()> {
        if count > MAX_INPUT_CHANNELS {
            return Err(Error::InvalidCalibration(format!(
                "input channel count must be 0-{}, got {}",
                MAX_INPUT_CHANNELS, count
            )));
        }
        self.input_channel_count = count;
        Ok(())
    }

    /// Set the meter constant; 0 is taken as 1.0
    pub fn set_pulses_per_watt(&mut self, pulses_per_watt: f64) -> Result<()> {
        if !pulses_per_watt.is_finite() || pulses_per_watt < 0.0 {
            return Err(Error::InvalidCalibration(format!(
                "pulses per watt must be >= 0, got {}",
                pulses_per_watt
            )));
        }
        self.pulses_per_watt = if pulses_per_watt == 0.0 { 1.0 } else { pulses_per_watt };
        Ok(())
    }

    pub fn classify(&self, channel: u8) -> ChannelKind {
        if channel < self.input_channel_count {
            ChannelKind::Input
        } else {
            ChannelKind::Metering
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}
