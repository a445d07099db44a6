//! Per-channel metering registers

use crate::hardware::{ChannelSample, MONITORED_CHANNELS};

/// Register set kept for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    /// Latest raw digital level
    pub status: u32,
    /// Pulse/transition count
    pub counter: u32,
    /// Time between pulses, milliseconds
    pub period: u32,
    /// Counter at the last processed change
    pub last_counter: u32,
    /// Period at the last confirmed update
    pub last_period: u32,
    /// Milliseconds since `last_counter` was refreshed without a new pulse
    pub last_period_elapsed_ms: u32,
}

impl Registers {
    /// Store a fresh raw sample, leaving the tracking fields alone
    pub fn store(&mut self, sample: ChannelSample) {
        self.status = sample.status;
        self.counter = sample.counter;
        self.period = sample.period_ms;
    }

    /// Whether the counter moved since it was last processed
    pub fn has_new_pulse(&self) -> bool {
        self.counter != self.last_counter
    }
}

/// Register table for every monitored channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterStore {
    channels: [Registers; MONITORED_CHANNELS as usize],
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: u8) -> Option<&Registers> {
        self.channels.get(channel as usize)
    }

    pub fn get_mut(&mut self, channel: u8) -> Option<&mut Registers> {
        self.channels.get_mut(channel as usize)
    }

    /// Iterate over `(channel, registers)` in index order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Registers)> {
        self.channels.iter().enumerate().map(|(i, r)| (i as u8, r))
    }

    /// Zero every register of every channel
    pub fn reset(&mut self) {
        self.channels = Default::default();
    }
}
