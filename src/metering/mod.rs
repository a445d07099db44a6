//! Metering engine
//!
//! Register model, calibration, the per-tick sampler and the
//! pulse-to-watt estimator.

mod calibration;
mod estimator;
mod registers;
mod sampler;

pub use calibration::{Calibration, ChannelKind, MAX_INPUT_CHANNELS};
pub use estimator::{
    MeterEvent, PowerEstimator, CONFIRM_THRESHOLD_PERCENT, DECAY_EVERY_TICKS, WATT_CONVERSION,
};
pub use registers::{RegisterStore, Registers};
pub use sampler::SampleEngine;
