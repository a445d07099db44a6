//! Pulsemeter library
//!
//! This module exposes the driver for use in tests, the binaries,
//! and host integrations.

pub mod core;
pub mod driver;
pub mod events;
pub mod hardware;
pub mod metering;
