//! Error types for the driver

use std::path::PathBuf;
use thiserror::Error;

/// Driver-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read from {address}: {} does not exist", .path.display())]
    ResourceMissing { address: u8, path: PathBuf },

    #[error("Unknown pin address: {0}")]
    UnknownAddress(u8),

    #[error("Invalid value {value:?} read from pin {address}")]
    InvalidValue { address: u8, value: String },

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Hardware not supported: {0}")]
    HardwareNotSupported(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
