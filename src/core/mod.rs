//! Core module - Configuration, errors, and common types

mod config;
mod error;
mod types;

pub use config::{BoardConfig, Config, EventFormat, EventsConfig, MeteringConfig};
pub use error::{Error, Result};
pub use types::{
    ModuleInfo, ModuleType, PropertyChanged, PropertyValue, TickReport, DOMAIN, GPIO_DESCRIPTION,
    METER_WATTS, REGISTER_DESCRIPTION, STATUS_LEVEL,
};
