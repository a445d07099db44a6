//! Common types used across the driver

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain every event and module is published under
pub const DOMAIN: &str = "EmbeddedSystems.Weeco4mGPIO";

/// Property carrying a raw level, counter or watt value
pub const STATUS_LEVEL: &str = "Status.Level";
/// Property carrying a computed power draw
pub const METER_WATTS: &str = "Meter.Watts";

/// Description attached to digital input/output events
pub const GPIO_DESCRIPTION: &str = "Weeco-4M GPIO";
/// Description attached to counter and period register events
pub const REGISTER_DESCRIPTION: &str = "Weeco-4M Register";

/// Value carried by a property change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(u64),
    Decimal(f64),
    Text(String),
}

impl PropertyValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(v) => Some(*v as f64),
            PropertyValue::Decimal(v) => Some(*v),
            PropertyValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::Decimal(v) => write!(f, "{}", v),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::Integer(v as u64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Decimal(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

/// A single property change notification handed to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChanged {
    pub domain: String,
    /// Pin address the value belongs to
    pub source: String,
    pub description: String,
    /// "Status.Level" or "Meter.Watts"
    pub property: String,
    pub value: PropertyValue,
    /// Unix timestamp of the emission
    pub timestamp: i64,
}

impl PropertyChanged {
    pub fn new(source: u8, description: &str, property: &str, value: impl Into<PropertyValue>) -> Self {
        Self {
            domain: DOMAIN.to_string(),
            source: source.to_string(),
            description: description.to_string(),
            property: property.to_string(),
            value: value.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_watts(&self) -> bool {
        self.property == METER_WATTS
    }
}

/// Kind of module exposed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleType {
    Sensor,
    Switch,
}

/// One addressable module as listed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub domain: String,
    pub address: u8,
    pub description: String,
    pub module_type: ModuleType,
}

/// Summary of a single sampling tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Channels read successfully
    pub sampled: usize,
    /// Channels skipped because a pin could not be read
    pub skipped: usize,
    /// Events handed to the sink
    pub emitted: usize,
}
