//! Event delivery
//!
//! The driver publishes every property change through an [`EventSink`].
//! Sinks decide where events go: the log, an async channel consumed by the
//! host, or an in-memory buffer.

use crate::core::{Error, PropertyChanged, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Receiver of property change notifications
pub trait EventSink: Send {
    fn emit(&mut self, event: PropertyChanged);
}

/// Render an event as a single JSON line
pub fn to_json_line(event: &PropertyChanged) -> Result<String> {
    serde_json::to_string(event).map_err(|e| Error::Serialization(e.to_string()))
}

/// Writes every event to the log at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: PropertyChanged) {
        log::info!(
            "{} {} [{}] {} = {}",
            event.domain,
            event.source,
            event.description,
            event.property,
            event.value
        );
    }
}

/// Forwards events to an async consumer
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PropertyChanged>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PropertyChanged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: PropertyChanged) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Keeps events in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<PropertyChanged>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<PropertyChanged> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain the buffer
    pub fn take(&self) -> Vec<PropertyChanged> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: PropertyChanged) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}
