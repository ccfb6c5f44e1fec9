//! Test doubles for the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use types::events::{EngineEvent, EventType};

use crate::{EventStream, StreamError, TransportError};

/// In-memory [`EventStream`] that records every published event in order.
/// Health is settable so degraded-mode paths can be exercised.
#[derive(Default)]
pub struct RecordingStream {
    events: Mutex<Vec<EngineEvent>>,
    unhealthy: AtomicBool,
}

impl RecordingStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events.lock().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventStream for RecordingStream {
    async fn publish(&self, event: EngineEvent) -> Result<(), StreamError> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn is_healthy(&self) -> Result<bool, StreamError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Err(StreamError::Transport(TransportError::Other(
                "stream marked unhealthy".to_string(),
            )))
        } else {
            Ok(true)
        }
    }

    async fn close(&self, _deadline: Duration) -> Result<(), StreamError> {
        Ok(())
    }
}
