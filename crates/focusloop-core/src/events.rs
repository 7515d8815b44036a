//! Lifecycle events and their ordered fan-out.
//!
//! Every timer transition produces exactly one [`Event`]. Listeners are
//! injected as an ordered list when the engine is built and are invoked in
//! that order after the transition has been committed.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::timer::TimerType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session started or resumed. `end_time` is the boot-clock instant the
    /// host alarm should fire at.
    Start { end_time: u64, auto_started: bool },
    Pause,
    AddOneMinute { end_time: u64 },
    Finished {
        session_type: TimerType,
        auto_start_next: bool,
    },
    Reset,
}

/// Collaborator notified of timer events (alarm scheduler, notification
/// driver, sound player, ...).
pub trait EventListener: Send {
    fn name(&self) -> &str;

    fn on_event(&self, event: &Event) -> Result<()>;
}

/// Fixed, ordered listener list.
#[derive(Default)]
pub struct EventFanout {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventFanout {
    pub fn new(listeners: Vec<Box<dyn EventListener>>) -> Self {
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener. A failing listener is logged and
    /// does not stop delivery to the rest.
    pub fn dispatch(&self, event: &Event) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_event(event) {
                warn!(listener = listener.name(), error = %e, ?event, "listener failed");
            }
        }
    }
}

/// Logs every event at `info`.
pub struct LogListener;

impl EventListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_event(&self, event: &Event) -> Result<()> {
        info!(?event, "timer event");
        Ok(())
    }
}

/// Keeps every event it receives. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &Event) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
