use std::sync::Arc;

use crate::background::BackgroundKind;
use crate::review::ReviewDecision;
use crate::state::CallState;
use crate::transport::{DeviceInfo, MediaType};

/// Events emitted by the core to native UI listeners.
#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(CallState),
    ParticipantJoined(String),
    ParticipantLeft(String), // participant id
    RemoteMediaPublished { participant_id: String, media: MediaType },
    RemoteMediaUnpublished { participant_id: String, media: MediaType },
    LocalMediaToggled { media: MediaType, enabled: bool },
    CameraSwitched(DeviceInfo),
    BackgroundChanged(BackgroundKind),
    Notice(Notice),
    ReviewDecided(ReviewDecision),
}

/// User-visible message. Fatal notices accompany the `Failed` state,
/// the others are transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub fatal: bool,
}

impl Notice {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: true }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: false }
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = match self.listeners.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
