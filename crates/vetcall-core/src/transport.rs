//! Boundary to the real-time media transport and the capture devices.
//!
//! The core never talks to a concrete SDK. Native shells provide
//! implementations of these traits; tests use in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::background::FrameProcessor;
use crate::errors::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

/// A video input as reported by device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
}

/// Handle to a subscribed remote track, held for playback only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub track_id: String,
    pub participant_id: String,
    pub kind: MediaType,
}

/// Events delivered by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    UserJoined(String),
    UserPublished { participant_id: String, media: MediaType },
    UserUnpublished { participant_id: String, media: MediaType },
    UserLeft(String),
}

#[async_trait]
pub trait LocalAudioTrack: Send + Sync {
    fn track_id(&self) -> String;
    /// Mute or unmute hardware capture without releasing the track.
    async fn set_enabled(&self, enabled: bool) -> Result<(), CallError>;
    /// Stop capture and release the hardware.
    fn close(&self);
}

#[async_trait]
pub trait LocalVideoTrack: Send + Sync {
    fn track_id(&self) -> String;
    /// Device the track is currently capturing from, if known.
    fn device_id(&self) -> Option<String>;
    async fn set_enabled(&self, enabled: bool) -> Result<(), CallError>;
    async fn set_device(&self, device_id: &str) -> Result<(), CallError>;
    /// Route raw camera frames into `processor`.
    fn pipe(&self, processor: Arc<dyn FrameProcessor>);
    /// Disconnect the raw camera output from any processor.
    fn unpipe(&self);
    fn close(&self);
}

/// A local track ready to be published.
#[derive(Clone)]
pub enum LocalTrack {
    Audio(Arc<dyn LocalAudioTrack>),
    Video(Arc<dyn LocalVideoTrack>),
}

impl LocalTrack {
    pub fn kind(&self) -> MediaType {
        match self {
            LocalTrack::Audio(_) => MediaType::Audio,
            LocalTrack::Video(_) => MediaType::Video,
        }
    }

    pub fn track_id(&self) -> String {
        match self {
            LocalTrack::Audio(t) => t.track_id(),
            LocalTrack::Video(t) => t.track_id(),
        }
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalTrack({:?}, {})", self.kind(), self.track_id())
    }
}

/// Camera and microphone access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn list_cameras(&self) -> Result<Vec<DeviceInfo>, CallError>;
    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalAudioTrack>, CallError>;
    async fn create_camera_track(&self) -> Result<Arc<dyn LocalVideoTrack>, CallError>;
}

/// The real-time media transport.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Join `channel`. The returned receiver yields transport events until
    /// the transport is left.
    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        identity: &str,
    ) -> Result<UnboundedReceiver<TransportEvent>, CallError>;

    async fn publish(&self, tracks: &[LocalTrack]) -> Result<(), CallError>;

    async fn subscribe(
        &self,
        participant_id: &str,
        media: MediaType,
    ) -> Result<RemoteTrack, CallError>;

    async fn leave(&self) -> Result<(), CallError>;
}
