//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::auth::{JoinCredential, TokenProvider};
use crate::background::{BackgroundExtension, FrameProcessor, ImageLoader, ProcessorOptions};
use crate::errors::CallError;
use crate::review::ReviewLookup;
use crate::transport::{
    DeviceInfo, LocalAudioTrack, LocalTrack, LocalVideoTrack, MediaDevices, MediaTransport,
    MediaType, RemoteTrack, TransportEvent,
};

pub fn camera(id: &str, label: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: id.to_string(),
        label: label.to_string(),
    }
}

// ── Tracks ───────────────────────────────────────────────────────────

pub struct FakeAudioTrack {
    id: String,
    enabled: AtomicBool,
    hardware_calls: AtomicUsize,
    closed: AtomicBool,
}

impl FakeAudioTrack {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: AtomicBool::new(true),
            hardware_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn hardware_calls(&self) -> usize {
        self.hardware_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalAudioTrack for FakeAudioTrack {
    fn track_id(&self) -> String {
        self.id.clone()
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.hardware_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeVideoTrack {
    id: String,
    device: Mutex<Option<String>>,
    enabled: AtomicBool,
    hardware_calls: AtomicUsize,
    piped: Mutex<Option<String>>,
    closed: AtomicBool,
    fail_set_device: AtomicBool,
}

impl FakeVideoTrack {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            device: Mutex::new(None),
            enabled: AtomicBool::new(true),
            hardware_calls: AtomicUsize::new(0),
            piped: Mutex::new(None),
            closed: AtomicBool::new(false),
            fail_set_device: AtomicBool::new(false),
        }
    }

    pub fn on_device(id: &str, device_id: &str) -> Self {
        let track = Self::new(id);
        *track.device.lock().unwrap() = Some(device_id.to_string());
        track
    }

    pub fn current_device(&self) -> Option<String> {
        self.device.lock().unwrap().clone()
    }

    pub fn piped_processor(&self) -> Option<String> {
        self.piped.lock().unwrap().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn hardware_calls(&self) -> usize {
        self.hardware_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_device_switch(&self) {
        self.fail_set_device.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalVideoTrack for FakeVideoTrack {
    fn track_id(&self) -> String {
        self.id.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.current_device()
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.hardware_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn set_device(&self, device_id: &str) -> Result<(), CallError> {
        if self.fail_set_device.load(Ordering::SeqCst) {
            return Err(CallError::Device(format!("cannot open {device_id}")));
        }
        *self.device.lock().unwrap() = Some(device_id.to_string());
        Ok(())
    }

    fn pipe(&self, processor: Arc<dyn FrameProcessor>) {
        *self.piped.lock().unwrap() = Some(processor.id());
    }

    fn unpipe(&self) {
        *self.piped.lock().unwrap() = None;
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ── Devices ──────────────────────────────────────────────────────────

pub struct FakeDevices {
    cameras: Mutex<Vec<DeviceInfo>>,
    deny: Option<CallError>,
    gate: Option<Arc<Notify>>,
    requests: AtomicUsize,
    audio: Mutex<Vec<Arc<FakeAudioTrack>>>,
    video: Mutex<Vec<Arc<FakeVideoTrack>>>,
}

impl FakeDevices {
    pub fn new(cameras: Vec<DeviceInfo>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
            deny: None,
            gate: None,
            requests: AtomicUsize::new(0),
            audio: Mutex::new(Vec::new()),
            video: Mutex::new(Vec::new()),
        }
    }

    pub fn denied() -> Self {
        Self {
            deny: Some(CallError::Permission("camera access denied".into())),
            ..Self::new(vec![camera("cam-0", "Integrated Camera")])
        }
    }

    /// Microphone creation waits for `gate` before returning.
    pub fn gated(cameras: Vec<DeviceInfo>, gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Self::new(cameras) }
    }

    /// Microphone tracks requested so far, including ones still pending.
    pub fn track_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn audio_track(&self) -> Arc<FakeAudioTrack> {
        self.audio.lock().unwrap()[0].clone()
    }

    pub fn video_track(&self) -> Arc<FakeVideoTrack> {
        self.video.lock().unwrap()[0].clone()
    }

    pub fn tracks_created(&self) -> usize {
        self.audio.lock().unwrap().len() + self.video.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn list_cameras(&self) -> Result<Vec<DeviceInfo>, CallError> {
        Ok(self.cameras.lock().unwrap().clone())
    }

    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalAudioTrack>, CallError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(e) = &self.deny {
            return Err(e.clone());
        }
        let track = Arc::new(FakeAudioTrack::new("mic"));
        self.audio.lock().unwrap().push(track.clone());
        Ok(track)
    }

    async fn create_camera_track(&self) -> Result<Arc<dyn LocalVideoTrack>, CallError> {
        if let Some(e) = &self.deny {
            return Err(e.clone());
        }
        let first = self.cameras.lock().unwrap().first().map(|c| c.device_id.clone());
        let track = Arc::new(match first {
            Some(device) => FakeVideoTrack::on_device("camera", &device),
            None => FakeVideoTrack::new("camera"),
        });
        self.video.lock().unwrap().push(track.clone());
        Ok(track)
    }
}

// ── Transport ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeTransport {
    joins: AtomicUsize,
    publishes: AtomicUsize,
    subscribes: AtomicUsize,
    leaves: AtomicUsize,
    fail_join: AtomicBool,
    fail_publish: AtomicBool,
    join_gate: Option<Arc<Notify>>,
    publish_gate: Option<Arc<Notify>>,
    published: Mutex<Vec<MediaType>>,
    sender: Mutex<Option<UnboundedSender<TransportEvent>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_join() -> Self {
        let t = Self::default();
        t.fail_join.store(true, Ordering::SeqCst);
        t
    }

    pub fn failing_publish() -> Self {
        let t = Self::default();
        t.fail_publish.store(true, Ordering::SeqCst);
        t
    }

    /// `join` waits for `gate` before connecting.
    pub fn gated_join(gate: Arc<Notify>) -> Self {
        Self { join_gate: Some(gate), ..Self::default() }
    }

    /// `publish` waits for `gate` before completing.
    pub fn gated_publish(gate: Arc<Notify>) -> Self {
        Self { publish_gate: Some(gate), ..Self::default() }
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn published_kinds(&self) -> Vec<MediaType> {
        self.published.lock().unwrap().clone()
    }

    /// Deliver an event as the remote side would. Returns false once the
    /// subscription has been dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn join(
        &self,
        _app_id: &str,
        _channel: &str,
        _token: &str,
        _identity: &str,
    ) -> Result<UnboundedReceiver<TransportEvent>, CallError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(gate) = &self.join_gate {
            gate.notified().await;
        }
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(CallError::Join("channel refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn publish(&self, tracks: &[LocalTrack]) -> Result<(), CallError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.publish_gate {
            gate.notified().await;
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(CallError::Publish("publish rejected".into()));
        }
        self.published.lock().unwrap().extend(tracks.iter().map(LocalTrack::kind));
        Ok(())
    }

    async fn subscribe(&self, participant_id: &str, media: MediaType) -> Result<RemoteTrack, CallError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteTrack {
            track_id: format!("{participant_id}-{media:?}"),
            participant_id: participant_id.to_string(),
            kind: media,
        })
    }

    async fn leave(&self) -> Result<(), CallError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
        Ok(())
    }
}

// ── Tokens / reviews ─────────────────────────────────────────────────

pub struct FakeTokens {
    calls: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl FakeTokens {
    pub fn ok() -> Self {
        Self { calls: AtomicUsize::new(0), fail: false, gate: None }
    }

    pub fn failing() -> Self {
        Self { calls: AtomicUsize::new(0), fail: true, gate: None }
    }

    /// Tokens are only handed out once `gate` is notified.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { calls: AtomicUsize::new(0), fail: false, gate: Some(gate) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_token(
        &self,
        channel: &str,
        _identity: &str,
        _is_publisher: bool,
    ) -> Result<JoinCredential, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(CallError::Token("token endpoint returned status 503".into()));
        }
        Ok(JoinCredential {
            token: format!("token-for-{channel}"),
            ttl: Some(600),
        })
    }
}

pub struct FakeReviews {
    calls: AtomicUsize,
    exists: bool,
}

impl FakeReviews {
    pub fn new(exists: bool) -> Self {
        Self { calls: AtomicUsize::new(0), exists }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewLookup for FakeReviews {
    async fn has_existing_review(&self, _vet_id: &str, _parent_id: &str) -> Result<bool, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exists)
    }
}

// ── Background extension ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorFailure {
    Init,
    Enable,
}

pub struct FakeProcessor {
    id: String,
    enabled: AtomicBool,
    destination: Mutex<Option<String>>,
    options: Mutex<Option<ProcessorOptions>>,
    failure: Option<ProcessorFailure>,
}

impl FakeProcessor {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn destination(&self) -> Option<String> {
        self.destination.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<ProcessorOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameProcessor for FakeProcessor {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn init(&self) -> Result<(), CallError> {
        match self.failure {
            Some(ProcessorFailure::Init) => Err(CallError::Processing("model failed to load".into())),
            _ => Ok(()),
        }
    }

    async fn set_options(&self, options: ProcessorOptions) -> Result<(), CallError> {
        *self.options.lock().unwrap() = Some(options);
        Ok(())
    }

    async fn enable(&self) -> Result<(), CallError> {
        if self.failure == Some(ProcessorFailure::Enable) {
            return Err(CallError::Processing("enable failed".into()));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self) -> Result<(), CallError> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pipe_to_destination(&self, track_id: &str) {
        *self.destination.lock().unwrap() = Some(track_id.to_string());
    }

    fn unpipe(&self) {
        *self.destination.lock().unwrap() = None;
    }
}

pub struct FakeExtension {
    compatible: bool,
    failure: Option<ProcessorFailure>,
    processors: Mutex<Vec<Arc<FakeProcessor>>>,
}

impl FakeExtension {
    pub fn new() -> Self {
        Self { compatible: true, failure: None, processors: Mutex::new(Vec::new()) }
    }

    pub fn incompatible() -> Self {
        Self { compatible: false, ..Self::new() }
    }

    pub fn with_failure(failure: ProcessorFailure) -> Self {
        Self { failure: Some(failure), ..Self::new() }
    }

    pub fn processor(&self, index: usize) -> Arc<FakeProcessor> {
        self.processors.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.processors.lock().unwrap().len()
    }

    /// Processors whose output is still wired to a destination.
    pub fn attached_count(&self) -> usize {
        self.processors
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.destination().is_some())
            .count()
    }
}

#[async_trait]
impl BackgroundExtension for FakeExtension {
    fn check_compatibility(&self) -> bool {
        self.compatible
    }

    async fn create_processor(&self) -> Result<Arc<dyn FrameProcessor>, CallError> {
        let mut processors = self.processors.lock().unwrap();
        let processor = Arc::new(FakeProcessor {
            id: format!("processor-{}", processors.len()),
            enabled: AtomicBool::new(false),
            destination: Mutex::new(None),
            options: Mutex::new(None),
            failure: self.failure,
        });
        processors.push(processor.clone());
        Ok(processor)
    }
}

pub struct FakeImageLoader {
    fail: bool,
    requests: Mutex<Vec<String>>,
}

impl FakeImageLoader {
    pub fn new() -> Self {
        Self { fail: false, requests: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageLoader for FakeImageLoader {
    async fn load(&self, source: &str) -> Result<RgbaImage, CallError> {
        self.requests.lock().unwrap().push(source.to_string());
        if self.fail {
            return Err(CallError::Processing(format!("404 for {source}")));
        }
        Ok(RgbaImage::from_pixel(4, 4, Rgba([10, 120, 60, 255])))
    }
}
