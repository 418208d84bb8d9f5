use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::auth::TokenProvider;
use crate::background::{
    BackgroundExtension, ImageLoader, VirtualBackgroundConfig, VirtualBackgroundPipeline,
};
use crate::context::{Appointment, Role};
use crate::errors::CallError;
use crate::events::{CallEvent, CallEventListener, EventEmitter, Notice};
use crate::media::MediaTrackManager;
use crate::participants::{ParticipantRegistry, RegistryUpdate, RemoteParticipant};
use crate::review::{ReviewDecision, ReviewGate, ReviewLookup, ReviewTarget};
use crate::settings::Settings;
use crate::state::{CallState, CallStateMachine, Transition};
use crate::transport::{DeviceInfo, MediaDevices, MediaTransport, MediaType, TransportEvent};

/// Everything needed to join one consultation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub app_id: String,
    pub channel: String,
    pub identity: String,
    /// Set when the local user is expected to review the veterinarian.
    pub review_target: Option<ReviewTarget>,
    pub mic_enabled_on_join: bool,
    pub camera_enabled_on_join: bool,
    pub initial_background: VirtualBackgroundConfig,
}

impl SessionConfig {
    pub fn new(app_id: &str, channel: &str, identity: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            channel: channel.to_string(),
            identity: identity.to_string(),
            review_target: None,
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
            initial_background: VirtualBackgroundConfig::None,
        }
    }

    /// The appointment id is the channel. Only pet parents review.
    pub fn for_appointment(app_id: &str, appointment: &Appointment, role: Role) -> Self {
        let identity = match role {
            Role::Veterinarian => &appointment.vet_id,
            Role::PetParent => &appointment.parent_id,
        };
        let config = Self::new(app_id, &appointment.id, identity);
        match role {
            Role::PetParent => config.with_review_target(ReviewTarget {
                vet_id: appointment.vet_id.clone(),
                parent_id: appointment.parent_id.clone(),
            }),
            Role::Veterinarian => config,
        }
    }

    pub fn with_review_target(mut self, target: ReviewTarget) -> Self {
        self.review_target = Some(target);
        self
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.mic_enabled_on_join = settings.mic_enabled_on_join;
        self.camera_enabled_on_join = settings.camera_enabled_on_join;
        if let Some(background) = &settings.default_background {
            self.initial_background = background.clone();
        }
        self
    }
}

/// External collaborators of a session.
pub struct SessionDeps {
    pub transport: Arc<dyn MediaTransport>,
    pub devices: Arc<dyn MediaDevices>,
    pub tokens: Arc<dyn TokenProvider>,
    pub backgrounds: Arc<dyn BackgroundExtension>,
    pub images: Arc<dyn ImageLoader>,
    pub reviews: Arc<dyn ReviewLookup>,
}

struct SessionCore {
    machine: CallStateMachine,
    is_joining: bool,
    is_joined: bool,
    /// Set first thing in `end_call`; completions check it before mutating.
    closing: bool,
    transport_joined: bool,
    last_error: Option<CallError>,
}

impl SessionCore {
    fn is_live(&self) -> bool {
        !self.closing && !self.machine.state().is_terminal()
    }
}

/// State shared with the transport event loop.
struct Shared {
    session_id: String,
    transport: Arc<dyn MediaTransport>,
    emitter: EventEmitter,
    core: Mutex<SessionCore>,
    participants: Mutex<ParticipantRegistry>,
}

impl Shared {
    async fn is_live(&self) -> bool {
        self.core.lock().await.is_live()
    }

    fn transition(&self, core: &mut SessionCore, to: CallState) {
        if let Transition::Changed { to, .. } = core.machine.transition(to) {
            self.emitter.emit(CallEvent::StateChanged(to));
        }
    }

    /// Re-derive Waiting/Active from the registry. Other states are left alone.
    async fn derive_presence(&self) {
        let live_media = self.participants.lock().await.has_live_media();
        let mut core = self.core.lock().await;
        if !core.is_live() {
            return;
        }
        if matches!(core.machine.state(), CallState::Waiting | CallState::Active) {
            let target = if live_media { CallState::Active } else { CallState::Waiting };
            self.transition(&mut core, target);
        }
    }

    async fn handle_event(&self, event: TransportEvent) {
        if !self.is_live().await {
            tracing::debug!("dropping transport event after teardown: {event:?}");
            return;
        }

        let (update, notify) = match event {
            TransportEvent::UserJoined(id) => (
                RegistryUpdate::Joined(id.clone()),
                CallEvent::ParticipantJoined(id),
            ),
            TransportEvent::UserPublished { participant_id, media } => {
                let track = match self.transport.subscribe(&participant_id, media).await {
                    Ok(track) => track,
                    Err(e) => {
                        tracing::warn!("subscribe {participant_id}/{media:?} failed: {e}");
                        return;
                    }
                };
                if !self.is_live().await {
                    tracing::debug!("subscription completed after teardown, ignored");
                    return;
                }
                (
                    RegistryUpdate::Published(track),
                    CallEvent::RemoteMediaPublished { participant_id, media },
                )
            }
            TransportEvent::UserUnpublished { participant_id, media } => (
                RegistryUpdate::Unpublished { participant_id: participant_id.clone(), media },
                CallEvent::RemoteMediaUnpublished { participant_id, media },
            ),
            TransportEvent::UserLeft(id) => (
                RegistryUpdate::Left(id.clone()),
                CallEvent::ParticipantLeft(id),
            ),
        };

        {
            let mut registry = self.participants.lock().await;
            registry.apply(update);
            tracing::debug!("{} remote participant(s)", registry.participant_count());
        }
        self.emitter.emit(notify);
        self.derive_presence().await;
    }
}

async fn event_loop(shared: Arc<Shared>, mut events: UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        shared.handle_event(event).await;
    }
    tracing::info!("transport event loop ended ({})", shared.session_id);
}

enum JoinProgress {
    Joined,
    /// The session was ended while the join was in flight.
    Abandoned,
}

/// One live consultation: join, media controls, teardown.
///
/// All mutable session state lives here and changes only through these
/// methods. Wrap in an `Arc` to drive it from several tasks.
pub struct CallSession {
    config: SessionConfig,
    shared: Arc<Shared>,
    tokens: Arc<dyn TokenProvider>,
    review_gate: ReviewGate,
    media: Mutex<MediaTrackManager>,
    background: Mutex<VirtualBackgroundPipeline>,
    event_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CallSession {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("new call session {session_id} for channel {}", config.channel);
        Self {
            shared: Arc::new(Shared {
                session_id,
                transport: deps.transport,
                emitter: EventEmitter::new(),
                core: Mutex::new(SessionCore {
                    machine: CallStateMachine::new(),
                    is_joining: false,
                    is_joined: false,
                    closing: false,
                    transport_joined: false,
                    last_error: None,
                }),
                participants: Mutex::new(ParticipantRegistry::new()),
            }),
            tokens: deps.tokens,
            review_gate: ReviewGate::new(deps.reviews),
            media: Mutex::new(MediaTrackManager::new(deps.devices)),
            background: Mutex::new(VirtualBackgroundPipeline::new(deps.backgrounds, deps.images)),
            event_task: std::sync::Mutex::new(None),
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.shared.emitter.add_listener(listener);
    }

    pub async fn state(&self) -> CallState {
        self.shared.core.lock().await.machine.state()
    }

    /// The fatal error that moved the session to `Failed`, if any.
    pub async fn last_error(&self) -> Option<CallError> {
        self.shared.core.lock().await.last_error.clone()
    }

    /// Snapshot of the remote participants.
    pub async fn participants(&self) -> Vec<RemoteParticipant> {
        self.shared.participants.lock().await.participants().to_vec()
    }

    pub async fn is_audio_enabled(&self) -> bool {
        self.media.lock().await.is_audio_enabled()
    }

    pub async fn is_video_enabled(&self) -> bool {
        self.media.lock().await.is_video_enabled()
    }

    pub async fn active_camera(&self) -> Option<String> {
        self.media.lock().await.active_camera().map(str::to_string)
    }

    pub async fn active_background(&self) -> VirtualBackgroundConfig {
        self.background.lock().await.active().clone()
    }

    /// Fetch a credential, create and publish local tracks, and start
    /// consuming transport events.
    ///
    /// Only the first call does anything: calls while a join is in flight,
    /// after it succeeded or failed, or after `end_call` return `Ok(())`.
    /// A join overtaken by `end_call` is abandoned silently.
    pub async fn join_call(&self) -> Result<(), CallError> {
        {
            let mut core = self.shared.core.lock().await;
            if core.is_joining || core.is_joined || !core.is_live()
                || core.machine.state() != CallState::Connecting
            {
                tracing::debug!(
                    "join_call ignored (joining={}, joined={}, state={:?})",
                    core.is_joining,
                    core.is_joined,
                    core.machine.state()
                );
                return Ok(());
            }
            core.is_joining = true;
        }

        tracing::info!("joining channel {} as {}", self.config.channel, self.config.identity);
        match self.run_join().await {
            Ok(JoinProgress::Joined) => {
                self.apply_join_preferences().await;
                Ok(())
            }
            Ok(JoinProgress::Abandoned) => {
                tracing::info!("join abandoned: call ended while joining");
                Ok(())
            }
            Err(e) => {
                if self.fail_join(&e).await {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn run_join(&self) -> Result<JoinProgress, CallError> {
        let cfg = &self.config;

        let credential = self.tokens.fetch_token(&cfg.channel, &cfg.identity, true).await?;
        if !self.shared.is_live().await {
            tracing::debug!("discarding join credential fetched after teardown");
            return Ok(JoinProgress::Abandoned);
        }

        let events = self
            .shared
            .transport
            .join(&cfg.app_id, &cfg.channel, &credential.token, &cfg.identity)
            .await?;
        {
            let mut core = self.shared.core.lock().await;
            if core.is_live() {
                core.transport_joined = true;
            } else {
                drop(core);
                // Teardown already ran without knowing about this join.
                if let Err(e) = self.shared.transport.leave().await {
                    tracing::warn!("leaving abandoned join: {e}");
                }
                return Ok(JoinProgress::Abandoned);
            }
        }

        let tracks = {
            let mut media = self.media.lock().await;
            if !self.shared.is_live().await {
                return Ok(JoinProgress::Abandoned);
            }
            media.create_local_tracks().await?
        };
        // end_call may be waiting on the media lock; it releases these tracks.
        if !self.shared.is_live().await {
            tracing::debug!("local tracks created after teardown, not publishing");
            return Ok(JoinProgress::Abandoned);
        }

        self.shared.transport.publish(&tracks).await?;

        let live_media = self.shared.participants.lock().await.has_live_media();
        {
            let mut core = self.shared.core.lock().await;
            if !core.is_live() {
                return Ok(JoinProgress::Abandoned);
            }
            core.is_joining = false;
            core.is_joined = true;
            let target = if live_media { CallState::Active } else { CallState::Waiting };
            self.shared.transition(&mut core, target);

            // Stored under the core lock so end_call always finds it.
            let handle = tokio::spawn(event_loop(self.shared.clone(), events));
            *self.event_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        }

        tracing::info!("joined channel {} ({})", cfg.channel, self.shared.session_id);
        Ok(JoinProgress::Joined)
    }

    /// Record a fatal join error. Returns false when the session was
    /// already torn down and the error was discarded.
    async fn fail_join(&self, error: &CallError) -> bool {
        let mut core = self.shared.core.lock().await;
        core.is_joining = false;
        if !core.is_live() {
            tracing::debug!("join error after teardown ignored: {error}");
            return false;
        }

        tracing::error!("join failed: {error}");
        core.last_error = Some(error.clone());
        self.shared.transition(&mut core, CallState::Failed);
        self.shared.emitter.emit(CallEvent::Notice(Notice::fatal(error.to_string())));
        true
    }

    async fn apply_join_preferences(&self) {
        if !self.config.mic_enabled_on_join {
            if let Err(e) = self.set_audio_enabled(false).await {
                tracing::warn!("muting microphone on join: {e}");
            }
        }
        if !self.config.camera_enabled_on_join {
            if let Err(e) = self.set_video_enabled(false).await {
                tracing::warn!("disabling camera on join: {e}");
            }
        }
        if self.config.initial_background != VirtualBackgroundConfig::None {
            if let Err(e) = self.apply_background(self.config.initial_background.clone()).await {
                tracing::warn!("initial background: {e}");
            }
        }
    }

    /// Apply a transport event. The event loop started by `join_call`
    /// feeds every event through here, in arrival order.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        self.shared.handle_event(event).await;
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.ensure_live().await?;
        let result = self.media.lock().await.set_audio_enabled(enabled).await;
        self.report(result.map(|()| {
            CallEvent::LocalMediaToggled { media: MediaType::Audio, enabled }
        }))
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.ensure_live().await?;
        let result = self.media.lock().await.set_video_enabled(enabled).await;
        self.report(result.map(|()| {
            CallEvent::LocalMediaToggled { media: MediaType::Video, enabled }
        }))
    }

    /// Move to the other camera. Failure is non-fatal and leaves the
    /// current camera in place.
    pub async fn switch_camera(&self) -> Result<DeviceInfo, CallError> {
        self.ensure_live().await?;
        let result = self.media.lock().await.switch_camera().await;
        match &result {
            Ok(device) => self.shared.emitter.emit(CallEvent::CameraSwitched(device.clone())),
            Err(e) => self.shared.emitter.emit(CallEvent::Notice(Notice::transient(e.to_string()))),
        }
        result
    }

    /// Replace the virtual background. On failure the background falls back
    /// to none; the call state is never affected.
    pub async fn apply_background(&self, config: VirtualBackgroundConfig) -> Result<(), CallError> {
        self.ensure_live().await?;

        let track = self.media.lock().await.video_track();
        let Some(track) = track else {
            return self.report(Err(CallError::Processing("no local video track".into())));
        };

        let mut pipeline = self.background.lock().await;
        if !self.shared.is_live().await {
            return Err(CallError::Session("call has ended".into()));
        }

        let kind = config.kind();
        match pipeline.apply(track, config).await {
            Ok(()) => self.report(Ok(CallEvent::BackgroundChanged(kind))),
            Err(e) => {
                self.shared
                    .emitter
                    .emit(CallEvent::BackgroundChanged(pipeline.active().kind()));
                self.report(Err(e))
            }
        }
    }

    /// Tear the call down and decide whether to prompt for a review.
    ///
    /// Steps run in a fixed order and each one runs even if an earlier one
    /// failed. Returns `None` if the call was already ended.
    pub async fn end_call(&self) -> Option<ReviewDecision> {
        {
            let mut core = self.shared.core.lock().await;
            if core.closing {
                tracing::debug!("end_call ignored: already ending");
                return None;
            }
            core.closing = true;
        }
        tracing::info!("ending call {}", self.shared.session_id);

        // 1. background pipeline
        if let Err(e) = self.background.lock().await.detach().await {
            tracing::warn!("teardown: detaching background: {e}");
        }

        // 2. local tracks
        {
            let mut media = self.media.lock().await;
            if media.has_tracks() {
                media.release();
            }
        }

        // 3. transport and its event subscription
        let was_joined = std::mem::take(&mut self.shared.core.lock().await.transport_joined);
        if was_joined {
            if let Err(e) = self.shared.transport.leave().await {
                tracing::warn!("teardown: leaving transport: {e}");
            }
        }
        if let Some(handle) = self.event_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }

        // 4. registry
        self.shared.participants.lock().await.clear();

        // 5. state
        {
            let mut core = self.shared.core.lock().await;
            core.is_joining = false;
            core.is_joined = false;
            self.shared.transition(&mut core, CallState::Ended);
        }

        // 6. review prompt
        let decision = self.review_gate.decide(self.config.review_target.as_ref()).await;
        tracing::info!("review decision: {decision:?}");
        self.shared.emitter.emit(CallEvent::ReviewDecided(decision));
        Some(decision)
    }

    async fn ensure_live(&self) -> Result<(), CallError> {
        if self.shared.is_live().await {
            Ok(())
        } else {
            Err(CallError::Session("call has ended".into()))
        }
    }

    /// Emit the success event, or a transient notice for the error.
    fn report(&self, result: Result<CallEvent, CallError>) -> Result<(), CallError> {
        match result {
            Ok(event) => {
                self.shared.emitter.emit(event);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.shared.emitter.emit(CallEvent::Notice(Notice::transient(e.to_string())));
                Err(e)
            }
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if let Some(handle) = self.event_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}
