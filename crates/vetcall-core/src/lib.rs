//! Vetcall core session logic.
//!
//! Pure Rust crate with no platform dependencies. The media SDK, camera
//! devices and the background-processing extension are reached through the
//! traits in [`transport`] and [`background`]; native shells provide them.

pub mod auth;
pub mod background;
pub mod context;
pub mod errors;
pub mod events;
pub mod gradient;
pub mod media;
pub mod participants;
pub mod review;
pub mod session;
pub mod settings;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{HttpTokenClient, JoinCredential, TokenProvider};
pub use background::{
    BackgroundExtension, BackgroundKind, BlurDegree, FrameProcessor, ImageLoader,
    SourceImageLoader, VirtualBackgroundConfig, VirtualBackgroundPipeline,
};
pub use context::{Appointment, ContextClient, PetParent, Profile, Role, Veterinarian};
pub use errors::CallError;
pub use events::{CallEvent, CallEventListener, Notice};
pub use media::MediaTrackManager;
pub use participants::{ParticipantRegistry, RemoteParticipant};
pub use review::{ReviewDecision, ReviewGate, ReviewLookup, ReviewTarget};
pub use session::{CallSession, SessionConfig, SessionDeps};
pub use settings::{Settings, SettingsStore};
pub use state::CallState;
pub use transport::{DeviceInfo, MediaDevices, MediaTransport, MediaType, TransportEvent};
