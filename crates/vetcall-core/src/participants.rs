use crate::transport::{MediaType, RemoteTrack};

/// A remote call participant and the media it currently publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub id: String,
    pub audio_track: Option<RemoteTrack>,
    pub video_track: Option<RemoteTrack>,
}

impl RemoteParticipant {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            audio_track: None,
            video_track: None,
        }
    }

    pub fn has_media(&self) -> bool {
        self.audio_track.is_some() || self.video_track.is_some()
    }
}

/// One registry mutation, derived from a transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryUpdate {
    Joined(String),
    Published(RemoteTrack),
    Unpublished { participant_id: String, media: MediaType },
    Left(String),
}

/// Remote participants keyed by id, in join order.
///
/// Mutated only by the session event loop through `apply`. Holds track
/// references for playback; the transport owns the media itself.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    participants: Vec<RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
        }
    }

    pub fn apply(&mut self, update: RegistryUpdate) {
        match update {
            RegistryUpdate::Joined(id) => self.on_joined(&id),
            RegistryUpdate::Published(track) => self.on_published(track),
            RegistryUpdate::Unpublished { participant_id, media } => {
                self.on_unpublished(&participant_id, media)
            }
            RegistryUpdate::Left(id) => self.on_left(&id),
        }
    }

    pub fn on_joined(&mut self, id: &str) {
        self.entry(id);
    }

    pub fn on_published(&mut self, track: RemoteTrack) {
        let participant = self.entry(&track.participant_id);
        match track.kind {
            MediaType::Audio => participant.audio_track = Some(track),
            MediaType::Video => participant.video_track = Some(track),
        }
    }

    /// Clears the media reference but keeps the participant.
    pub fn on_unpublished(&mut self, id: &str, media: MediaType) {
        let participant = self.entry(id);
        match media {
            MediaType::Audio => participant.audio_track = None,
            MediaType::Video => participant.video_track = None,
        }
    }

    pub fn on_left(&mut self, id: &str) {
        self.participants.retain(|p| p.id != id);
    }

    pub fn participant(&self, id: &str) -> Option<&RemoteParticipant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participants(&self) -> &[RemoteParticipant] {
        &self.participants
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// True when at least one participant publishes audio or video.
    pub fn has_live_media(&self) -> bool {
        self.participants.iter().any(RemoteParticipant::has_media)
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    fn entry(&mut self, id: &str) -> &mut RemoteParticipant {
        let index = match self.participants.iter().position(|p| p.id == id) {
            Some(index) => index,
            None => {
                self.participants.push(RemoteParticipant::new(id));
                self.participants.len() - 1
            }
        };
        &mut self.participants[index]
    }
}
