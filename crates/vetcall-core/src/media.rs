use std::sync::Arc;

use crate::errors::CallError;
use crate::transport::{DeviceInfo, LocalAudioTrack, LocalTrack, LocalVideoTrack, MediaDevices};

/// Which way a camera faces, guessed from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
    Unknown,
}

/// Best-effort facing guess from a device label.
///
/// Labels are platform strings ("Front Camera", "camera2 1, facing back",
/// "FaceTime HD Camera"); nothing guarantees they describe the physical
/// camera. Anything without a recognised keyword is `Unknown`.
pub fn classify_camera(label: &str) -> CameraFacing {
    let label = label.to_lowercase();
    if label.contains("front") || label.contains("user") {
        CameraFacing::Front
    } else if label.contains("back") || label.contains("environment") {
        CameraFacing::Back
    } else {
        CameraFacing::Unknown
    }
}

/// Pick the camera `switch_camera` should move to.
///
/// Front/back are swapped when both exist. Otherwise cycles to the next
/// device in enumeration order; that fallback does not necessarily change
/// the physical facing.
pub fn next_camera<'a>(devices: &'a [DeviceInfo], active: Option<&str>) -> Option<&'a DeviceInfo> {
    if devices.len() < 2 {
        return None;
    }

    let current = active.and_then(|id| devices.iter().position(|d| d.device_id == id));
    if let Some(idx) = current {
        let wanted = match classify_camera(&devices[idx].label) {
            CameraFacing::Front => Some(CameraFacing::Back),
            CameraFacing::Back => Some(CameraFacing::Front),
            CameraFacing::Unknown => None,
        };
        if let Some(wanted) = wanted {
            if let Some(target) = devices
                .iter()
                .enumerate()
                .find(|(i, d)| *i != idx && classify_camera(&d.label) == wanted)
                .map(|(_, d)| d)
            {
                return Some(target);
            }
        }
    }

    let next = current.map_or(0, |idx| (idx + 1) % devices.len());
    devices.get(next)
}

/// Owns the local microphone and camera tracks.
///
/// Tracks are created once per session. Enabling/disabling mutes the
/// hardware capture; tracks are only destroyed by `release`.
pub struct MediaTrackManager {
    devices: Arc<dyn MediaDevices>,
    audio: Option<Arc<dyn LocalAudioTrack>>,
    video: Option<Arc<dyn LocalVideoTrack>>,
    audio_enabled: bool,
    video_enabled: bool,
    active_camera: Option<String>,
}

impl MediaTrackManager {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            audio: None,
            video: None,
            audio_enabled: false,
            video_enabled: false,
            active_camera: None,
        }
    }

    /// Create the microphone and camera tracks.
    ///
    /// Calling again after success returns the existing tracks.
    pub async fn create_local_tracks(&mut self) -> Result<Vec<LocalTrack>, CallError> {
        if let (Some(audio), Some(video)) = (&self.audio, &self.video) {
            tracing::debug!("local tracks already created");
            return Ok(vec![LocalTrack::Audio(audio.clone()), LocalTrack::Video(video.clone())]);
        }

        let audio = match &self.audio {
            Some(audio) => audio.clone(),
            None => {
                let audio = self.devices.create_microphone_track().await?;
                self.audio = Some(audio.clone());
                self.audio_enabled = true;
                audio
            }
        };

        let video = self.devices.create_camera_track().await?;
        self.active_camera = video.device_id();
        self.video = Some(video.clone());
        self.video_enabled = true;

        tracing::info!(
            "local tracks created (camera: {})",
            self.active_camera.as_deref().unwrap_or("default")
        );
        Ok(vec![LocalTrack::Audio(audio), LocalTrack::Video(video)])
    }

    pub fn has_tracks(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }

    pub fn video_track(&self) -> Option<Arc<dyn LocalVideoTrack>> {
        self.video.clone()
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn active_camera(&self) -> Option<&str> {
        self.active_camera.as_deref()
    }

    pub async fn set_audio_enabled(&mut self, enabled: bool) -> Result<(), CallError> {
        let track = self
            .audio
            .as_ref()
            .ok_or_else(|| CallError::Session("no local audio track".into()))?;
        track.set_enabled(enabled).await?;
        self.audio_enabled = enabled;
        tracing::info!("microphone enabled: {enabled}");
        Ok(())
    }

    pub async fn set_video_enabled(&mut self, enabled: bool) -> Result<(), CallError> {
        let track = self
            .video
            .as_ref()
            .ok_or_else(|| CallError::Session("no local video track".into()))?;
        track.set_enabled(enabled).await?;
        self.video_enabled = enabled;
        tracing::info!("camera enabled: {enabled}");
        Ok(())
    }

    /// Move the camera track to the "other" camera.
    ///
    /// Fails with `Device` and leaves the active camera unchanged when fewer
    /// than two cameras exist or the device cannot be opened.
    pub async fn switch_camera(&mut self) -> Result<DeviceInfo, CallError> {
        let track = self
            .video
            .clone()
            .ok_or_else(|| CallError::Session("no local video track".into()))?;

        let devices = self
            .devices
            .list_cameras()
            .await
            .map_err(|e| CallError::Device(format!("listing cameras: {e}")))?;

        let target = next_camera(&devices, self.active_camera.as_deref())
            .cloned()
            .ok_or_else(|| {
                CallError::Device(format!("no other camera to switch to ({} found)", devices.len()))
            })?;

        track.set_device(&target.device_id).await.map_err(|e| match e {
            CallError::Device(_) => e,
            other => CallError::Device(other.to_string()),
        })?;

        tracing::info!(
            "switched camera to {} ({:?})",
            target.label,
            classify_camera(&target.label)
        );
        self.active_camera = Some(target.device_id.clone());
        Ok(target)
    }

    /// Stop and release both tracks.
    pub fn release(&mut self) {
        if let Some(audio) = self.audio.take() {
            audio.close();
        }
        if let Some(video) = self.video.take() {
            video.close();
        }
        self.audio_enabled = false;
        self.video_enabled = false;
        self.active_camera = None;
        tracing::info!("local tracks released");
    }
}
