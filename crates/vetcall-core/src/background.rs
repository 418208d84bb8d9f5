use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::errors::CallError;
use crate::gradient;
use crate::transport::LocalVideoTrack;

/// Size of synthesized gradient backgrounds.
const RASTER_WIDTH: u32 = 1280;
const RASTER_HEIGHT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurDegree {
    Low,
    Medium,
    High,
}

/// Requested virtual background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VirtualBackgroundConfig {
    None,
    Blur(BlurDegree),
    /// URL or file path of the replacement image.
    Image(String),
    /// Compact gradient spec, see [`gradient::parse_gradient`].
    Gradient(String),
}

impl VirtualBackgroundConfig {
    pub fn kind(&self) -> BackgroundKind {
        match self {
            VirtualBackgroundConfig::None => BackgroundKind::None,
            VirtualBackgroundConfig::Blur(_) => BackgroundKind::Blur,
            VirtualBackgroundConfig::Image(_) => BackgroundKind::Image,
            VirtualBackgroundConfig::Gradient(_) => BackgroundKind::Gradient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundKind {
    None,
    Blur,
    Image,
    Gradient,
}

/// Options understood by the processing extension.
#[derive(Debug, Clone)]
pub enum ProcessorOptions {
    Blur(BlurDegree),
    Image(Arc<RgbaImage>),
}

/// A frame-processing stage provided by the background extension.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    fn id(&self) -> String;
    async fn init(&self) -> Result<(), CallError>;
    async fn set_options(&self, options: ProcessorOptions) -> Result<(), CallError>;
    async fn enable(&self) -> Result<(), CallError>;
    async fn disable(&self) -> Result<(), CallError>;
    /// Feed processed frames into the publish destination of `track_id`.
    fn pipe_to_destination(&self, track_id: &str);
    /// Disconnect the processor output.
    fn unpipe(&self);
}

#[async_trait]
pub trait BackgroundExtension: Send + Sync {
    fn check_compatibility(&self) -> bool;
    async fn create_processor(&self) -> Result<Arc<dyn FrameProcessor>, CallError>;
}

/// Resolves an image reference into pixels.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<RgbaImage, CallError>;
}

/// Loads images from `http(s)://` URLs or local paths.
pub struct SourceImageLoader {
    http: reqwest::Client,
}

impl SourceImageLoader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CallError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CallError::Processing(format!("image download: {e}")))?;
        if !resp.status().is_success() {
            return Err(CallError::Processing(format!(
                "image download returned status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CallError::Processing(format!("image download: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl Default for SourceImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageLoader for SourceImageLoader {
    async fn load(&self, source: &str) -> Result<RgbaImage, CallError> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch(source).await?
        } else {
            tokio::fs::read(source)
                .await
                .map_err(|e| CallError::Processing(format!("read image {source}: {e}")))?
        };
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| CallError::Processing(format!("decode image {source}: {e}")))?;
        Ok(decoded.to_rgba8())
    }
}

struct Attached {
    processor: Arc<dyn FrameProcessor>,
    track: Arc<dyn LocalVideoTrack>,
}

/// Attaches at most one background processor between the camera track and
/// its publish destination.
pub struct VirtualBackgroundPipeline {
    extension: Arc<dyn BackgroundExtension>,
    images: Arc<dyn ImageLoader>,
    raster_size: (u32, u32),
    attached: Option<Attached>,
    active: VirtualBackgroundConfig,
}

impl VirtualBackgroundPipeline {
    pub fn new(extension: Arc<dyn BackgroundExtension>, images: Arc<dyn ImageLoader>) -> Self {
        Self {
            extension,
            images,
            raster_size: (RASTER_WIDTH, RASTER_HEIGHT),
            attached: None,
            active: VirtualBackgroundConfig::None,
        }
    }

    pub fn with_raster_size(mut self, width: u32, height: u32) -> Self {
        self.raster_size = (width, height);
        self
    }

    pub fn active(&self) -> &VirtualBackgroundConfig {
        &self.active
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Replace the current background with `config`.
    ///
    /// The previous processor is fully detached first. On any failure the
    /// pipeline is left in pass-through (`None`) and a `Processing` error is
    /// returned.
    pub async fn apply(
        &mut self,
        track: Arc<dyn LocalVideoTrack>,
        config: VirtualBackgroundConfig,
    ) -> Result<(), CallError> {
        if let Err(e) = self.detach().await {
            tracing::warn!("detaching previous background: {e}");
        }

        if config == VirtualBackgroundConfig::None {
            tracing::info!("virtual background cleared");
            return Ok(());
        }

        match self.attach(track, &config).await {
            Ok(()) => {
                tracing::info!("virtual background applied: {:?}", config.kind());
                self.active = config;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("virtual background failed, rolling back: {e}");
                if let Err(detach_err) = self.detach().await {
                    tracing::warn!("rollback detach: {detach_err}");
                }
                Err(as_processing(e))
            }
        }
    }

    /// Disable the processor, unpipe it, then unpipe the track.
    ///
    /// Both pipe edges are always removed; a failed `disable` is reported
    /// after the unpiping is done.
    pub async fn detach(&mut self) -> Result<(), CallError> {
        self.active = VirtualBackgroundConfig::None;
        let Some(Attached { processor, track }) = self.attached.take() else {
            return Ok(());
        };

        let disabled = processor.disable().await;
        processor.unpipe();
        track.unpipe();
        tracing::debug!("background processor {} detached", processor.id());
        disabled.map_err(as_processing)
    }

    async fn attach(
        &mut self,
        track: Arc<dyn LocalVideoTrack>,
        config: &VirtualBackgroundConfig,
    ) -> Result<(), CallError> {
        if !self.extension.check_compatibility() {
            return Err(CallError::Processing(
                "virtual background is not supported on this device".into(),
            ));
        }

        let processor = self.extension.create_processor().await?;
        processor.init().await?;

        track.pipe(processor.clone());
        processor.pipe_to_destination(&track.track_id());
        self.attached = Some(Attached {
            processor: processor.clone(),
            track,
        });

        let options = self.options_for(config).await?;
        processor.set_options(options).await?;
        processor.enable().await
    }

    async fn options_for(&self, config: &VirtualBackgroundConfig) -> Result<ProcessorOptions, CallError> {
        match config {
            VirtualBackgroundConfig::Blur(degree) => Ok(ProcessorOptions::Blur(*degree)),
            VirtualBackgroundConfig::Image(source) => {
                let img = self.images.load(source).await?;
                Ok(ProcessorOptions::Image(Arc::new(img)))
            }
            VirtualBackgroundConfig::Gradient(spec) => {
                let parsed = gradient::parse_gradient(spec)?;
                let (w, h) = self.raster_size;
                Ok(ProcessorOptions::Image(Arc::new(gradient::render(&parsed, w, h))))
            }
            VirtualBackgroundConfig::None => Err(CallError::Processing("no background to configure".into())),
        }
    }
}

fn as_processing(e: CallError) -> CallError {
    match e {
        CallError::Processing(_) => e,
        other => CallError::Processing(other.to_string()),
    }
}
