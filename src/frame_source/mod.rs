//! FrameSource - video acquisition seam
//!
//! ## Responsibilities
//!
//! - `FrameSource` trait consumed by the stream loop
//! - Source configuration (RTSP, webcam, video file, image directory)
//! - Connection test: open a source and read a single frame
//!
//! `Ok(None)` from `next_frame` means the source is exhausted or disconnected.

mod directory;
mod ffmpeg;

pub use directory::ImageDirectorySource;
pub use ffmpeg::FfmpegPipeSource;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default webcam device
pub const DEFAULT_WEBCAM_DEVICE: &str = "/dev/video0";

/// Decoded frame, already resized to the processing resolution
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Frame producer
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rtsp,
    Webcam,
    /// Uploaded / local video file
    Upload,
    /// Directory of still images, played in name order
    Images,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_type: SourceType,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default)]
    pub video_file: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

impl SourceConfig {
    pub fn rtsp(url: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Rtsp,
            rtsp_url: Some(url.into()),
            video_file: None,
            device: None,
            directory: None,
        }
    }

    /// Check that the field required by the source type is present
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| -> Result<()> {
            Err(Error::Validation(format!(
                "{} is required for source type {:?}",
                field, self.source_type
            )))
        };
        match self.source_type {
            SourceType::Rtsp if non_empty(&self.rtsp_url).is_none() => missing("rtsp_url"),
            SourceType::Upload if non_empty(&self.video_file).is_none() => missing("video_file"),
            SourceType::Images if non_empty(&self.directory).is_none() => missing("directory"),
            _ => Ok(()),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Open the configured source at the given processing resolution
pub async fn open_source(
    config: &SourceConfig,
    width: u32,
    height: u32,
) -> Result<Box<dyn FrameSource>> {
    config.validate()?;

    let source: Box<dyn FrameSource> = match config.source_type {
        SourceType::Rtsp => {
            let url = non_empty(&config.rtsp_url).unwrap_or_default();
            Box::new(FfmpegPipeSource::rtsp(url, width, height)?)
        }
        SourceType::Webcam => {
            let device = non_empty(&config.device).unwrap_or(DEFAULT_WEBCAM_DEVICE);
            Box::new(FfmpegPipeSource::webcam(device, width, height)?)
        }
        SourceType::Upload => {
            let path = non_empty(&config.video_file).unwrap_or_default();
            Box::new(FfmpegPipeSource::video_file(path, width, height)?)
        }
        SourceType::Images => {
            let dir = non_empty(&config.directory).unwrap_or_default();
            Box::new(ImageDirectorySource::open(dir, width, height).await?)
        }
    };

    tracing::info!(source = %source.describe(), width, height, "Frame source opened");
    Ok(source)
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// Open the source and read one frame within `timeout`
pub async fn test_connection(
    config: &SourceConfig,
    width: u32,
    height: u32,
    timeout: Duration,
) -> Result<ConnectionReport> {
    let mut source = open_source(config, width, height).await?;
    let described = source.describe();

    match tokio::time::timeout(timeout, source.next_frame()).await {
        Ok(Ok(Some(frame))) => Ok(ConnectionReport {
            source: described,
            width: frame.width(),
            height: frame.height(),
        }),
        Ok(Ok(None)) => Err(Error::SourceUnavailable(format!(
            "{} produced no frames",
            described
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::SourceUnavailable(format!(
            "{} timed out after {}s",
            described,
            timeout.as_secs()
        ))),
    }
}

/// Convert and resize a decoded image to the processing resolution
pub(crate) fn fit_frame(image: DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    if rgb.dimensions() == (width, height) || width == 0 || height == 0 {
        return rgb;
    }
    image::imageops::resize(&rgb, width, height, FilterType::Triangle)
}
