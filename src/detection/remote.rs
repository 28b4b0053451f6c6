//! RemoteDetector - HTTP inference server adapter
//!
//! Posts each frame as a JPEG multipart upload and reads back labeled boxes.
//! The server is expected to answer `POST {base_url}/v1/detect` with
//! `{"detections": [{"label": "...", "x1": .., "y1": .., "x2": .., "y2": .., "conf": ..}]}`.

use super::types::RawDetection;
use super::Detector;
use crate::annotator::encode_jpeg;
use crate::error::{Error, Result};
use crate::frame_source::Frame;
use async_trait::async_trait;
use image::RgbImage;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

const UPLOAD_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

/// HTTP detector client
pub struct RemoteDetector {
    client: reqwest::Client,
    base_url: String,
    confidence: f32,
}

impl RemoteDetector {
    pub fn new(base_url: String, confidence: f32) -> Result<Self> {
        Self::with_timeout(base_url, confidence, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: String, confidence: f32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            confidence,
        })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(resp.status().is_success())
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let url = format!("{}/v1/detect", self.base_url);
        let jpeg = encode_upload(frame.image.clone()).await?;

        let form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("conf", self.confidence.to_string())
            .text("captured_at", frame.captured_at.to_rfc3339());

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detector(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detector(format!(
                "inference failed: {} - {}",
                status, body
            )));
        }

        let result: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detector(format!("invalid response: {}", e)))?;
        Ok(result.detections)
    }
}

/// JPEG-encode a frame on the blocking pool
async fn encode_upload(image: RgbImage) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_jpeg(&image, UPLOAD_JPEG_QUALITY))
        .await
        .map_err(|e| Error::Internal(format!("frame encode task failed: {}", e)))?
}
