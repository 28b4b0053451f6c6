//! ffmpeg MJPEG pipe source
//!
//! Runs ffmpeg with `-f image2pipe -vcodec mjpeg` and splits its stdout on
//! JPEG SOI/EOI markers. The child is spawned with `kill_on_drop`, so dropping
//! the source stops ffmpeg.

use super::{fit_frame, Frame, FrameSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const READ_CHUNK: usize = 64 * 1024;
/// Drop buffered bytes past this size if no complete frame was found
const MAX_BUFFER: usize = 16 * 1024 * 1024;
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// ffmpeg-backed frame source
pub struct FfmpegPipeSource {
    label: String,
    _child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
    width: u32,
    height: u32,
    read_timeout: Duration,
}

impl FfmpegPipeSource {
    pub fn rtsp(url: &str, width: u32, height: u32) -> Result<Self> {
        Self::spawn(
            format!("rtsp:{}", url),
            &["-rtsp_transport", "tcp", "-i", url],
            width,
            height,
        )
    }

    pub fn webcam(device: &str, width: u32, height: u32) -> Result<Self> {
        Self::spawn(format!("webcam:{}", device), &["-f", "v4l2", "-i", device], width, height)
    }

    /// Played back at native rate (`-re`)
    pub fn video_file(path: &str, width: u32, height: u32) -> Result<Self> {
        Self::spawn(format!("file:{}", path), &["-re", "-i", path], width, height)
    }

    fn spawn(label: String, input_args: &[&str], width: u32, height: u32) -> Result<Self> {
        let scale = format!("scale={}:{}", width, height);
        let mut child = Command::new("ffmpeg")
            .args(input_args)
            .args(["-vf", scale.as_str()])
            .args(["-f", "image2pipe", "-vcodec", "mjpeg", "-q:v", "5"])
            .args(["-loglevel", "error", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SourceUnavailable(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;

        tracing::debug!(source = %label, "ffmpeg started");

        Ok(Self {
            label,
            _child: child,
            stdout,
            buf: Vec::with_capacity(READ_CHUNK * 4),
            width,
            height,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegPipeSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            while let Some(jpeg) = take_jpeg(&mut self.buf) {
                match decode_jpeg(jpeg, self.width, self.height).await {
                    Ok(image) => return Ok(Some(Frame::new(image))),
                    Err(Error::Image(e)) => {
                        tracing::warn!(
                            source = %self.label,
                            error = %e,
                            "Skipping undecodable frame"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }

            if self.buf.len() > MAX_BUFFER {
                tracing::warn!(
                    source = %self.label,
                    buffered = self.buf.len(),
                    "Discarding unframed bytes"
                );
                self.buf.clear();
            }

            let read = self.stdout.read(&mut chunk);
            let n = match tokio::time::timeout(self.read_timeout, read).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(Error::SourceUnavailable(format!(
                        "{}: read failed: {}",
                        self.label, e
                    )))
                }
                Err(_) => {
                    return Err(Error::SourceUnavailable(format!(
                        "{}: no data for {}s",
                        self.label,
                        self.read_timeout.as_secs()
                    )))
                }
            };

            if n == 0 {
                tracing::info!(source = %self.label, "ffmpeg stream ended");
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Decode and resize one frame on the blocking pool
async fn decode_jpeg(jpeg: Vec<u8>, width: u32, height: u32) -> Result<RgbImage> {
    let image = tokio::task::spawn_blocking(move || {
        image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map(|img| fit_frame(img, width, height))
    })
    .await
    .map_err(|e| Error::Internal(format!("frame decode task failed: {}", e)))??;
    Ok(image)
}

/// Remove and return the first complete JPEG (SOI..=EOI) in `buf`
///
/// Bytes before the SOI marker are discarded.
fn take_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = find_marker(buf, 0, 0xD8)?;
    let end = find_marker(buf, start + 2, 0xD9)?;
    let jpeg = buf[start..end + 2].to_vec();
    buf.drain(..end + 2);
    Some(jpeg)
}

fn find_marker(buf: &[u8], from: usize, marker: u8) -> Option<usize> {
    if buf.len() < 2 || from > buf.len() - 2 {
        return None;
    }
    (from..buf.len() - 1).find(|&i| buf[i] == 0xFF && buf[i + 1] == marker)
}
