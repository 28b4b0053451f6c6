//! Image directory source - still images played back in file-name order

use super::{fit_frame, Frame, FrameSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Directory-backed frame source
pub struct ImageDirectorySource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    width: u32,
    height: u32,
}

impl ImageDirectorySource {
    pub async fn open(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        tracing::debug!(dir = %dir.display(), files = files.len(), "Image directory scanned");

        Ok(Self {
            dir,
            pending: files.into(),
            width,
            height,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl FrameSource for ImageDirectorySource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.pending.pop_front() {
            let (w, h) = (self.width, self.height);
            let load_path = path.clone();
            let decoded = tokio::task::spawn_blocking(move || {
                image::open(&load_path).map(|img| fit_frame(img, w, h))
            })
            .await
            .map_err(|e| Error::Internal(format!("image decode task failed: {}", e)))?;

            match decoded {
                Ok(image) => return Ok(Some(Frame::new(image))),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable image");
                }
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("images:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("frames-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_plays_images_in_name_order() {
        let dir = scratch_dir();
        RgbImage::from_pixel(20, 10, Rgb([255, 0, 0]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(20, 10, Rgb([0, 0, 255]))
            .save(dir.join("a.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.join("c.jpg"), b"not a jpeg").unwrap();

        let mut source = ImageDirectorySource::open(&dir, 40, 20).await.unwrap();
        assert_eq!(source.remaining(), 3);

        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.image.dimensions(), (40, 20));
        let px = first.image.get_pixel(5, 5);
        assert!(px[2] > 200 && px[0] < 50);

        let second = source.next_frame().await.unwrap().unwrap();
        let px = second.image.get_pixel(5, 5);
        assert!(px[0] > 200 && px[2] < 50);

        // c.jpg is corrupt and skipped
        assert!(source.next_frame().await.unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let err = ImageDirectorySource::open("/nonexistent/frames", 640, 480)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}
