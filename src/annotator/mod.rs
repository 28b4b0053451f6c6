//! Annotator - frame overlays and JPEG encoding
//!
//! Each detection gets a category-coloured outline with a
//! `"{category} ({confidence:.2})"` label above it; the frame gets a capture
//! timestamp in the top-left corner.
//!
//! CPU-bound; the stream loop calls it through `spawn_blocking`.

use crate::detection::{Category, Detection};
use crate::error::Result;
use ab_glyph::FontRef;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::sync::OnceLock;

/// JPEG quality for published frames
pub const FRAME_JPEG_QUALITY: u8 = 80;

const OUTLINE_PX: i32 = 2;
const LABEL_SCALE: f32 = 14.0;
/// Label baseline offset above the box
const LABEL_OFFSET: i32 = LABEL_SCALE as i32 + 2;
const TIMESTAMP_SCALE: f32 = 18.0;
const TIMESTAMP_ORIGIN: (i32, i32) = (10, 10);
const TIMESTAMP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

static OVERLAY_FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

fn overlay_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(OVERLAY_FONT_BYTES) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = ?e, "Overlay font unreadable, drawing outlines only");
            None
        }
    })
    .as_ref()
}

pub fn category_color(category: Category) -> Rgb<u8> {
    match category {
        Category::Person => Rgb([0, 255, 0]),
        Category::Animal => Rgb([255, 0, 0]),
        Category::Vehicle => Rgb([0, 0, 255]),
    }
}

/// Draw one labelled outline per detection, clipped to the frame
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let font = overlay_font();

    for d in detections {
        let x1 = d.bbox.x1.max(0.0).min((w - 1) as f32) as i32;
        let y1 = d.bbox.y1.max(0.0).min((h - 1) as f32) as i32;
        let x2 = d.bbox.x2.max(0.0).min((w - 1) as f32) as i32;
        let y2 = d.bbox.y2.max(0.0).min((h - 1) as f32) as i32;
        let color = category_color(d.category);

        for inset in 0..OUTLINE_PX {
            let (left, top) = (x1 + inset, y1 + inset);
            let (right, bottom) = (x2 - inset, y2 - inset);
            if right <= left || bottom <= top {
                break;
            }
            let rect = Rect::at(left, top)
                .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        if let Some(font) = font {
            // no room above the box: label goes just inside the top edge
            let label_y = if y1 >= LABEL_OFFSET {
                y1 - LABEL_OFFSET
            } else {
                y1 + OUTLINE_PX + 1
            };
            let label = format!("{} ({:.2})", d.category.as_str(), d.confidence);
            draw_text_mut(image, color, x1, label_y, LABEL_SCALE, font, &label);
        }
    }
}

/// Capture time, local clock, top-left corner
pub fn draw_timestamp(image: &mut RgbImage, at: DateTime<Utc>) {
    let Some(font) = overlay_font() else {
        return;
    };
    let text = at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let (x, y) = TIMESTAMP_ORIGIN;
    draw_text_mut(image, TIMESTAMP_COLOR, x, y, TIMESTAMP_SCALE, font, &text);
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(buf)
}

/// Annotate a copy of the frame and return it as base64 JPEG
pub fn annotate_and_encode(
    image: &RgbImage,
    detections: &[Detection],
    captured_at: DateTime<Utc>,
) -> Result<String> {
    let mut annotated = image.clone();
    draw_detections(&mut annotated, detections);
    draw_timestamp(&mut annotated, captured_at);
    let jpeg = encode_jpeg(&annotated, FRAME_JPEG_QUALITY)?;
    Ok(STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn detection(category: Category, bbox: [f32; 4]) -> Detection {
        Detection {
            category,
            bbox: BBox::from(bbox),
            confidence: 0.9,
        }
    }

    fn lit_pixels(img: &RgbImage, rows: std::ops::Range<u32>) -> Vec<Rgb<u8>> {
        rows.flat_map(|y| (0..img.width()).map(move |x| (x, y)))
            .map(|(x, y)| *img.get_pixel(x, y))
            .filter(|p| p.0 != [0, 0, 0])
            .collect()
    }

    #[test]
    fn test_draws_outline_in_category_color() {
        let mut img = RgbImage::new(64, 64);
        draw_detections(&mut img, &[detection(Category::Animal, [10.0, 30.0, 40.0, 60.0])]);
        assert_eq!(*img.get_pixel(10, 30), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(11, 45), Rgb([255, 0, 0]));
        // interior untouched
        assert_eq!(*img.get_pixel(25, 45), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_drawn_above_box_in_category_color() {
        let mut img = RgbImage::new(128, 96);
        draw_detections(&mut img, &[detection(Category::Person, [20.0, 40.0, 100.0, 90.0])]);

        let label = lit_pixels(&img, 24..40);
        assert!(!label.is_empty());
        assert!(label.iter().all(|p| p[0] == 0 && p[1] > 0 && p[2] == 0));
        // nothing above the label
        assert!(lit_pixels(&img, 0..24).is_empty());
    }

    #[test]
    fn test_out_of_frame_box_is_clipped() {
        let mut img = RgbImage::new(32, 32);
        draw_detections(&mut img, &[detection(Category::Person, [-20.0, -5.0, 500.0, 500.0])]);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(31, 31), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_timestamp_overlay() {
        let mut img = RgbImage::new(320, 64);
        draw_timestamp(&mut img, Utc::now());

        let text = lit_pixels(&img, 10..30);
        assert!(text.len() > 20);
        assert!(text.iter().all(|p| p[0] == 0 && p[2] == 0));
        assert!(lit_pixels(&img, 0..10).is_empty());
        assert!(lit_pixels(&img, 30..64).is_empty());
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let img = RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
        let jpeg = encode_jpeg(&img, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let b64 = annotate_and_encode(&img, &[], Utc::now()).unwrap();
        let decoded = STANDARD.decode(b64).unwrap();
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }
}
