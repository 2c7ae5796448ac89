//! JPEG encode/decode, box overlays and caption text.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView, Rgb, RgbImage};

use crate::detect::PersonBox;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const CAPTION_ORIGIN: (u32, u32) = (10, 10);
const GLYPH_WIDTH: u32 = 5;
const GLYPH_ADVANCE: u32 = 6;

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    encode_rgb(frame.pixels(), frame.width, frame.height, quality)
}

pub fn encode_image(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    encode_rgb(image.as_raw(), image.width(), image.height(), quality)
}

fn encode_rgb(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(pixels.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(pixels, width, height, ExtendedColorType::Rgb8)
        .context("encode jpeg")?;
    Ok(out)
}

/// Decode any image the `image` crate recognizes (JPEG in practice) to an RGB8
/// frame.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    Frame::new(image.into_rgb8().into_raw(), width, height)
}

/// Copy of `frame` with a 2px green rectangle around each box.
pub fn draw_boxes(frame: &Frame, boxes: &[PersonBox]) -> Result<RgbImage> {
    let mut image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    for b in boxes {
        draw_rect(&mut image, b);
    }
    Ok(image)
}

fn draw_rect(image: &mut RgbImage, b: &PersonBox) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let x1 = b.x1.min(width - 1);
    let y1 = b.y1.min(height - 1);
    let x2 = b.x2.min(width - 1);
    let y2 = b.y2.min(height - 1);
    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put(image, x, y1.saturating_add(t));
            put(image, x, y2.saturating_sub(t));
        }
        for y in y1..=y2 {
            put(image, x1.saturating_add(t), y);
            put(image, x2.saturating_sub(t), y);
        }
    }
}

/// Draw `text` in a 5x7 bitmap font near the top-left corner. Characters
/// outside digits, `:`, space and the letters of "Persons" are skipped.
pub fn draw_caption(image: &mut RgbImage, text: &str) {
    let (mut x, y) = CAPTION_ORIGIN;
    for ch in text.chars() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        for (dy, row) in rows.iter().enumerate() {
            for dx in 0..GLYPH_WIDTH {
                if row & (1 << (GLYPH_WIDTH - 1 - dx)) != 0 {
                    put(image, x + dx, y + dy as u32);
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

fn put(image: &mut RgbImage, x: u32, y: u32) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32) -> Frame {
        Frame::new(vec![128; (width * height * 3) as usize], width, height).unwrap()
    }

    #[test]
    fn jpeg_keeps_dimensions() -> Result<()> {
        let frame = gray(32, 16);
        let jpeg = encode_jpeg(&frame, 80)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode(&jpeg)?;
        assert_eq!((decoded.width, decoded.height), (32, 16));
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"not an image").is_err());
    }

    #[test]
    fn boxes_are_green_and_frame_is_untouched() -> Result<()> {
        let frame = gray(20, 20);
        let boxed = draw_boxes(
            &frame,
            &[PersonBox {
                x1: 2,
                y1: 2,
                x2: 10,
                y2: 12,
                confidence: 0.9,
            }],
        )?;
        assert_eq!(*boxed.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*boxed.get_pixel(3, 7), BOX_COLOR);
        assert_eq!(*boxed.get_pixel(10, 12), BOX_COLOR);
        assert_eq!(*boxed.get_pixel(6, 7), Rgb([128, 128, 128]));
        assert!(frame.pixels().iter().all(|&p| p == 128));
        Ok(())
    }

    #[test]
    fn caption_draws_count_in_top_left() {
        let mut image = RgbImage::from_pixel(100, 30, Rgb([0, 0, 0]));
        draw_caption(&mut image, "Persons: 1");
        // Top bar of the 'P'.
        assert_eq!(*image.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*image.get_pixel(13, 10), BOX_COLOR);
        assert_eq!(*image.get_pixel(9, 9), Rgb([0, 0, 0]));
        // '1' is the tenth glyph; its stem sits at column 2.
        assert_eq!(*image.get_pixel(10 + 9 * 6 + 2, 13), BOX_COLOR);
        assert!(image.pixels().skip(30 * 100 - 100).all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn caption_is_clipped_on_tiny_frames() {
        let mut image = RgbImage::from_pixel(12, 12, Rgb([0, 0, 0]));
        draw_caption(&mut image, "Persons: 42");
        assert_eq!(*image.get_pixel(10, 10), BOX_COLOR);
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() -> Result<()> {
        let frame = gray(8, 8);
        let boxed = draw_boxes(
            &frame,
            &[PersonBox {
                x1: 0,
                y1: 0,
                x2: 50,
                y2: 50,
                confidence: 0.9,
            }],
        )?;
        assert_eq!(*boxed.get_pixel(7, 7), BOX_COLOR);
        Ok(())
    }
}
