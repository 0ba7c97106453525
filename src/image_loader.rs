use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat, RgbaImage};

/// JPEG quality for photos written into the library (0-100).
const SAVE_JPEG_QUALITY: u8 = 92;

/// Decode an encoded image held in memory. Animated GIFs yield their first frame.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => {
            image::load_from_memory_with_format(bytes, fmt).context("Failed to decode image")
        }
        None => image::load_from_memory(bytes).context("Failed to decode image"),
    }
}

/// Encode pixels as JPEG for storage. Alpha is dropped.
pub fn encode_jpeg(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, SAVE_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;
    Ok(out)
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
