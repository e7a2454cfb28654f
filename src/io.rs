// io.rs -- Image and transform files.
//
// Decoding and encoding go through the `image` crate (PNG, JPEG, BMP).
// Files store RGB; in memory frames are BGR, so channels are swapped on the
// way in and out. Transforms are stored as JSON so a session can skip
// calibration.

use std::path::Path;

use tracing::debug;

use crate::convert::bgr_f32_normalized_to_u8;
use crate::error::Result;
use crate::gain::GainTransform;
use crate::image::{BgrImage, Image};

/// Read a color image file as an 8-bit BGR frame.
pub fn load_bgr(path: &Path) -> Result<BgrImage<u8>> {
    let rgb = ::image::open(path)?.to_rgb8();
    let (w, h) = rgb.dimensions();
    debug!(path = %path.display(), width = w, height = h, "loaded image");
    Ok(BgrImage::from_fn(w as usize, h as usize, |x, y| {
        let [r, g, b] = rgb.get_pixel(x as u32, y as u32).0;
        [b, g, r]
    }))
}

/// Write an 8-bit BGR frame. The format follows the file extension.
pub fn save_bgr(path: &Path, img: &BgrImage<u8>) -> Result<()> {
    let (w, h) = img.dimensions();
    let rgb = ::image::RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let [b, g, r] = img.get(x as usize, y as usize);
        ::image::Rgb([r, g, b])
    });
    rgb.save(path)?;
    debug!(path = %path.display(), width = w, height = h, "saved image");
    Ok(())
}

/// Write a normalized [0, 1] color image, clamping to 8 bits.
pub fn save_bgr_normalized(path: &Path, img: &BgrImage<f32>) -> Result<()> {
    save_bgr(path, &bgr_f32_normalized_to_u8(img))
}

/// Read a mask file as luma normalized to [0, 1].
pub fn load_mask(path: &Path) -> Result<Image<f32>> {
    let luma = ::image::open(path)?.to_luma8();
    let (w, h) = luma.dimensions();
    Ok(Image::from_fn(w as usize, h as usize, |x, y| {
        luma.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0
    }))
}

pub fn save_transform(path: &Path, transform: &GainTransform) -> Result<()> {
    let json = serde_json::to_string_pretty(transform)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_transform(path: &Path) -> Result<GainTransform> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
