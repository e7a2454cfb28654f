// convert.rs -- Pixel type conversions for gray and color images.
//
//   u8  -> f32  normalized to [0, 1] (blending works in this scale)
//   f32 -> u8   denormalized, clamped and rounded (display boundary)
//   f32 -> u8   raw, clamped and rounded (gain-corrected 8-bit frames)
//   BGR -> gray ITU-R BT.601 luma
//
// The Pixel trait's to_f32/from_f32 are RAW conversions (u8 42 -> 42.0).
// Clamping happens only here, never inside the gain transform or blender.

use crate::image::{BgrImage, Image, Pixel};

/// Convert an Image<u8> to Image<f32> with values in [0.0, 1.0].
pub fn u8_to_f32_normalized(src: &Image<u8>) -> Image<f32> {
    src.map(|v| v as f32 / 255.0)
}

/// Convert an Image<f32> (assumed [0.0, 1.0]) to Image<u8>.
/// Values are clamped to [0, 255] and rounded.
pub fn f32_normalized_to_u8(src: &Image<f32>) -> Image<u8> {
    src.map(|v| u8::from_f32(v * 255.0))
}

/// 8-bit color frame to normalized f32 planes.
pub fn bgr_u8_to_f32_normalized(src: &BgrImage<u8>) -> BgrImage<f32> {
    src.map(|v| v as f32 / 255.0)
}

/// Normalized f32 color image back to 8 bits, clamping out-of-range values.
pub fn bgr_f32_normalized_to_u8(src: &BgrImage<f32>) -> BgrImage<u8> {
    src.map(|v| u8::from_f32(v * 255.0))
}

/// Raw-scale f32 color image (0..255) to 8 bits, clamping.
///
/// This is how a gain-corrected frame returns to capture format.
pub fn bgr_f32_raw_to_u8(src: &BgrImage<f32>) -> BgrImage<u8> {
    src.map(u8::from_f32)
}

/// Grayscale from a color image, Y = 0.299 R + 0.587 G + 0.114 B.
///
/// Output keeps the input scale (raw 8-bit input gives 0..255).
pub fn bgr_to_gray<T: Pixel>(src: &BgrImage<T>) -> Image<f32> {
    let [b, g, r] = src.planes();
    let mut gray = Image::new(src.width(), src.height());
    for y in 0..src.height() {
        let rows = b.row(y).iter().zip(g.row(y)).zip(r.row(y));
        for (dst, ((&bv, &gv), &rv)) in gray.row_mut(y).iter_mut().zip(rows) {
            *dst = 0.299 * rv.to_f32() + 0.587 * gv.to_f32() + 0.114 * bv.to_f32();
        }
    }
    gray
}
