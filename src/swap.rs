// swap.rs -- Per-frame mouth swap between two camera feeds.
//
// For each direction the other feed's mouth box is rescaled to this feed's
// mouth width (height follows the same ratio), pasted at this feed's mouth
// position, and blended back over the untouched frame under an elliptical
// mask. A direction whose rescaled box would spill over the frame edge is
// skipped.

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::blend::{BlendConfig, LaplacianBlender};
use crate::convert::{bgr_f32_raw_to_u8, bgr_u8_to_f32_normalized};
use crate::error::{Error, Result};
use crate::gain::{apply, GainTransform};
use crate::image::{resize_bgr, BgrImage};
use crate::mask::{mouth_mask, DEFAULT_BLEND_RANGE};
use crate::region::{MouthLocator, Rect};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub blend: BlendConfig,
    /// Pixels per axis between the pasted box and the mask ellipse.
    pub blend_range: i32,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig { blend: BlendConfig::default(), blend_range: DEFAULT_BLEND_RANGE }
    }
}

/// Blended frames in normalized [0, 1] scale. None where a direction was
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct SwapOutput {
    /// Frame A wearing B's mouth.
    pub a: Option<BgrImage<f32>>,
    /// Frame B wearing A's mouth.
    pub b: Option<BgrImage<f32>>,
}

/// Swap the mouth regions of two frames.
///
/// Regions must lie inside their frames (`InvalidParameter` otherwise).
pub fn swap_mouths(
    frame_a: &BgrImage<u8>,
    frame_b: &BgrImage<u8>,
    region_a: Rect,
    region_b: Rect,
    config: &SwapConfig,
) -> Result<SwapOutput> {
    for (frame, region) in [(frame_a, region_a), (frame_b, region_b)] {
        if !region.fits_in(frame.width(), frame.height()) {
            return Err(Error::invalid("region", format!("{region:?}")));
        }
    }
    Ok(SwapOutput {
        a: paste_and_blend(frame_a, region_a, frame_b, region_b, config)?,
        b: paste_and_blend(frame_b, region_b, frame_a, region_a, config)?,
    })
}

/// Put `src`'s mouth into `dst` and blend.
fn paste_and_blend(
    dst: &BgrImage<u8>,
    dst_region: Rect,
    src: &BgrImage<u8>,
    src_region: Rect,
    config: &SwapConfig,
) -> Result<Option<BgrImage<f32>>> {
    let roi = src.crop(
        src_region.x as usize,
        src_region.y as usize,
        src_region.width as usize,
        src_region.height as usize,
    );

    let ratio = dst_region.width as f64 / src_region.width as f64;
    let new_w = (roi.width() as f64 * ratio).round() as usize;
    let new_h = (roi.height() as f64 * ratio).round() as usize;
    let (x, y) = (dst_region.x as usize, dst_region.y as usize);
    if new_w == 0 || new_h == 0 || x + new_w > dst.width() || y + new_h > dst.height() {
        debug!(new_w, new_h, ?dst_region, "rescaled mouth does not fit, skipping");
        return Ok(None);
    }

    let scaled = resize_bgr(&roi, new_w, new_h);
    let mut pasted = dst.clone();
    pasted.paste(&scaled, x, y);

    let pasted_rect = Rect::new(dst_region.x, dst_region.y, new_w as i32, new_h as i32);
    let mask = mouth_mask(dst.width(), dst.height(), pasted_rect, config.blend_range);

    let left = bgr_u8_to_f32_normalized(&pasted);
    let right = bgr_u8_to_f32_normalized(dst);
    let blended = LaplacianBlender::from_config(&left, &right, &mask, &config.blend)?.blend();
    Ok(Some(blended))
}

/// Runs gain correction, mouth location and the swap for a frame pair.
pub struct MouthSwapper<'a> {
    locator: MouthLocator<'a>,
    transform: Option<GainTransform>,
    config: SwapConfig,
}

impl<'a> MouthSwapper<'a> {
    pub fn new(locator: MouthLocator<'a>, config: SwapConfig) -> Self {
        MouthSwapper { locator, transform: None, config }
    }

    /// Gain transform applied to the second feed before locating mouths.
    pub fn with_transform(mut self, transform: GainTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn transform(&self) -> Option<&GainTransform> {
        self.transform.as_ref()
    }

    /// Second feed after gain correction, back in 8-bit.
    pub fn correct(&self, frame_b: &BgrImage<u8>) -> Result<BgrImage<u8>> {
        match &self.transform {
            Some(t) => Ok(bgr_f32_raw_to_u8(&apply(frame_b, t)?)),
            None => Ok(frame_b.clone()),
        }
    }

    /// One frame step. Both outputs are None when either mouth is missing.
    pub fn process(&self, frame_a: &BgrImage<u8>, frame_b: &BgrImage<u8>) -> Result<SwapOutput> {
        let _span = debug_span!("swap_frame").entered();
        let frame_b = self.correct(frame_b)?;

        let (Some(ra), Some(rb)) = (self.locator.locate(frame_a), self.locator.locate(&frame_b)) else {
            debug!("mouth missing in at least one frame");
            return Ok(SwapOutput::default());
        };
        swap_mouths(frame_a, &frame_b, ra.roi(), rb.roi(), &self.config)
    }
}
