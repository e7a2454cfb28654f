// blend.rs -- Multi-band (Laplacian pyramid) blending of two color images.
//
// Each image is split into frequency bands. Each band is blended with a
// mask smoothed to that band's scale, then the bands are summed back. Low
// frequencies mix over a wide transition and high frequencies over a
// narrow one, which hides the seam between the two sources.
//
//   for each plane c in B, G, R:
//     L_left  = Laplacian(left[c])       L_right = Laplacian(right[c])
//     G_mask  = Gaussian(mask)           (shared by the three planes)
//     L_out[k] = L_left[k] * G_mask[k] + L_right[k] * (1 - G_mask[k])
//     out[c]  = collapse(L_out)
//
// The number of levels is capped at 1 + floor(log2(min(w, h))), the depth
// at which the smallest level is 1 pixel on its short side.

use serde::{Deserialize, Serialize};
use tracing::debug_span;

use crate::error::{Error, Result};
use crate::image::{ensure_same_size, BgrImage, Image};
use crate::pyramid::{max_levels, GaussianPyramid, LaplacianPyramid, DEFAULT_SIGMA};

/// Blend parameters as stored in a pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Requested pyramid depth. Capped by the image size.
    pub levels: usize,
    /// Smoothing sigma between levels.
    pub sigma: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        BlendConfig { levels: 20, sigma: DEFAULT_SIGMA }
    }
}

/// Blends `left` over `right` under `mask`.
///
/// Mask 1.0 selects `left`, 0.0 selects `right`. Construction validates the
/// inputs. `blend` consumes the blender.
pub struct LaplacianBlender<'a> {
    left: &'a BgrImage<f32>,
    right: &'a BgrImage<f32>,
    mask: &'a Image<f32>,
    levels: usize,
    sigma: f32,
}

impl<'a> LaplacianBlender<'a> {
    pub fn new(
        left: &'a BgrImage<f32>,
        right: &'a BgrImage<f32>,
        mask: &'a Image<f32>,
        level_count: usize,
    ) -> Result<Self> {
        if left.is_empty() {
            return Err(Error::EmptyImage);
        }
        ensure_same_size(left.dimensions(), right.dimensions())?;
        ensure_same_size(left.dimensions(), mask.dimensions())?;
        if level_count == 0 {
            return Err(Error::invalid("level_count", level_count));
        }
        Ok(LaplacianBlender { left, right, mask, levels: level_count, sigma: DEFAULT_SIGMA })
    }

    /// Build from a `BlendConfig`.
    pub fn from_config(
        left: &'a BgrImage<f32>,
        right: &'a BgrImage<f32>,
        mask: &'a Image<f32>,
        config: &BlendConfig,
    ) -> Result<Self> {
        Self::new(left, right, mask, config.levels)?.with_sigma(config.sigma)
    }

    /// Override the smoothing sigma (default 1.0).
    pub fn with_sigma(mut self, sigma: f32) -> Result<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(Error::invalid("sigma", sigma));
        }
        self.sigma = sigma;
        Ok(self)
    }

    /// Levels that will actually be built.
    pub fn effective_levels(&self) -> usize {
        let (w, h) = self.left.dimensions();
        self.levels.min(max_levels(w, h))
    }

    pub fn blend(self) -> BgrImage<f32> {
        let (w, h) = self.left.dimensions();
        let levels = self.effective_levels();
        let _span = debug_span!("laplacian_blend", width = w, height = h, levels).entered();

        let mask_pyr = GaussianPyramid::build(self.mask, levels, self.sigma);

        let mut out = BgrImage::new(w, h);
        for c in 0..3 {
            let plane = blend_plane(
                self.left.plane(c),
                self.right.plane(c),
                &mask_pyr,
                levels,
                self.sigma,
            );
            out.plane_mut(c).paste(&plane, 0, 0);
        }
        out
    }
}

/// Construct a blender and run it.
pub fn laplacian_blend(
    left: &BgrImage<f32>,
    right: &BgrImage<f32>,
    mask: &Image<f32>,
    level_count: usize,
) -> Result<BgrImage<f32>> {
    Ok(LaplacianBlender::new(left, right, mask, level_count)?.blend())
}

fn blend_plane(
    left: &Image<f32>,
    right: &Image<f32>,
    mask_pyr: &GaussianPyramid,
    levels: usize,
    sigma: f32,
) -> Image<f32> {
    let lap_l = LaplacianPyramid::build(left, levels, sigma);
    let lap_r = LaplacianPyramid::build(right, levels, sigma);

    let residuals = lap_l
        .residuals
        .iter()
        .zip(&lap_r.residuals)
        .enumerate()
        .map(|(k, (l, r))| weighted_sum(l, r, mask_pyr.level(k)))
        .collect();
    let smallest = weighted_sum(&lap_l.smallest, &lap_r.smallest, mask_pyr.level(levels - 1));

    LaplacianPyramid { residuals, smallest }.reconstruct()
}

/// `l * m + r * (1 - m)` per pixel.
fn weighted_sum(l: &Image<f32>, r: &Image<f32>, m: &Image<f32>) -> Image<f32> {
    debug_assert_eq!(l.dimensions(), m.dimensions());
    debug_assert_eq!(r.dimensions(), m.dimensions());
    let mut out = Image::new(l.width(), l.height());
    for y in 0..l.height() {
        let src = l.row(y).iter().zip(r.row(y)).zip(m.row(y));
        for (o, ((&lv, &rv), &mv)) in out.row_mut(y).iter_mut().zip(src) {
            *o = lv * mv + rv * (1.0 - mv);
        }
    }
    out
}
