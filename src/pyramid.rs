// pyramid.rs -- Gaussian and Laplacian image pyramids.
//
// Gaussian level k+1 = downsample_2x(blur(level k)). Downsampling keeps
// every other pixel with floor division, so a 7x5 level becomes 3x2.
// Building stops early when either dimension would reach zero.
//
// Laplacian level k = G[k] - upsample(G[k+1], size of G[k]) for every level
// except the last. The last entry is the smallest Gaussian level itself.
// Reconstruction runs the same upsample in reverse, so the decomposition is
// exact up to f32 rounding regardless of how smooth `upsample_to` is.
//
// All levels are owned `Image<f32>` buffers allocated up front by `build`
// and dropped together with the pyramid.

use tracing::trace;

use crate::convolution::{convolve_separable, gaussian_kernel_for_sigma};
use crate::image::{resize_bilinear, Image, Pixel};

/// Default smoothing sigma between pyramid levels.
pub const DEFAULT_SIGMA: f32 = 1.0;

/// Number of levels a `width x height` image supports, counting level 0.
///
/// `1 + floor(log2(min(width, height)))` for a non-empty image, 0 otherwise.
pub fn max_levels(width: usize, height: usize) -> usize {
    let m = width.min(height);
    if m == 0 {
        return 0;
    }
    (usize::BITS - m.leading_zeros()) as usize
}

/// A Gaussian image pyramid.
///
/// `levels[0]` is the input converted to f32. `levels[n]` is about
/// `(width / 2^n, height / 2^n)`.
pub struct GaussianPyramid {
    pub levels: Vec<Image<f32>>,
}

impl GaussianPyramid {
    /// Build up to `num_levels` levels, fewer if the image bottoms out.
    ///
    /// # Panics
    /// Panics if `num_levels == 0`, `sigma <= 0`, or the image is empty.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, sigma: f32) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");
        assert!(!src.is_empty(), "cannot build a pyramid of an empty image");

        let kernel = gaussian_kernel_for_sigma(sigma);
        let count = num_levels.min(max_levels(src.width(), src.height()));

        let mut levels = Vec::with_capacity(count);
        levels.push(src.map(Pixel::to_f32));
        for _ in 1..count {
            let prev = &levels[levels.len() - 1];
            let down = downsample_2x(&convolve_separable(prev, &kernel, &kernel));
            levels.push(down);
        }
        trace!(requested = num_levels, built = levels.len(), "gaussian pyramid");

        GaussianPyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }
}

/// A Laplacian pyramid: band-pass residuals plus the coarsest Gaussian level.
///
/// `residuals.len() == num_levels() - 1`. `residuals[k]` has the size of
/// Gaussian level k.
pub struct LaplacianPyramid {
    pub residuals: Vec<Image<f32>>,
    pub smallest: Image<f32>,
}

impl LaplacianPyramid {
    /// Decompose `src` into at most `num_levels` levels.
    ///
    /// # Panics
    /// Same conditions as [`GaussianPyramid::build`].
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, sigma: f32) -> Self {
        Self::from_gaussian(GaussianPyramid::build(src, num_levels, sigma))
    }

    /// Turn a Gaussian pyramid into its Laplacian form, consuming it.
    pub fn from_gaussian(gaussian: GaussianPyramid) -> Self {
        let mut levels = gaussian.levels;
        // `build` never produces an empty pyramid.
        let smallest = levels.pop().unwrap_or_else(|| Image::new(0, 0));

        let mut residuals = Vec::with_capacity(levels.len());
        for (k, level) in levels.iter().enumerate() {
            let coarser = levels.get(k + 1).unwrap_or(&smallest);
            let up = upsample_to(coarser, level.width(), level.height());
            residuals.push(subtract(level, &up));
        }

        LaplacianPyramid { residuals, smallest }
    }

    pub fn num_levels(&self) -> usize {
        self.residuals.len() + 1
    }

    /// Collapse the pyramid back to a full-resolution image.
    pub fn reconstruct(&self) -> Image<f32> {
        let mut current = self.smallest.clone();
        for residual in self.residuals.iter().rev() {
            let up = upsample_to(&current, residual.width(), residual.height());
            current = add(&up, residual);
        }
        current
    }
}

/// Downsample by 2 in both dimensions: `dst(x, y) = src(2x, 2y)`.
///
/// Odd dimensions drop the last row/column. Callers blur first.
pub fn downsample_2x(src: &Image<f32>) -> Image<f32> {
    let new_w = src.width() / 2;
    let new_h = src.height() / 2;
    let mut dst = Image::new(new_w, new_h);

    for y in 0..new_h {
        for x in 0..new_w {
            // SAFETY: 2x < width and 2y < height.
            unsafe { dst.set_unchecked(x, y, src.get_unchecked(x * 2, y * 2)); }
        }
    }
    dst
}

/// Upsample a coarse level to an explicit `(width, height)`.
///
/// Bilinear interpolation with pixel-center alignment and replicate borders.
/// The explicit target size handles levels whose parent had an odd
/// dimension.
pub fn upsample_to(src: &Image<f32>, width: usize, height: usize) -> Image<f32> {
    resize_bilinear(src, width, height)
}

fn subtract(a: &Image<f32>, b: &Image<f32>) -> Image<f32> {
    zip_with(a, b, |p, q| p - q)
}

fn add(a: &Image<f32>, b: &Image<f32>) -> Image<f32> {
    zip_with(a, b, |p, q| p + q)
}

fn zip_with(a: &Image<f32>, b: &Image<f32>, f: impl Fn(f32, f32) -> f32) -> Image<f32> {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = Image::new(a.width(), a.height());
    for y in 0..a.height() {
        for ((o, &p), &q) in out.row_mut(y).iter_mut().zip(a.row(y)).zip(b.row(y)) {
            *o = f(p, q);
        }
    }
    out
}
