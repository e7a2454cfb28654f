// gain.rs -- Linear color-gain transform between two cameras.
//
// Two cameras watching the same scene report different colors for the same
// surface. We model the difference as an affine map on homogeneous BGR
// rows: s = [b g r 1], s * T ~ s', with T a 4x4 matrix fitted by least
// squares over paired color samples.
//
// Sampling strategies:
//   Keypoint  gray -> matcher -> distance filter -> inlier filter -> sample
//             the BGR value under each inlier in both frames
//   Dense     every pixel, paired by raster position
//
// Solver: normal equations T = (S^T S)^-1 S^T D, with S^T S and S^T D
// accumulated as sums of 4x4 outer products so sample sets never need to
// be stored as N x 4 matrices. When S^T S is rank deficient (a solid-color
// scene) the minimum-norm solution is accepted only if it reproduces every
// destination sample.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::convert::bgr_to_gray;
use crate::error::{Error, Result};
use crate::image::{ensure_same_size, BgrImage, Image, Pixel};
use crate::matching::{filter_by_min_distance, select_inliers, FeatureMatcher, InlierFilter};

/// Matches needed after distance filtering before running the inlier filter.
pub const MIN_MATCHES: usize = 4;

/// Inliers needed before a keypoint fit is attempted.
pub const MIN_INLIERS: usize = 15;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One homogeneous color row `(B, G, R, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample(pub [f64; 4]);

impl ColorSample {
    pub fn from_bgr<T: Pixel>(px: [T; 3]) -> Self {
        ColorSample([px[0].to_f32() as f64, px[1].to_f32() as f64, px[2].to_f32() as f64, 1.0])
    }

    #[inline]
    pub fn bgr(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

/// Ordered color rows from one image.
///
/// Paired sets correspond row for row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorSampleSet {
    rows: Vec<ColorSample>,
}

impl ColorSampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        ColorSampleSet { rows: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, sample: ColorSample) {
        self.rows.push(sample);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ColorSample] {
        &self.rows
    }
}

impl FromIterator<ColorSample> for ColorSampleSet {
    fn from_iter<I: IntoIterator<Item = ColorSample>>(iter: I) -> Self {
        ColorSampleSet { rows: iter.into_iter().collect() }
    }
}

// ---------------------------------------------------------------------------
// GainTransform
// ---------------------------------------------------------------------------

/// A 4x4 row-major color transform, `[b g r 1] * T`.
///
/// Only the first three output columns are used when applied. The fourth
/// column is whatever the fit produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainTransform {
    rows: [[f64; 4]; 4],
}

impl GainTransform {
    pub fn identity() -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        GainTransform { rows }
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        GainTransform { rows }
    }

    /// Build from 16 row-major values. Any other length is a `SizeMismatch`.
    pub fn from_row_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::SizeMismatch { expected: (1, 16), found: (1, values.len()) });
        }
        let mut rows = [[0.0; 4]; 4];
        for (row, chunk) in rows.iter_mut().zip(values.chunks_exact(4)) {
            row.copy_from_slice(chunk);
        }
        Ok(GainTransform { rows })
    }

    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.rows
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        Matrix4::from_fn(|i, j| self.rows[i][j])
    }

    fn from_matrix(m: &Matrix4<f64>) -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = m[(i, j)];
            }
        }
        GainTransform { rows }
    }

    /// Map one `[b, g, r]` value.
    #[inline]
    pub fn transform(&self, bgr: [f64; 3]) -> [f64; 3] {
        let t = &self.rows;
        let mut out = [0.0; 3];
        for (j, o) in out.iter_mut().enumerate() {
            *o = bgr[0] * t[0][j] + bgr[1] * t[1][j] + bgr[2] * t[2][j] + t[3][j];
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Keypoint sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointConfig {
    /// Matches are kept when `distance < distance_factor * min_distance`.
    pub distance_factor: f32,
    pub min_matches: usize,
    pub min_inliers: usize,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        KeypointConfig {
            distance_factor: 3.0,
            min_matches: MIN_MATCHES,
            min_inliers: MIN_INLIERS,
        }
    }
}

/// Solver tolerances and keypoint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainConfig {
    /// Singular values of S^T S below `rank_tolerance * sigma_max` count as zero.
    pub rank_tolerance: f64,
    /// A rank-deficient solution must reproduce every destination value to
    /// within `residual_tolerance * max(1, max |d|)`.
    pub residual_tolerance: f64,
    pub keypoint: KeypointConfig,
}

impl Default for GainConfig {
    fn default() -> Self {
        GainConfig {
            rank_tolerance: 1e-10,
            residual_tolerance: 1e-6,
            keypoint: KeypointConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling strategies
// ---------------------------------------------------------------------------

/// Produces paired color samples from a source and a destination frame.
///
/// Callers guarantee the frames are non-empty and equally sized.
pub trait ColorSampler {
    fn sample<T: Pixel>(
        &self,
        source: &BgrImage<T>,
        destination: &BgrImage<T>,
    ) -> Result<(ColorSampleSet, ColorSampleSet)>;
}

/// Every pixel, raster order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseSampler;

impl ColorSampler for DenseSampler {
    fn sample<T: Pixel>(
        &self,
        source: &BgrImage<T>,
        destination: &BgrImage<T>,
    ) -> Result<(ColorSampleSet, ColorSampleSet)> {
        ensure_same_size(source.dimensions(), destination.dimensions())?;
        let src = source.pixels().map(ColorSample::from_bgr).collect();
        let dst = destination.pixels().map(ColorSample::from_bgr).collect();
        Ok((src, dst))
    }
}

/// Colors under geometrically consistent keypoint matches.
pub struct KeypointSampler<'a> {
    matcher: &'a dyn FeatureMatcher,
    filter: &'a dyn InlierFilter,
    config: KeypointConfig,
}

impl<'a> KeypointSampler<'a> {
    pub fn new(matcher: &'a dyn FeatureMatcher, filter: &'a dyn InlierFilter) -> Self {
        Self::with_config(matcher, filter, KeypointConfig::default())
    }

    pub fn with_config(
        matcher: &'a dyn FeatureMatcher,
        filter: &'a dyn InlierFilter,
        config: KeypointConfig,
    ) -> Self {
        KeypointSampler { matcher, filter, config }
    }

    pub fn config(&self) -> &KeypointConfig {
        &self.config
    }
}

impl ColorSampler for KeypointSampler<'_> {
    fn sample<T: Pixel>(
        &self,
        source: &BgrImage<T>,
        destination: &BgrImage<T>,
    ) -> Result<(ColorSampleSet, ColorSampleSet)> {
        let gray_src = bgr_to_gray(source);
        let gray_dst = bgr_to_gray(destination);

        let matches = self.matcher.match_features(&gray_src, &gray_dst);
        let good = filter_by_min_distance(&matches, self.config.distance_factor);
        debug!(candidates = matches.len(), kept = good.len(), "match distance filter");
        if good.len() < self.config.min_matches {
            return Err(Error::InsufficientMatches {
                found: good.len(),
                required: self.config.min_matches,
            });
        }

        let mask = self.filter.inlier_mask(&good);
        if mask.len() != good.len() {
            return Err(Error::SizeMismatch {
                expected: (good.len(), 1),
                found: (mask.len(), 1),
            });
        }
        let inliers = select_inliers(&good, &mask);
        debug!(inliers = inliers.len(), "inlier filter");
        if inliers.len() < self.config.min_inliers {
            return Err(Error::InsufficientInliers {
                found: inliers.len(),
                required: self.config.min_inliers,
            });
        }

        let src = inliers.iter().map(|c| ColorSample::from_bgr(pixel_at(source, c.a))).collect();
        let dst = inliers
            .iter()
            .map(|c| ColorSample::from_bgr(pixel_at(destination, c.b)))
            .collect();
        Ok((src, dst))
    }
}

/// BGR value at the pixel nearest to `p`, clamped into the image.
fn pixel_at<T: Pixel>(img: &BgrImage<T>, p: [f64; 2]) -> [T; 3] {
    let x = p[0].round().clamp(0.0, (img.width() - 1) as f64) as usize;
    let y = p[1].round().clamp(0.0, (img.height() - 1) as f64) as usize;
    img.get(x, y)
}

/// How `fit` gathers color samples.
pub enum SamplingMode<'a> {
    Keypoint(KeypointSampler<'a>),
    Dense,
}

impl ColorSampler for SamplingMode<'_> {
    fn sample<T: Pixel>(
        &self,
        source: &BgrImage<T>,
        destination: &BgrImage<T>,
    ) -> Result<(ColorSampleSet, ColorSampleSet)> {
        match self {
            SamplingMode::Keypoint(sampler) => sampler.sample(source, destination),
            SamplingMode::Dense => DenseSampler.sample(source, destination),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Fits and applies `GainTransform`s.
#[derive(Debug, Clone, Default)]
pub struct GainTransformEstimator {
    pub config: GainConfig,
}

impl GainTransformEstimator {
    pub fn new(config: GainConfig) -> Self {
        GainTransformEstimator { config }
    }

    /// Keypoint sampling with this estimator's `keypoint` thresholds.
    pub fn keypoint_mode<'a>(
        &self,
        matcher: &'a dyn FeatureMatcher,
        filter: &'a dyn InlierFilter,
    ) -> SamplingMode<'a> {
        SamplingMode::Keypoint(KeypointSampler::with_config(matcher, filter, self.config.keypoint.clone()))
    }

    /// Fit `T` so that `source * T ~ destination`.
    pub fn fit<T: Pixel>(
        &self,
        source: &BgrImage<T>,
        destination: &BgrImage<T>,
        mode: &SamplingMode<'_>,
    ) -> Result<GainTransform> {
        ensure_same_size(source.dimensions(), destination.dimensions())?;
        if source.is_empty() {
            return Err(Error::EmptyImage);
        }

        let (src, dst) = mode.sample(source, destination)?;
        debug!(samples = src.len(), "color samples collected");
        let transform = self.solve(&src, &dst)?;
        info!(transform = ?transform.rows(), "gain transform fitted");
        Ok(transform)
    }

    /// Least-squares solve with this estimator's tolerances.
    pub fn solve(&self, source: &ColorSampleSet, destination: &ColorSampleSet) -> Result<GainTransform> {
        solve_with_tolerance(
            source,
            destination,
            self.config.rank_tolerance,
            self.config.residual_tolerance,
        )
    }

    /// Map every pixel through `transform`. No clamping.
    pub fn apply<T: Pixel>(&self, frame: &BgrImage<T>, transform: &GainTransform) -> Result<BgrImage<f32>> {
        apply(frame, transform)
    }
}

/// Least squares `T = (S^T S)^-1 S^T D` with default tolerances.
pub fn solve_least_squares(source: &ColorSampleSet, destination: &ColorSampleSet) -> Result<GainTransform> {
    let config = GainConfig::default();
    solve_with_tolerance(source, destination, config.rank_tolerance, config.residual_tolerance)
}

fn solve_with_tolerance(
    source: &ColorSampleSet,
    destination: &ColorSampleSet,
    rank_tolerance: f64,
    residual_tolerance: f64,
) -> Result<GainTransform> {
    if source.len() != destination.len() {
        return Err(Error::SizeMismatch {
            expected: (source.len(), 4),
            found: (destination.len(), 4),
        });
    }
    if source.is_empty() {
        return Err(Error::EmptyImage);
    }

    let mut sts = Matrix4::<f64>::zeros();
    let mut std_mat = Matrix4::<f64>::zeros();
    for (s, d) in source.rows().iter().zip(destination.rows()) {
        let sv = Vector4::from(s.0);
        let dv = Vector4::from(d.0);
        sts += sv * sv.transpose();
        std_mat += sv * dv.transpose();
    }
    if !sts.iter().chain(std_mat.iter()).all(|v| v.is_finite()) {
        return Err(Error::SingularSystem);
    }

    let svd = sts.svd(true, true);
    let sigma_max = svd.singular_values.max();
    if sigma_max.is_nan() || sigma_max <= 0.0 {
        return Err(Error::SingularSystem);
    }
    let cutoff = rank_tolerance * sigma_max;
    let rank = svd.rank(cutoff);
    let t = svd.solve(&std_mat, cutoff).map_err(|_| Error::SingularSystem)?;
    if !t.iter().all(|v| v.is_finite()) {
        return Err(Error::SingularSystem);
    }
    let transform = GainTransform::from_matrix(&t);
    debug!(rank, samples = source.len(), "normal equations solved");

    if rank < 4 {
        // Minimum-norm solution: only exact fits are meaningful.
        let scale = destination
            .rows()
            .iter()
            .flat_map(|d| d.0)
            .fold(1.0f64, |m, v| m.max(v.abs()));
        let limit = residual_tolerance * scale;
        let consistent = source.rows().iter().zip(destination.rows()).all(|(s, d)| {
            let row = Vector4::from(s.0).transpose() * t;
            (0..4).all(|j| (row[j] - d.0[j]).abs() <= limit)
        });
        if !consistent {
            debug!(rank, "rank-deficient system has no exact solution");
            return Err(Error::SingularSystem);
        }
    }
    Ok(transform)
}

/// Map every pixel of `frame` through `transform`, keeping three channels.
///
/// Output stays in the input scale. Values are not clamped.
pub fn apply<T: Pixel>(frame: &BgrImage<T>, transform: &GainTransform) -> Result<BgrImage<f32>> {
    if frame.is_empty() {
        return Err(Error::EmptyImage);
    }
    let (w, h) = frame.dimensions();
    let [b, g, r] = frame.planes();
    let mut out = [Image::new(w, h), Image::new(w, h), Image::new(w, h)];
    for y in 0..h {
        let (rb, rg, rr) = (b.row(y), g.row(y), r.row(y));
        for x in 0..w {
            let px = [rb[x].to_f32() as f64, rg[x].to_f32() as f64, rr[x].to_f32() as f64];
            let mapped = transform.transform(px);
            for (plane, v) in out.iter_mut().zip(mapped) {
                plane.row_mut(y)[x] = v as f32;
            }
        }
    }
    let [ob, og, or] = out;
    BgrImage::from_planes(ob, og, or)
}
