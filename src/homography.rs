// homography.rs -- Planar homography estimation and outlier rejection.
//
// A homography H maps pixel coordinates of one view onto another view of
// the same (roughly planar) scene: b ~ H * a in homogeneous coordinates.
// Two cameras mounted side by side looking at one face satisfy this well
// enough to reject gross keypoint mismatches.
//
// Algorithm: normalized DLT.
//   1. Hartley normalization of both point sets (centroid to origin,
//      mean distance sqrt(2))
//   2. Accumulate the 9x9 normal matrix M = A^T * A, two rows per pair
//   3. Eigenvector of the smallest eigenvalue of M is the vectorized H
//   4. Undo normalization, scale so H[2][2] = 1
//
// RANSAC wrapper: minimal samples of 4, one-way transfer error
// |project(H, a) - b| against a pixel threshold, adaptive stopping, then a
// refit on all inliers.

use nalgebra::{DMatrix, DVector, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matching::{Correspondence, InlierFilter};

/// Minimal sample size for a homography.
pub const MIN_SAMPLE: usize = 4;

/// RANSAC configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold: maximum transfer error in pixels.
    pub threshold: f64,
    /// RANSAC stops early once the probability of having drawn an
    /// all-inlier sample exceeds this.
    pub confidence: f64,
    /// Seed for sample selection. Fixed so runs are reproducible.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        RansacConfig {
            max_iterations: 2000,
            threshold: 5.0,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// Result of homography estimation with RANSAC.
#[derive(Debug, Clone)]
pub struct HomographyResult {
    pub h: Matrix3<f64>,
    /// Inlier mask: true for inliers, false for outliers.
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// RANSAC iterations used.
    pub iterations: usize,
}

// ============================================================
// DLT
// ============================================================

/// Estimate H from >= 4 correspondences (no RANSAC).
///
/// Returns None for fewer than 4 pairs or a numerically degenerate fit.
pub fn estimate_homography(pairs: &[Correspondence]) -> Option<Matrix3<f64>> {
    if pairs.len() < MIN_SAMPLE {
        return None;
    }

    let t_a = Normalizer::fit(pairs.iter().map(|c| c.a));
    let t_b = Normalizer::fit(pairs.iter().map(|c| c.b));

    // Each pair contributes two constraint rows. Instead of storing the
    // 2N x 9 matrix A, accumulate M = sum(r * r^T).
    let mut m = DMatrix::<f64>::zeros(9, 9);
    for c in pairs {
        let [ax, ay] = t_a.apply(c.a);
        let [bx, by] = t_b.apply(c.b);

        let r1 = DVector::from_column_slice(&[
            0.0, 0.0, 0.0, -ax, -ay, -1.0, by * ax, by * ay, by,
        ]);
        let r2 = DVector::from_column_slice(&[
            ax, ay, 1.0, 0.0, 0.0, 0.0, -bx * ax, -bx * ay, -bx,
        ]);
        m += &r1 * r1.transpose();
        m += &r2 * r2.transpose();
    }

    let eig = SymmetricEigen::new(m);
    let h_vec = eig.eigenvectors.column(eig.eigenvalues.iamin());
    let h_norm = Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2],
        h_vec[3], h_vec[4], h_vec[5],
        h_vec[6], h_vec[7], h_vec[8],
    );

    // H = T_b^{-1} * H_norm * T_a
    let h = t_b.inverse_matrix() * h_norm * t_a.matrix();
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / scale)
}

/// Map `p` through `h`. Points sent to infinity come back as NaN.
pub fn project(h: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    let q = h * Vector3::new(p[0], p[1], 1.0);
    if q[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [q[0] / q[2], q[1] / q[2]]
}

/// Transfer error `|project(h, c.a) - c.b|` in pixels.
pub fn transfer_error(h: &Matrix3<f64>, c: &Correspondence) -> f64 {
    let p = project(h, c.a);
    let dx = p[0] - c.b[0];
    let dy = p[1] - c.b[1];
    let err = (dx * dx + dy * dy).sqrt();
    if err.is_nan() { f64::INFINITY } else { err }
}

// ============================================================
// RANSAC
// ============================================================

/// Estimate H with RANSAC outlier rejection.
///
/// Returns None with fewer than 4 pairs or when no sample yields a model
/// with at least 4 inliers.
pub fn estimate_homography_ransac(
    pairs: &[Correspondence],
    config: &RansacConfig,
) -> Option<HomographyResult> {
    let n = pairs.len();
    if n < MIN_SAMPLE {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut iterations = 0;
    let mut adaptive_max = config.max_iterations;

    while iterations < adaptive_max {
        iterations += 1;

        let sample: Vec<Correspondence> = rand::seq::index::sample(&mut rng, n, MIN_SAMPLE)
            .iter()
            .map(|i| pairs[i])
            .collect();
        let Some(h) = estimate_homography(&sample) else {
            continue;
        };

        let (mask, count) = classify(&h, pairs, config.threshold);
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            best = Some((h, mask, count));

            let w = count as f64 / n as f64;
            if w > 0.0 {
                let p_fail = (1.0 - w.powi(MIN_SAMPLE as i32)).max(1e-15);
                let k = (1.0 - config.confidence).ln() / p_fail.ln();
                adaptive_max = (k.ceil().max(1.0) as usize).min(config.max_iterations);
            }
        }
    }

    let (best_h, best_mask, best_count) = best?;
    if best_count < MIN_SAMPLE {
        return None;
    }

    // Refit on all inliers and reclassify.
    let inlier_pairs = crate::matching::select_inliers(pairs, &best_mask);
    let result = match estimate_homography(&inlier_pairs) {
        Some(h) => {
            let (mask, count) = classify(&h, pairs, config.threshold);
            if count >= best_count {
                HomographyResult { h, inliers: mask, num_inliers: count, iterations }
            } else {
                HomographyResult { h: best_h, inliers: best_mask, num_inliers: best_count, iterations }
            }
        }
        None => HomographyResult { h: best_h, inliers: best_mask, num_inliers: best_count, iterations },
    };
    debug!(inliers = result.num_inliers, total = n, iterations, "homography ransac");
    Some(result)
}

fn classify(h: &Matrix3<f64>, pairs: &[Correspondence], threshold: f64) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = pairs.iter().map(|c| transfer_error(h, c) <= threshold).collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// `InlierFilter` backed by RANSAC homography fitting.
///
/// When no model can be fitted every pair is reported as an outlier.
#[derive(Debug, Clone, Default)]
pub struct HomographyRansac {
    pub config: RansacConfig,
}

impl HomographyRansac {
    pub fn new(config: RansacConfig) -> Self {
        HomographyRansac { config }
    }
}

impl InlierFilter for HomographyRansac {
    fn inlier_mask(&self, pairs: &[Correspondence]) -> Vec<bool> {
        estimate_homography_ransac(pairs, &self.config)
            .map(|r| r.inliers)
            .unwrap_or_else(|| vec![false; pairs.len()])
    }
}

// ============================================================
// Hartley normalization
// ============================================================

/// Translate centroid to origin, scale so mean distance = sqrt(2).
struct Normalizer {
    cx: f64,
    cy: f64,
    scale: f64,
}

impl Normalizer {
    fn fit(points: impl Iterator<Item = [f64; 2]> + Clone) -> Self {
        let n = points.clone().count().max(1) as f64;
        let (sx, sy) = points.clone().fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        let (cx, cy) = (sx / n, sy / n);
        let mean_dist = points
            .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
            .sum::<f64>()
            / n;
        let scale = if mean_dist > 1e-15 { std::f64::consts::SQRT_2 / mean_dist } else { 1.0 };
        Normalizer { cx, cy, scale }
    }

    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [(p[0] - self.cx) * self.scale, (p[1] - self.cy) * self.scale]
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(s, 0.0, -s * self.cx, 0.0, s, -s * self.cy, 0.0, 0.0, 1.0)
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let inv = 1.0 / self.scale;
        Matrix3::new(inv, 0.0, self.cx, 0.0, inv, self.cy, 0.0, 0.0, 1.0)
    }
}
