// matching.rs -- Point correspondences and the collaborator traits around them.
//
// Detection, description and matching of keypoints are outside this crate.
// A `FeatureMatcher` turns two gray images into scored pairs. An
// `InlierFilter` decides which pairs agree with one geometric model.
// Both take `&self` and run synchronously.

use crate::image::Image;

/// A pixel coordinate pair: `a` in the source image, `b` in the destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub a: [f64; 2],
    pub b: [f64; 2],
}

impl Correspondence {
    pub fn new(a: [f64; 2], b: [f64; 2]) -> Self {
        Correspondence { a, b }
    }
}

/// A correspondence with its descriptor distance. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMatch {
    pub pair: Correspondence,
    pub distance: f32,
}

/// Keypoint detection plus descriptor matching.
pub trait FeatureMatcher {
    /// Match features of gray image `a` against gray image `b`.
    ///
    /// Coordinates of `pair.a` refer to `a`, `pair.b` to `b`.
    fn match_features(&self, a: &Image<f32>, b: &Image<f32>) -> Vec<ScoredMatch>;
}

/// Robust geometric fit with outlier rejection.
pub trait InlierFilter {
    /// One entry per input pair, `true` for inliers.
    fn inlier_mask(&self, pairs: &[Correspondence]) -> Vec<bool>;
}

impl<M: FeatureMatcher + ?Sized> FeatureMatcher for &M {
    fn match_features(&self, a: &Image<f32>, b: &Image<f32>) -> Vec<ScoredMatch> {
        (**self).match_features(a, b)
    }
}

impl<F: InlierFilter + ?Sized> InlierFilter for &F {
    fn inlier_mask(&self, pairs: &[Correspondence]) -> Vec<bool> {
        (**self).inlier_mask(pairs)
    }
}

/// Keep matches whose distance is strictly below `factor` times the best.
///
/// Order is preserved. A best distance of exactly 0 keeps nothing, since no
/// distance is below 0.
pub fn filter_by_min_distance(matches: &[ScoredMatch], factor: f32) -> Vec<Correspondence> {
    let min = matches
        .iter()
        .map(|m| m.distance)
        .fold(f32::INFINITY, f32::min);
    let limit = factor * min;
    matches
        .iter()
        .filter(|m| m.distance < limit)
        .map(|m| m.pair)
        .collect()
}

/// Inlier pairs selected by `mask`, in input order.
pub fn select_inliers(pairs: &[Correspondence], mask: &[bool]) -> Vec<Correspondence> {
    pairs
        .iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect()
}
