// calibration.rs -- Bounded session calibration of the gain transform.
//
// Calibration pulls frame pairs until a fit succeeds and the reviewer
// accepts the preview, or the attempt budget runs out. Fits that fail for
// reasons a fresh frame may fix (too few matches or inliers, degenerate
// colors) count as attempts. Any other error ends calibration.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::gain::{apply, GainTransform, GainTransformEstimator, SamplingMode};
use crate::image::{BgrImage, Pixel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub max_attempts: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig { max_attempts: 10 }
    }
}

pub struct Calibrator<'a> {
    estimator: GainTransformEstimator,
    mode: SamplingMode<'a>,
    config: CalibrationConfig,
}

impl<'a> Calibrator<'a> {
    pub fn new(estimator: GainTransformEstimator, mode: SamplingMode<'a>, config: CalibrationConfig) -> Self {
        Calibrator { estimator, mode, config }
    }

    /// Fit on `(source, destination)` pairs until `review` accepts.
    ///
    /// `review` sees the candidate and the source frame mapped through it.
    /// Returns `CalibrationExhausted` after `max_attempts` tries or when
    /// `frames` ends first.
    pub fn run<T, I, F>(&self, frames: I, mut review: F) -> Result<GainTransform>
    where
        T: Pixel,
        I: IntoIterator<Item = (BgrImage<T>, BgrImage<T>)>,
        F: FnMut(&GainTransform, &BgrImage<f32>) -> bool,
    {
        let mut attempts = 0;
        for (source, destination) in frames.into_iter().take(self.config.max_attempts) {
            attempts += 1;
            match self.estimator.fit(&source, &destination, &self.mode) {
                Ok(transform) => {
                    let preview = apply(&source, &transform)?;
                    if review(&transform, &preview) {
                        info!(attempts, "calibration accepted");
                        return Ok(transform);
                    }
                    warn!(attempt = attempts, "transform rejected, trying again");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt = attempts, error = %e, "gain fit failed, trying again");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::CalibrationExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gain::KeypointSampler;
    use crate::image::Image;
    use crate::matching::{Correspondence, FeatureMatcher, InlierFilter, ScoredMatch};

    fn pair() -> (BgrImage<u8>, BgrImage<u8>) {
        let src = BgrImage::from_fn(8, 8, |x, y| [(x * 20) as u8, (y * 25) as u8, (x * y * 3) as u8]);
        let dst = src.map(|v| v / 2 + 10);
        (src, dst)
    }

    struct FewMatches;

    impl FeatureMatcher for FewMatches {
        fn match_features(&self, _: &Image<f32>, _: &Image<f32>) -> Vec<ScoredMatch> {
            let p = [1.0, 1.0];
            vec![ScoredMatch { pair: Correspondence::new(p, p), distance: 1.0 }; 2]
        }
    }

    struct KeepAll;

    impl InlierFilter for KeepAll {
        fn inlier_mask(&self, pairs: &[Correspondence]) -> Vec<bool> {
            vec![true; pairs.len()]
        }
    }

    #[test]
    fn test_accepts_after_rejections() {
        let calibrator = Calibrator::new(
            GainTransformEstimator::default(),
            SamplingMode::Dense,
            CalibrationConfig::default(),
        );
        let mut reviews = 0;
        let t = calibrator
            .run(std::iter::repeat_with(pair), |_, preview| {
                assert_eq!(preview.dimensions(), (8, 8));
                reviews += 1;
                reviews == 3
            })
            .expect("third review accepts");
        assert_eq!(reviews, 3);
        let mapped = t.transform([100.0, 50.0, 20.0]);
        assert!((mapped[0] - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let matcher = FewMatches;
        let filter = KeepAll;
        let calibrator = Calibrator::new(
            GainTransformEstimator::default(),
            SamplingMode::Keypoint(KeypointSampler::new(&matcher, &filter)),
            CalibrationConfig { max_attempts: 3 },
        );
        let result = calibrator.run(std::iter::repeat_with(pair), |_, _| true);
        assert!(matches!(result, Err(Error::CalibrationExhausted { attempts: 3 })));
    }

    #[test]
    fn test_runs_out_of_frames() {
        let calibrator = Calibrator::new(
            GainTransformEstimator::default(),
            SamplingMode::Dense,
            CalibrationConfig::default(),
        );
        let frames = vec![pair(), pair()];
        let result = calibrator.run(frames, |_, _| false);
        assert!(matches!(result, Err(Error::CalibrationExhausted { attempts: 2 })));
    }

    #[test]
    fn test_size_mismatch_is_not_retried() {
        let calibrator = Calibrator::new(
            GainTransformEstimator::default(),
            SamplingMode::Dense,
            CalibrationConfig::default(),
        );
        let frames = vec![(BgrImage::<u8>::new(4, 4), BgrImage::<u8>::new(4, 5))];
        assert!(matches!(
            calibrator.run(frames, |_, _| true),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
