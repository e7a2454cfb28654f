//! Pipeline configuration.
//!
//! Every stage keeps its own config struct next to the code it tunes.
//! `PipelineConfig` gathers them so a whole session can be described by
//! one JSON file. Missing sections and fields fall back to their defaults:
//!
//! ```
//! use lipflip::config::PipelineConfig;
//!
//! let config: PipelineConfig = serde_json::from_str(r#"{ "swap": { "blend_range": 4 } }"#)?;
//! assert_eq!(config.swap.blend_range, 4);
//! assert_eq!(config.swap.blend.levels, 20);
//! assert_eq!(config.calibration.max_attempts, 10);
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::blend::BlendConfig;
use crate::calibration::CalibrationConfig;
use crate::error::{Error, Result};
use crate::gain::{GainConfig, GainTransformEstimator};
use crate::homography::{HomographyRansac, RansacConfig};
use crate::region::LocatorConfig;
use crate::swap::SwapConfig;

/// Complete session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gain solver tolerances and keypoint filtering.
    pub gain: GainConfig,
    /// Outlier rejection for keypoint sampling.
    pub ransac: RansacConfig,
    /// Stand-alone blending (the `blend` command).
    pub blend: BlendConfig,
    pub locator: LocatorConfig,
    pub swap: SwapConfig,
    pub calibration: CalibrationConfig,
}

impl PipelineConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Gain estimator carrying the `gain` section.
    pub fn estimator(&self) -> GainTransformEstimator {
        GainTransformEstimator::new(self.gain.clone())
    }

    /// Keypoint outlier rejection carrying the `ransac` section.
    pub fn inlier_filter(&self) -> HomographyRansac {
        HomographyRansac::new(self.ransac.clone())
    }

    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<()> {
        for (name, blend) in [("blend.levels", &self.blend), ("swap.blend.levels", &self.swap.blend)] {
            if blend.levels == 0 {
                return Err(Error::invalid(name, blend.levels));
            }
        }
        for (name, sigma) in [("blend.sigma", self.blend.sigma), ("swap.blend.sigma", self.swap.blend.sigma)] {
            if !(sigma > 0.0 && sigma.is_finite()) {
                return Err(Error::invalid(name, sigma));
            }
        }
        if self.calibration.max_attempts == 0 {
            return Err(Error::invalid("calibration.max_attempts", 0));
        }
        if !(self.locator.detection_scale > 0.0 && self.locator.detection_scale.is_finite()) {
            return Err(Error::invalid("locator.detection_scale", self.locator.detection_scale));
        }
        if !(self.gain.keypoint.distance_factor > 0.0) {
            return Err(Error::invalid("gain.keypoint.distance_factor", self.gain.keypoint.distance_factor));
        }
        if !(self.ransac.threshold > 0.0) {
            return Err(Error::invalid("ransac.threshold", self.ransac.threshold));
        }
        if !(0.0..1.0).contains(&self.ransac.confidence) {
            return Err(Error::invalid("ransac.confidence", self.ransac.confidence));
        }
        if self.gain.rank_tolerance < 0.0 || self.gain.residual_tolerance < 0.0 {
            return Err(Error::invalid("gain tolerances", format!(
                "{} / {}",
                self.gain.rank_tolerance, self.gain.residual_tolerance
            )));
        }
        Ok(())
    }
}
