// lipflip: two-camera mouth swap
//
// Color-gain calibration between two camera feeds and Laplacian pyramid
// blending of a mouth region pasted from one feed into the other.
//
// Numeric core:        gain (fit/apply), blend (LaplacianBlender)
// Building blocks:     image, convert, convolution, pyramid
// Collaborator traits: matching (FeatureMatcher, InlierFilter),
//                      region (RegionDetector)
// Glue:                homography, mask, swap, calibration, config, io

pub mod error;
pub mod logger;

pub mod image;
pub mod convert;
pub mod convolution;
pub mod pyramid;

pub mod matching;
pub mod homography;
pub mod gain;
pub mod blend;

pub mod mask;
pub mod region;
pub mod swap;
pub mod calibration;

pub mod config;
pub mod io;

pub use blend::{laplacian_blend, BlendConfig, LaplacianBlender};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use gain::{
    solve_least_squares, ColorSample, ColorSampleSet, ColorSampler, GainConfig, GainTransform,
    GainTransformEstimator, KeypointSampler, SamplingMode,
};
pub use homography::HomographyRansac;
pub use crate::image::{BgrImage, Image};
pub use matching::{Correspondence, FeatureMatcher, InlierFilter, ScoredMatch};
pub use region::{MouthLocator, Rect, RegionDetector};
