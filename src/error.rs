//! Error types for the lipflip crate.

use thiserror::Error;

/// Result type alias for lipflip operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Two inputs that must agree in size do not. Sizes are `(width, height)`
    /// for images and `(rows, columns)` for sample sets and matrices.
    #[error("size mismatch: expected {}x{}, found {}x{}", expected.0, expected.1, found.0, found.1)]
    SizeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("image has no pixel data")]
    EmptyImage,

    /// Too few matches survived the distance filter for geometric fitting.
    #[error("not enough matches: found {found}, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    /// Too few correspondences survived outlier rejection.
    #[error("not enough inliers for gain matching: found {found}, need at least {required}")]
    InsufficientInliers { found: usize, required: usize },

    /// The least-squares normal matrix cannot be inverted.
    #[error("color samples are degenerate: normal equations are singular")]
    SingularSystem,

    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("calibration gave up after {attempts} attempts")]
    CalibrationExhausted { attempts: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Codec(#[from] ::image::ImageError),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, value: impl ToString) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }

    /// True for failures that a fresh pair of calibration frames may fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientMatches { .. }
                | Error::InsufficientInliers { .. }
                | Error::SingularSystem
        )
    }
}
