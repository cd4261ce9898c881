// THEORY:
// The `error` module defines the single error vocabulary of the engine. Errors split
// into two families that are handled very differently:
//
// 1.  **Per-tick, recoverable**: a degenerate ROI, a region with no usable pixels, a
//     numerically degenerate color temperature. These describe transient sensor noise
//     and never escape the tick loop; the pipeline logs them and moves on.
// 2.  **Caller misuse**: empty or malformed training data, predicting before training,
//     a feature vector of the wrong length. These are raised synchronously to whoever
//     called the classifier, since silently substituting a default would hide a bug.

use thiserror::Error;

/// Result type alias for prism_vision operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// Training data was empty or malformed.
    #[error("Invalid input: {reason}")]
    Input { reason: String },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid state: {reason}")]
    State { reason: String },

    /// A feature vector did not match the dimensionality the model was trained with.
    #[error("Feature dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The eroded ROI fell below the minimum usable size.
    #[error("Region degenerate after erosion: {width}x{height}")]
    GeometryDegenerate { width: u32, height: u32 },

    /// The sampling rectangle produced zero eligible pixels.
    #[error("No usable pixels in {width}x{height} region")]
    NoUsablePixels { width: u32, height: u32 },

    /// A numeric derivation hit a zero denominator.
    #[error("Numeric degenerate: {quantity}")]
    NumericDegenerate { quantity: String },

    /// A pixel buffer did not describe a valid frame.
    #[error("Invalid pixel buffer: {reason}")]
    InvalidBuffer { reason: String },

    /// A required training column was not present in the header.
    #[error("Missing required training column: {column}")]
    MissingColumn { column: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ProbeError {
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        Self::State {
            reason: reason.into(),
        }
    }

    pub fn invalid_buffer(reason: impl Into<String>) -> Self {
        Self::InvalidBuffer {
            reason: reason.into(),
        }
    }

    /// True for failures the tick loop absorbs locally instead of surfacing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProbeError::GeometryDegenerate { .. }
                | ProbeError::NoUsablePixels { .. }
                | ProbeError::NumericDegenerate { .. }
        )
    }

    /// True for errors that represent misuse of the classifier API.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ProbeError::Input { .. }
                | ProbeError::State { .. }
                | ProbeError::DimensionMismatch { .. }
                | ProbeError::MissingColumn { .. }
        )
    }
}
