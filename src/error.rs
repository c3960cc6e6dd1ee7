//! Error taxonomy for the recognition pipeline
//!
//! Only `InvalidGeometry` is ever returned to the caller. The other variants
//! describe frames or results that are dropped on the floor, which is a normal
//! event on a live video stream.

use thiserror::Error;

/// Failure of a single step of the frame pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Zero-area preview, image or region of interest
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Region of interest maps to nothing after cropping
    #[error("region of interest maps to an empty crop")]
    EmptyRegion,

    /// Raw frame could not be turned into an image
    #[error("frame could not be decoded: {0}")]
    FrameDecodeFailure(String),

    /// OCR engine produced no text for a submitted image
    #[error("OCR engine returned no result")]
    NoRecognition,
}

impl PipelineError {
    /// Whether the frame should simply be skipped
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::InvalidGeometry(_))
    }

    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        PipelineError::InvalidGeometry(msg.into())
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
