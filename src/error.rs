//! Error taxonomy for the chart reader.
//!
//! Only structural precondition failures are errors. Low-quality input (no contours,
//! empty color samples, empty columns) degrades to a fallback value with a low confidence
//! instead of raising.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    /// Not enough labels (or anchors) to build a mapping.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid timeframe: {0:?}")]
    InvalidTimeframe(String),

    /// Degenerate or out-of-image manual calibration.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// The pixel buffer could not be read or decoded.
    #[error("image access error: {0}")]
    ImageAccess(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        ChartError::ImageAccess(err.to_string())
    }
}

impl From<toml::de::Error> for ChartError {
    fn from(err: toml::de::Error) -> Self {
        ChartError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;
