//! Error types for the strip driver and the show engine.

use std::path::PathBuf;

/// Invalid strip setup, fatal at construction
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("the APA102 driver does not support strips of more than {max} LEDs (got {requested})")]
    TooManyLeds { requested: usize, max: usize },
    #[error("mirror holds {actual} bytes but the frame buffer needs {expected}")]
    MirrorLength { expected: usize, actual: usize },
    #[error("failed to seed mirror buffer: {0}")]
    Mirror(#[from] MirrorError),
}

/// Failures of the clocked serial line
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to set clock rate to {hz} Hz: {source}")]
    ClockRate {
        hz: u32,
        #[source]
        source: serialport::Error,
    },
    #[error("SPI device {path}: {source}")]
    Spi {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transfer failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport already released")]
    Closed,
}

/// Failures reading or writing the mirror buffer
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },
    #[error("mirror file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mirror file {path} is too short to hold a buffer")]
    Truncated { path: PathBuf },
}

/// Show parameter problems, raised before the loop starts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("unrecognized parameter \"{0}\"")]
    Unrecognized(String),
    #[error("invalid value for parameter \"{name}\": {reason}")]
    Invalid { name: String, reason: String },
    #[error("missing parameter \"{0}\"")]
    Missing(String),
}

impl ParameterError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ParameterError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Anything that ends a show run abnormally
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
