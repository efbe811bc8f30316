//! Unified error types for the trip-duration pipeline
//!
//! [`TripError`] names the pipeline stage that failed. Crates above core work
//! with `anyhow::Result` and raise `TripError` values, so a caller can
//! downcast the chain to find out whether loading, feature derivation,
//! joining, splitting or bucketizing went wrong.
//!
//! # Example
//!
//! ```ignore
//! use trip_core::{TripError, TripResult};
//!
//! fn check_latitude(lat: f64) -> TripResult<()> {
//!     if !(-90.0..=90.0).contains(&lat) {
//!         return Err(TripError::Validation(format!("latitude {lat} out of range")));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all pipeline operations.
#[derive(Error, Debug)]
pub enum TripError {
    /// I/O errors (file access, directory copies, cache files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Loading raw trip or routing tables failed
    #[error("Load error: {0}")]
    Load(String),

    /// Input or parameter validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Feature derivation errors
    #[error("Feature error: {0}")]
    Feature(String),

    /// Routing join / imputation errors
    #[error("Join error: {0}")]
    Join(String),

    /// Train/validation split errors
    #[error("Split error: {0}")]
    Split(String),

    /// Target bucketization errors
    #[error("Bucketize error: {0}")]
    Bucketize(String),

    /// Result cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl TripError {
    /// Short name of the stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            TripError::Io(_) => "io",
            TripError::Load(_) => "loading",
            TripError::Validation(_) => "validation",
            TripError::Feature(_) => "feature derivation",
            TripError::Join(_) => "joining",
            TripError::Split(_) => "splitting",
            TripError::Bucketize(_) => "bucketizing",
            TripError::Cache(_) => "cache",
            TripError::Config(_) => "configuration",
            TripError::Other(_) => "other",
        }
    }
}

/// Convenience type alias for Results using TripError.
pub type TripResult<T> = Result<T, TripError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for TripError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TripError>() {
            Ok(trip) => trip,
            Err(other) => TripError::Other(other.to_string()),
        }
    }
}

impl From<String> for TripError {
    fn from(s: String) -> Self {
        TripError::Other(s)
    }
}

impl From<&str> for TripError {
    fn from(s: &str) -> Self {
        TripError::Other(s.to_string())
    }
}

// Cache entries are serde_json payloads
impl From<serde_json::Error> for TripError {
    fn from(err: serde_json::Error) -> Self {
        TripError::Cache(err.to_string())
    }
}
