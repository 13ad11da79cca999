//! Error types for the pngsift streaming pipeline.
//!
//! Errors are organized by layer: configuration problems are separated from
//! pipeline failures, and every pipeline failure is unrecoverable for the
//! current image - the run aborts, resources are dropped, and the error
//! surfaces to the caller.

use thiserror::Error;

/// Top-level error type for pngsift operations.
#[derive(Error, Debug)]
pub enum PngsiftError {
    /// Configuration or option validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors (report output)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration or option values are invalid
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Pipeline processing errors.
///
/// All of these abort the current conversion; there is no per-step retry.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source read or sink write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoder or encoder construction failed
    #[error("Codec initialization failed: {0}")]
    CodecInit(String),

    /// Sample rate exceeds the image dimensions, so at least one output
    /// dimension would truncate to zero
    #[error("Sample rate {sample_rate} out of range for {width}x{height} image")]
    InvalidSampleRate {
        sample_rate: u32,
        width: u32,
        height: u32,
    },

    /// Internal invariant violation: a hook fired without a valid context
    #[error("Processing context missing: {0}")]
    MissingContext(&'static str),

    /// Malformed or truncated PNG bitstream
    #[error("PNG stream error: {0}")]
    CodecProcessing(String),
}

/// Convenience type alias for pngsift results.
pub type Result<T> = std::result::Result<T, PngsiftError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
