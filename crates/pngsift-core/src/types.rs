//! Core data types for the pngsift streaming pipeline.
//!
//! These types carry the caller-facing inputs (options) and outputs (run
//! report) of a conversion.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::ConfigError;

/// Options controlling a single conversion.
#[derive(Debug, Clone)]
pub struct SiftOptions {
    /// Integer stride for both row and pixel decimation; 1 keeps every pixel
    pub sample_rate: u32,

    /// I/O chunk buffer size in bytes
    pub chunk_size: usize,
}

impl Default for SiftOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SiftOptions {
    /// Create options with the given sample rate and the default chunk size.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Validate option values before starting a conversion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Validation("sample_rate must be > 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size must be > 0".into()));
        }
        Ok(())
    }
}

/// The complete output report for one converted image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiftReport {
    // === Geometry ===
    /// Source image width in pixels
    pub source_width: u32,

    /// Source image height in pixels
    pub source_height: u32,

    /// Output image width in pixels
    pub output_width: u32,

    /// Output image height in pixels
    pub output_height: u32,

    /// Sample stride used for the conversion
    pub sample_rate: u32,

    // === Streaming counters ===
    /// Rows actually written to the sink
    pub rows_written: u32,

    /// Total bytes consumed from the source
    pub bytes_read: u64,

    /// Total bytes written to the sink
    pub bytes_written: u64,

    /// Chunks handed to the decoder
    pub chunks_fed: u64,

    /// Suspend/resume cycles the reader went through
    pub resume_count: u64,
}

impl SiftReport {
    /// Serialize the report to a JSON string.
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
