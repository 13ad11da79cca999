//! pngsift core - low-memory streaming PNG downsampling.
//!
//! pngsift streams a PNG from a byte source in small fixed-size chunks,
//! decodes it progressively, keeps every Nth pixel of every Nth row, and
//! writes the reduced image to a PNG sink incrementally. Peak memory is
//! bounded by one chunk buffer plus a decoded row pair, regardless of
//! image size.
//!
//! # Architecture
//!
//! ```text
//! source -> ChunkedReader -> ProgressivePipeline -> sink
//!                              | decode (header/row/end hooks)
//!                              | sample (row + pixel stride)
//!                              | encode (row-at-a-time, flushed)
//! ```
//!
//! The whole run is single-threaded and cooperative: the [`pipeline::Driver`]
//! resumes the reader until a chunk is ready, feeds it to the decoder, and
//! repeats until the image trailer has been written.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pngsift_core::{shrink_png, SiftOptions};
//!
//! fn main() -> pngsift_core::Result<()> {
//!     let source = std::fs::File::open("large.png")?;
//!     let sink = std::fs::File::create("small.png")?;
//!     let report = shrink_png(source, sink, &SiftOptions::with_sample_rate(4))?;
//!     println!("{}x{}", report.output_width, report.output_height);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ConfigError, PipelineError, PipelineResult, PngsiftError, Result};
pub use pipeline::{ChunkedReader, Driver, DriverState, ProgressivePipeline};
pub use types::{SiftOptions, SiftReport};

use std::io::{Read, Write};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convert one PNG stream, writing the downsampled image to `sink`.
///
/// Reads `source` to completion in `options.chunk_size`-byte steps and
/// returns a run report on success. Any decode or I/O error aborts the
/// conversion; bytes already flushed to the sink are left as-is (callers
/// that own a file path can unlink it).
pub fn shrink_png<R: Read, W: Write>(
    source: R,
    sink: W,
    options: &SiftOptions,
) -> Result<SiftReport> {
    options.validate()?;
    tracing::debug!(
        sample_rate = options.sample_rate,
        chunk_size = options.chunk_size,
        "starting conversion"
    );

    let reader = ChunkedReader::new(source, options.chunk_size);
    let pipeline = ProgressivePipeline::new(sink, options.sample_rate);
    let mut driver = Driver::new(reader, pipeline);
    driver.run()?;
    Ok(driver.report())
}
