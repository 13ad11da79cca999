//! Streaming conversion pipeline components.
//!
//! This module contains all the stages of the decode-sample-encode pipeline:
//! - **reader**: cooperative chunked reads from the byte source
//! - **sampler**: in-place row and pixel decimation
//! - **progressive**: decoder hooks wired to the sampler and encoder
//! - **driver**: the resume-until-done scheduling loop

pub mod driver;
pub mod progressive;
pub mod reader;
pub mod sampler;

// Re-exports for convenient access
pub use driver::{Driver, DriverState};
pub use progressive::ProgressivePipeline;
pub use reader::{ChunkedReader, ReadStep};
pub use sampler::sample_row;
