//! The cooperative scheduling loop.
//!
//! The driver is the resumption loop around the reader and the pipeline:
//! resume the reader until it yields a chunk, feed the chunk, reset, repeat.
//! There is exactly one logical task per conversion and one thread of
//! control; suspension just returns control here, and this loop immediately
//! resumes.

use std::io::{Read, Write};

use crate::error::{PipelineError, PipelineResult};
use crate::types::SiftReport;

use super::progressive::ProgressivePipeline;
use super::reader::ChunkedReader;

/// Driver states. The machine advances
/// `Reading -> Feeding -> (Suspended | Reading) -> ... -> Done | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Asking the reader for the next chunk
    Reading,
    /// Handing a chunk to the pipeline
    Feeding,
    /// The reader requested a resume before the chunk is complete
    Suspended,
    /// The pipeline finalized the output
    Done,
    /// A decode or I/O error aborted the run
    Failed,
}

/// Accumulated run statistics.
#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    bytes_read: u64,
    chunks_fed: u64,
    resume_count: u64,
}

/// Owns the reader and pipeline for one conversion and runs it to
/// completion or failure.
pub struct Driver<R: Read, W: Write> {
    reader: ChunkedReader<R>,
    pipeline: ProgressivePipeline<W>,
    state: DriverState,
    stats: RunStats,
}

impl<R: Read, W: Write> Driver<R, W> {
    /// Create a driver over an assembled reader and pipeline.
    pub fn new(reader: ChunkedReader<R>, pipeline: ProgressivePipeline<W>) -> Self {
        Self {
            reader,
            pipeline,
            state: DriverState::Reading,
            stats: RunStats::default(),
        }
    }

    /// Current state of the machine.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run the conversion to completion.
    ///
    /// Terminates when the pipeline reports done, or with an error on any
    /// decode or I/O failure - including reaching EOF before the image
    /// trailer, which would otherwise be a silently incomplete output.
    pub fn run(&mut self) -> PipelineResult<()> {
        loop {
            self.state = DriverState::Reading;
            let step = match self.reader.read_next() {
                Ok(step) => step,
                Err(e) => {
                    self.state = DriverState::Failed;
                    return Err(e);
                }
            };
            if step.suspend {
                // Cooperative wait: the only resumer is this loop, so
                // resume immediately.
                self.state = DriverState::Suspended;
                self.stats.resume_count += 1;
                continue;
            }

            let chunk_len = step.bytes.len();
            self.state = DriverState::Feeding;
            tracing::debug!(bytes = chunk_len, "read chunk");
            if let Err(e) = self.pipeline.feed(step.bytes) {
                self.state = DriverState::Failed;
                return Err(e);
            }
            self.stats.chunks_fed += 1;
            self.stats.bytes_read += chunk_len as u64;
            tracing::debug!(bytes = self.pipeline.bytes_written(), "output so far");

            if self.pipeline.is_done() {
                self.state = DriverState::Done;
                tracing::debug!(
                    bytes_read = self.stats.bytes_read,
                    chunks = self.stats.chunks_fed,
                    "conversion complete"
                );
                return Ok(());
            }
            if chunk_len == 0 {
                // Genuine EOF with nothing left to feed, before the trailer
                self.state = DriverState::Failed;
                return Err(PipelineError::CodecProcessing(
                    "source ended before the image trailer".into(),
                ));
            }
            self.reader.reset();
        }
    }

    /// Assemble the run report. Meaningful once [`run`](Self::run) returned
    /// successfully.
    pub fn report(&self) -> SiftReport {
        let (source_width, source_height) = self.pipeline.source_size().unwrap_or((0, 0));
        let (output_width, output_height) = self.pipeline.output_size().unwrap_or((0, 0));
        SiftReport {
            source_width,
            source_height,
            output_width,
            output_height,
            sample_rate: self.pipeline.sample_rate(),
            rows_written: self.pipeline.rows_written(),
            bytes_read: self.stats.bytes_read,
            bytes_written: self.pipeline.bytes_written(),
            chunks_fed: self.stats.chunks_fed,
            resume_count: self.stats.resume_count,
        }
    }
}
