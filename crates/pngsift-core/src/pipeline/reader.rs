//! Cooperative chunked reading from the byte source.
//!
//! The reader fills a fixed-capacity buffer across one or more read steps.
//! A step that can't fill the buffer "suspends": control returns to the
//! driver, and the next call resumes filling from the same cursor. This is
//! cooperative scheduling, not OS blocking - the only resumer is the same
//! process loop.

use std::io::Read;

use crate::error::{PipelineError, PipelineResult};

/// Outcome of one read step.
#[derive(Debug)]
pub struct ReadStep<'a> {
    /// The valid prefix of the chunk buffer; empty while suspended
    pub bytes: &'a [u8],
    /// Whether the reader wants to be resumed before the chunk is consumed
    pub suspend: bool,
}

/// Owns the input byte source and a fixed-capacity chunk buffer.
pub struct ChunkedReader<R: Read> {
    source: R,
    buffer: Box<[u8]>,
    /// Cursor marking the buffer's valid prefix; `0 ≤ total_read ≤ capacity`
    total_read: usize,
}

impl<R: Read> ChunkedReader<R> {
    /// Create a reader with the given chunk capacity in bytes.
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            buffer: vec![0u8; chunk_size].into_boxed_slice(),
            total_read: 0,
        }
    }

    /// Attempt one fill step from the current cursor.
    ///
    /// Outcomes:
    /// - source at EOF: `suspend = false`, `bytes` is whatever prefix
    ///   accumulated (possibly empty) - still valid to process
    /// - buffer full: `suspend = false`, full chunk available
    /// - partial fill: `suspend = true`, call again to keep filling
    /// - read failure: `PipelineError::Io`, the task is unusable
    pub fn read_next(&mut self) -> PipelineResult<ReadStep<'_>> {
        let capacity = self.buffer.len();
        if self.total_read < capacity {
            let read = loop {
                match self.source.read(&mut self.buffer[self.total_read..]) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(PipelineError::Io(e)),
                }
            };
            if read == 0 {
                tracing::debug!(bytes = self.total_read, "reached end of source");
                return Ok(ReadStep {
                    bytes: &self.buffer[..self.total_read],
                    suspend: false,
                });
            }
            self.total_read += read;
            debug_assert!(self.total_read <= capacity);
            if self.total_read < capacity {
                return Ok(ReadStep {
                    bytes: &[],
                    suspend: true,
                });
            }
        }
        Ok(ReadStep {
            bytes: &self.buffer[..self.total_read],
            suspend: false,
        })
    }

    /// Clear the cursor so the buffer can be reused for the next chunk.
    pub fn reset(&mut self) {
        self.total_read = 0;
    }
}
