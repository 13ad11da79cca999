//! Progressive decode-sample-encode wiring.
//!
//! [`ProgressivePipeline`] owns the stream decoder and a shared processing
//! context. The context implements the decoder's three hooks: the header
//! hook sets up encoder geometry and writes the output header, the row hook
//! runs the sampler and writes retained rows through the encoder, and the
//! end hook finalizes the sink and marks the conversion done.

use std::io::Write;

use crate::codec::{DecodeSink, ImageHeader, RowEncoder, RowGeometry, StreamDecoder};
use crate::error::{PipelineError, PipelineResult};

use super::sampler::sample_row;

/// Mutable state shared between the three decoder hooks and the driver.
///
/// Constructed once per image, borrowed by every hook invocation, dropped
/// when the pipeline terminates.
struct SiftContext<W: Write> {
    /// Set exactly once, by the end hook
    is_done: bool,
    /// Bytes per decoded row; set by the header hook, immutable afterward
    row_width: usize,
    /// Bytes per pixel; set by the header hook
    channels: usize,
    /// Bytes per output row the encoder consumes
    out_row_width: usize,
    /// Rows the output header declares; retained rows beyond this are
    /// dropped (the vertical analog of consuming only the output-width
    /// prefix of a sampled row)
    out_rows: u32,
    /// Caller-supplied stride, immutable for the pipeline lifetime
    sample_rate: u32,
    /// The sink, held until the header hook hands it to the encoder
    sink: Option<W>,
    /// Created by the header hook, consumed by the end hook
    encoder: Option<RowEncoder<W>>,
    source_size: Option<(u32, u32)>,
    output_size: Option<(u32, u32)>,
    rows_written: u32,
    bytes_written: u64,
}

impl<W: Write> DecodeSink for SiftContext<W> {
    fn on_header(&mut self, header: &ImageHeader, geometry: RowGeometry) -> PipelineResult<()> {
        // A second header must not double-create the sink header.
        let Some(sink) = self.sink.take() else {
            return Err(PipelineError::CodecProcessing(
                "duplicate image header".into(),
            ));
        };

        if header.width < self.sample_rate || header.height < self.sample_rate {
            return Err(PipelineError::InvalidSampleRate {
                sample_rate: self.sample_rate,
                width: header.width,
                height: header.height,
            });
        }

        let out_width = header.width / self.sample_rate;
        let out_height = header.height / self.sample_rate;
        let out_header = ImageHeader {
            width: out_width,
            height: out_height,
            ..*header
        };
        tracing::debug!(
            "image {}x{} -> output {}x{} at sample rate {}",
            header.width,
            header.height,
            out_width,
            out_height,
            self.sample_rate
        );

        // Creating the encoder also writes the output signature + header.
        self.encoder = Some(RowEncoder::new(sink, &out_header)?);
        self.row_width = geometry.row_bytes;
        self.channels = geometry.channels;
        self.out_row_width = out_width as usize * geometry.channels;
        self.out_rows = out_height;
        self.source_size = Some((header.width, header.height));
        self.output_size = Some((out_width, out_height));
        Ok(())
    }

    fn on_row(&mut self, row: &mut [u8], row_index: u32, _pass: u8) -> PipelineResult<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(PipelineError::MissingContext("row arrived before header"));
        };
        if self.rows_written == self.out_rows {
            // Ceil-overhang row past the declared output height
            return Ok(());
        }
        let Some(valid) = sample_row(row, self.row_width, self.channels, row_index, self.sample_rate)
        else {
            return Ok(());
        };
        debug_assert!(valid >= self.out_row_width);
        encoder.write_row(&row[..self.out_row_width])?;
        encoder.flush()?;
        self.rows_written += 1;
        tracing::trace!(row = row_index, "wrote sampled row");
        Ok(())
    }

    fn on_end(&mut self) -> PipelineResult<()> {
        let Some(encoder) = self.encoder.take() else {
            return Err(PipelineError::MissingContext(
                "end of stream without an active encoder",
            ));
        };
        let (_sink, bytes_written) = encoder.finish()?;
        self.bytes_written = bytes_written;
        self.is_done = true;
        tracing::debug!(
            rows = self.rows_written,
            bytes = bytes_written,
            "finalized output image"
        );
        Ok(())
    }
}

/// Owns decoder and encoder handles plus the shared processing context, and
/// drives decoded rows through sampling into the sink.
pub struct ProgressivePipeline<W: Write> {
    decoder: StreamDecoder,
    ctx: SiftContext<W>,
}

impl<W: Write> ProgressivePipeline<W> {
    /// Create a pipeline writing the converted image to `sink`.
    ///
    /// `sample_rate` must be positive; callers validate via
    /// [`SiftOptions::validate`](crate::SiftOptions::validate).
    pub fn new(sink: W, sample_rate: u32) -> Self {
        Self {
            decoder: StreamDecoder::new(),
            ctx: SiftContext {
                is_done: false,
                row_width: 0,
                channels: 0,
                out_row_width: 0,
                out_rows: 0,
                sample_rate,
                sink: Some(sink),
                encoder: None,
                source_size: None,
                output_size: None,
                rows_written: 0,
                bytes_written: 0,
            },
        }
    }

    /// Hand one chunk to the decoder, which invokes zero or more hooks
    /// synchronously before returning.
    pub fn feed(&mut self, chunk: &[u8]) -> PipelineResult<()> {
        self.decoder.feed(chunk, &mut self.ctx)
    }

    /// Whether the end hook has run and the output is finalized.
    pub fn is_done(&self) -> bool {
        self.ctx.is_done
    }

    /// The sample stride this pipeline was created with.
    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Source image dimensions, once the header has been decoded.
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.ctx.source_size
    }

    /// Output image dimensions, once the header has been decoded.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.ctx.output_size
    }

    /// Rows written to the sink so far.
    pub fn rows_written(&self) -> u32 {
        self.ctx.rows_written
    }

    /// Bytes written to the sink so far; final once the conversion is done.
    pub fn bytes_written(&self) -> u64 {
        match &self.ctx.encoder {
            Some(encoder) => encoder.bytes_written(),
            None => self.ctx.bytes_written,
        }
    }
}
