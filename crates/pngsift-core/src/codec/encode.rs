//! Row-at-a-time PNG encoder.
//!
//! Accepts a header descriptor, then a stream of rows, then a finalize call.
//! Rows are deflated through a streaming zlib state; [`RowEncoder::flush`]
//! performs a zlib sync flush and emits the staged bytes as one IDAT chunk,
//! so the sink sees valid, decodable output after every flushed row.

use std::io::Write;

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::{PipelineError, PipelineResult};

use super::{write_chunk, ImageHeader, CHUNK_IDAT, CHUNK_IEND, CHUNK_IHDR, PNG_SIGNATURE};

/// Spare capacity reserved in the deflate staging buffer per call.
const DEFLATE_BUF_SIZE: usize = 8 * 1024;

/// Streaming PNG encoder writing one row at a time.
#[derive(Debug)]
pub struct RowEncoder<W: Write> {
    sink: W,
    deflater: Compress,
    /// Deflate output staged until the next IDAT emission
    staged: Vec<u8>,
    /// Filter byte + scanline scratch
    row_buf: Vec<u8>,
    row_bytes: usize,
    rows_expected: u32,
    rows_received: u32,
    bytes_written: u64,
}

impl<W: Write> RowEncoder<W> {
    /// Create an encoder and immediately write the signature and IHDR.
    pub fn new(mut sink: W, header: &ImageHeader) -> PipelineResult<Self> {
        header
            .validate()
            .map_err(|e| PipelineError::CodecInit(e.to_string()))?;

        let row_bytes = header.row_bytes();
        let mut bytes_written = PNG_SIGNATURE.len() as u64;
        sink.write_all(&PNG_SIGNATURE)?;

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&header.width.to_be_bytes());
        ihdr.extend_from_slice(&header.height.to_be_bytes());
        ihdr.extend_from_slice(&[
            header.bit_depth,
            header.color_type,
            header.compression,
            header.filter,
            header.interlace,
        ]);
        bytes_written += write_chunk(&mut sink, CHUNK_IHDR, &ihdr)?;
        sink.flush()?;

        Ok(Self {
            sink,
            deflater: Compress::new(Compression::default(), true),
            staged: Vec::with_capacity(DEFLATE_BUF_SIZE),
            row_buf: vec![0u8; 1 + row_bytes],
            row_bytes,
            rows_expected: header.height,
            rows_received: 0,
            bytes_written,
        })
    }

    /// Total bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Deflate one row into the staging buffer.
    ///
    /// The row must be exactly the header's row length, and at most the
    /// header's height rows may be written. Nothing reaches the sink until
    /// [`flush`](Self::flush) or [`finish`](Self::finish).
    pub fn write_row(&mut self, row: &[u8]) -> PipelineResult<()> {
        if row.len() != self.row_bytes {
            return Err(PipelineError::CodecProcessing(format!(
                "row length {} does not match header row length {}",
                row.len(),
                self.row_bytes
            )));
        }
        if self.rows_received == self.rows_expected {
            return Err(PipelineError::CodecProcessing(format!(
                "too many rows: header declares {}",
                self.rows_expected
            )));
        }
        self.rows_received += 1;
        // Filter type None; the decoder on the other end reconstructs rows
        // regardless, and None keeps the encode path single-pass.
        self.row_buf[0] = 0;
        self.row_buf[1..].copy_from_slice(row);
        let row_buf = std::mem::take(&mut self.row_buf);
        let result = self.deflate(&row_buf, FlushCompress::None);
        self.row_buf = row_buf;
        result
    }

    /// Sync-flush the zlib stream, emit staged bytes as an IDAT chunk, and
    /// flush the sink so the output is incrementally observable.
    pub fn flush(&mut self) -> PipelineResult<()> {
        self.deflate(&[], FlushCompress::Sync)?;
        self.emit_idat()?;
        self.sink.flush()?;
        Ok(())
    }

    /// Finish the zlib stream, write the final IDAT and the IEND trailer,
    /// flush, and return the sink with the total byte count.
    pub fn finish(mut self) -> PipelineResult<(W, u64)> {
        if self.rows_received < self.rows_expected {
            return Err(PipelineError::CodecProcessing(format!(
                "incomplete image: {} of {} rows written",
                self.rows_received, self.rows_expected
            )));
        }
        self.deflate(&[], FlushCompress::Finish)?;
        self.emit_idat()?;
        self.bytes_written += write_chunk(&mut self.sink, CHUNK_IEND, &[])?;
        self.sink.flush()?;
        Ok((self.sink, self.bytes_written))
    }

    /// Write staged deflate output as one IDAT chunk, if any.
    fn emit_idat(&mut self) -> PipelineResult<()> {
        if !self.staged.is_empty() {
            self.bytes_written += write_chunk(&mut self.sink, CHUNK_IDAT, &self.staged)?;
            self.staged.clear();
        }
        Ok(())
    }

    /// Run the deflater until `input` is consumed and, for flushing modes,
    /// until all pending output has been drained into `staged`.
    fn deflate(&mut self, mut input: &[u8], flush: FlushCompress) -> PipelineResult<()> {
        loop {
            self.staged.reserve(DEFLATE_BUF_SIZE);
            let spare = self.staged.capacity() - self.staged.len();
            let before_in = self.deflater.total_in();
            let before_out = self.deflater.total_out();
            let status = self
                .deflater
                .compress_vec(input, &mut self.staged, flush)
                .map_err(|e| PipelineError::CodecProcessing(format!("deflate error: {e}")))?;
            let consumed = (self.deflater.total_in() - before_in) as usize;
            let produced = (self.deflater.total_out() - before_out) as usize;
            input = &input[consumed..];

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok | Status::BufError => {
                    if !input.is_empty() {
                        if consumed == 0 && produced == 0 {
                            return Err(PipelineError::CodecProcessing(
                                "deflate made no progress".into(),
                            ));
                        }
                        continue;
                    }
                    match flush {
                        FlushCompress::None => return Ok(()),
                        // Finish completes only via StreamEnd; with ample
                        // output space a stalled stream is an error, not a
                        // reason to spin.
                        FlushCompress::Finish => {
                            if produced == 0 {
                                return Err(PipelineError::CodecProcessing(
                                    "deflate stalled before stream end".into(),
                                ));
                            }
                        }
                        // Sync and friends may still hold output; a call
                        // that left spare room has drained everything.
                        _ => {
                            if produced < spare {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::COLOR_RGB;
    use std::io::Cursor;

    fn rgb_header(width: u32, height: u32) -> ImageHeader {
        ImageHeader {
            width,
            height,
            bit_depth: 8,
            color_type: COLOR_RGB,
            compression: 0,
            filter: 0,
            interlace: 0,
        }
    }

    fn oracle_decode(bytes: &[u8]) -> (png::OutputInfo, Vec<u8>) {
        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        buf.truncate(info.buffer_size());
        (info, buf)
    }

    #[test]
    fn test_round_trip_through_oracle() {
        let header = rgb_header(7, 5);
        let rows: Vec<Vec<u8>> = (0..5)
            .map(|y| (0..21).map(|x| (x * 2 + y * 31) as u8).collect())
            .collect();

        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        for row in &rows {
            encoder.write_row(row).unwrap();
            encoder.flush().unwrap();
        }
        let (bytes, written) = encoder.finish().unwrap();
        assert_eq!(written, bytes.len() as u64);

        let (info, data) = oracle_decode(&bytes);
        assert_eq!((info.width, info.height), (7, 5));
        assert_eq!(data, rows.concat());
    }

    #[test]
    fn test_unflushed_rows_still_finish_cleanly() {
        let header = rgb_header(4, 3);
        let rows: Vec<Vec<u8>> = (0..3).map(|y| vec![y as u8; 12]).collect();

        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        for row in &rows {
            encoder.write_row(row).unwrap();
        }
        let (bytes, _) = encoder.finish().unwrap();

        let (_, data) = oracle_decode(&bytes);
        assert_eq!(data, rows.concat());
    }

    #[test]
    fn test_flush_makes_output_observable_per_row() {
        let header = rgb_header(3, 2);
        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        let before = encoder.bytes_written();
        encoder.write_row(&[9u8; 9]).unwrap();
        encoder.flush().unwrap();
        // A sync flush must have pushed an IDAT chunk to the sink.
        assert!(encoder.bytes_written() > before);
    }

    #[test]
    fn test_wrong_row_length_rejected() {
        let header = rgb_header(4, 4);
        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        let err = encoder.write_row(&[0u8; 5]).unwrap_err();
        assert!(err.to_string().contains("row length"));
    }

    #[test]
    fn test_row_overflow_rejected() {
        let header = rgb_header(2, 1);
        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        encoder.write_row(&[0u8; 6]).unwrap();
        let err = encoder.write_row(&[0u8; 6]).unwrap_err();
        assert!(err.to_string().contains("too many rows"));
    }

    #[test]
    fn test_incomplete_image_cannot_finish() {
        let header = rgb_header(2, 3);
        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        encoder.write_row(&[0u8; 6]).unwrap();
        let err = encoder.finish().unwrap_err();
        assert!(err.to_string().contains("incomplete image"));
    }

    #[test]
    fn test_invalid_header_is_codec_init_error() {
        let mut header = rgb_header(4, 4);
        header.bit_depth = 16;
        let err = RowEncoder::new(Vec::new(), &header).unwrap_err();
        assert!(matches!(err, PipelineError::CodecInit(_)));
    }

    #[test]
    fn test_header_fields_survive_verbatim() {
        let header = ImageHeader {
            width: 2,
            height: 2,
            bit_depth: 8,
            color_type: crate::codec::COLOR_GREY_ALPHA,
            compression: 0,
            filter: 0,
            interlace: 0,
        };
        let mut encoder = RowEncoder::new(Vec::new(), &header).unwrap();
        encoder.write_row(&[1, 2, 3, 4]).unwrap();
        encoder.write_row(&[5, 6, 7, 8]).unwrap();
        let (bytes, _) = encoder.finish().unwrap();

        let (info, data) = oracle_decode(&bytes);
        assert_eq!(info.color_type, png::ColorType::GrayscaleAlpha);
        assert_eq!(info.bit_depth, png::BitDepth::Eight);
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
