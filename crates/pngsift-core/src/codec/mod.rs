//! Streaming PNG codec.
//!
//! Two halves, consumed by the pipeline through a narrow interface:
//! - **decode**: a push-based progressive decoder that accepts arbitrary
//!   byte chunks and invokes the [`DecodeSink`] hooks (header, row, end)
//!   synchronously as the bitstream becomes decodable
//! - **encode**: a row-at-a-time encoder that writes a header descriptor,
//!   then a stream of rows, then a finalize call
//!
//! The codec owns all bitstream-level decisions: chunk framing and CRCs,
//! the zlib layer (via `flate2`), and scanline filtering. The pipeline only
//! sees decoded row bytes and header fields.

pub mod decode;
pub mod encode;

use std::io::Write;

use crate::error::{PipelineError, PipelineResult};

pub use decode::StreamDecoder;
pub use encode::RowEncoder;

/// PNG file signature.
pub(crate) const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

pub(crate) const CHUNK_IHDR: [u8; 4] = *b"IHDR";
pub(crate) const CHUNK_IDAT: [u8; 4] = *b"IDAT";
pub(crate) const CHUNK_IEND: [u8; 4] = *b"IEND";

pub(crate) const COLOR_GREYSCALE: u8 = 0;
pub(crate) const COLOR_RGB: u8 = 2;
pub(crate) const COLOR_PALETTE: u8 = 3;
pub(crate) const COLOR_GREY_ALPHA: u8 = 4;
pub(crate) const COLOR_RGBA: u8 = 6;

/// Image geometry and encoding parameters from the IHDR chunk.
///
/// The output header of a conversion reuses these fields verbatim except for
/// `width`/`height`, which are divided by the sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bits per channel
    pub bit_depth: u8,
    /// PNG color type (0, 2, 4, or 6 supported)
    pub color_type: u8,
    /// Compression method (always 0 in valid PNGs)
    pub compression: u8,
    /// Filter method (always 0 in valid PNGs)
    pub filter: u8,
    /// Interlace method (only 0, non-interlaced, is supported)
    pub interlace: u8,
}

impl ImageHeader {
    /// Bytes per pixel (channel count; this codec is 8 bits per channel).
    pub fn channels(&self) -> usize {
        match self.color_type {
            COLOR_GREYSCALE => 1,
            COLOR_RGB => 3,
            COLOR_GREY_ALPHA => 2,
            COLOR_RGBA => 4,
            _ => 1,
        }
    }

    /// Byte length of one decoded row (without the leading filter byte).
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels()
    }

    /// Check the header against what this codec supports.
    pub(crate) fn validate(&self) -> PipelineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::CodecProcessing(
                "zero image dimensions".into(),
            ));
        }
        match self.color_type {
            COLOR_GREYSCALE | COLOR_RGB | COLOR_GREY_ALPHA | COLOR_RGBA => {}
            COLOR_PALETTE => {
                return Err(PipelineError::CodecProcessing(
                    "palette images not supported".into(),
                ));
            }
            other => {
                return Err(PipelineError::CodecProcessing(format!(
                    "unknown color type {other}"
                )));
            }
        }
        if self.bit_depth != 8 {
            return Err(PipelineError::CodecProcessing(format!(
                "unsupported bit depth {} (only 8-bit channels)",
                self.bit_depth
            )));
        }
        if self.compression != 0 || self.filter != 0 {
            return Err(PipelineError::CodecProcessing(
                "unknown compression or filter method".into(),
            ));
        }
        if self.interlace != 0 {
            return Err(PipelineError::CodecProcessing(
                "interlaced (Adam7) images not supported".into(),
            ));
        }
        Ok(())
    }
}

/// Row geometry the decoder computed for the current image, handed to the
/// header hook so the pipeline never re-derives it.
#[derive(Debug, Clone, Copy)]
pub struct RowGeometry {
    /// Bytes per decoded row
    pub row_bytes: usize,
    /// Bytes per pixel
    pub channels: usize,
}

/// Hooks the progressive decoder invokes as the stream becomes decodable.
///
/// Called synchronously from [`StreamDecoder::feed`], in fixed relative
/// order: header once, rows in increasing index order, end once. Errors
/// propagate out through the feed call - they are never swallowed.
pub trait DecodeSink {
    /// The image header has been read and validated.
    fn on_header(&mut self, header: &ImageHeader, geometry: RowGeometry) -> PipelineResult<()>;

    /// One full row has been decoded and defiltered.
    ///
    /// The row is mutable so the caller can transform it in place; the
    /// decoder keeps its own pristine copy for defiltering the next row.
    fn on_row(&mut self, row: &mut [u8], row_index: u32, pass: u8) -> PipelineResult<()>;

    /// The image trailer has been read; no further hooks will fire.
    fn on_end(&mut self) -> PipelineResult<()>;
}

/// Big-endian u32 (PNG uses network byte order).
#[inline]
pub(crate) fn be_u32(d: &[u8], o: usize) -> u32 {
    u32::from_be_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

/// Write one PNG chunk: length, type, data, CRC over type + data.
///
/// Returns the number of bytes written to the sink.
pub(crate) fn write_chunk<W: Write>(
    sink: &mut W,
    chunk_type: [u8; 4],
    data: &[u8],
) -> std::io::Result<u64> {
    sink.write_all(&(data.len() as u32).to_be_bytes())?;
    sink.write_all(&chunk_type)?;
    sink.write_all(data)?;
    let mut crc = crc32fast::Hasher::new();
    crc.update(&chunk_type);
    crc.update(data);
    sink.write_all(&crc.finalize().to_be_bytes())?;
    Ok(12 + data.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_channels_per_color_type() {
        let mut header = rgb_header(10, 10);
        assert_eq!(header.channels(), 3);
        header.color_type = COLOR_GREYSCALE;
        assert_eq!(header.channels(), 1);
        header.color_type = COLOR_GREY_ALPHA;
        assert_eq!(header.channels(), 2);
        header.color_type = COLOR_RGBA;
        assert_eq!(header.channels(), 4);
    }

    #[test]
    fn test_row_bytes() {
        assert_eq!(rgb_header(100, 50).row_bytes(), 300);
    }

    #[test]
    fn test_validate_rejects_palette_and_interlace() {
        let mut header = rgb_header(10, 10);
        header.color_type = COLOR_PALETTE;
        assert!(header.validate().is_err());

        let mut header = rgb_header(10, 10);
        header.interlace = 1;
        let err = header.validate().unwrap_err();
        assert!(err.to_string().contains("interlaced"));
    }

    #[test]
    fn test_validate_rejects_non_byte_depths() {
        for depth in [1, 2, 4, 16] {
            let mut header = rgb_header(10, 10);
            header.bit_depth = depth;
            assert!(header.validate().is_err(), "depth {depth} should fail");
        }
        assert!(rgb_header(10, 10).validate().is_ok());
    }

    #[test]
    fn test_write_chunk_framing() {
        let mut out = Vec::new();
        let written = write_chunk(&mut out, CHUNK_IEND, &[]).unwrap();
        assert_eq!(written, 12);
        // length 0, type IEND, then the well-known IEND CRC
        assert_eq!(&out[..8], b"\x00\x00\x00\x00IEND");
        assert_eq!(&out[8..], &[0xae, 0x42, 0x60, 0x82]);
    }
}
