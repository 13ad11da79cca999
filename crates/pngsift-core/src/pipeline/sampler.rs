//! In-place spatial row sampling.
//!
//! Pure transformation: nearest-index decimation, no interpolation or
//! averaging. Rows whose index is not a multiple of the sample rate are
//! dropped; retained rows are shortened in place by keeping every
//! `sample_rate`-th pixel group.

/// Downsample one decoded row in place.
///
/// Returns `None` when the row is dropped entirely (vertical decimation),
/// otherwise `Some(len)` where `len` is the number of leading bytes now
/// holding valid downsampled data. The remainder of the buffer is left
/// untouched.
///
/// A source pixel group is copied only when the full group lies strictly
/// within `row_width`; the write position still advances for a group that
/// fails the bound check, so `len` counts the ceil-overhang slot. Callers
/// consume the `output_width * channels` prefix, which the skipped group
/// never reaches for sample rates above 1 and which the identity copy
/// already holds for sample rate 1.
pub fn sample_row(
    row: &mut [u8],
    row_width: usize,
    channels: usize,
    row_index: u32,
    sample_rate: u32,
) -> Option<usize> {
    if row_index % sample_rate != 0 {
        return None;
    }

    let stride = sample_rate as usize * channels;
    let mut write_pos = 0;
    let mut i = 0;
    while i < row_width {
        if i + channels < row_width {
            row.copy_within(i..i + channels, write_pos);
        }
        write_pos += channels;
        i += stride;
    }
    Some(write_pos)
}
