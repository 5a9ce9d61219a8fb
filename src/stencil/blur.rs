use std::ops::Range;

/// Sum of the 3x3 weights `{1,2,1; 2,4,2; 1,2,1}`.
pub const BLUR_WEIGHT_TOTAL: u32 = 16;

/// Blur one interior pixel at column `x` from rows above, at and below.
#[inline]
pub fn blur_px(above: &[u8], row: &[u8], below: &[u8], x: usize) -> u8 {
    let tap = |r: &[u8]| u32::from(r[x - 1]) + 2 * u32::from(r[x]) + u32::from(r[x + 1]);
    let sum = tap(above) + 2 * tap(row) + tap(below);
    ((sum + BLUR_WEIGHT_TOTAL / 2) / BLUR_WEIGHT_TOTAL) as u8
}

/// Blur columns `cols` of row `y` of `src` into `out` (a row-sized buffer).
pub fn blur_cols(src: &[u8], stride: usize, y: usize, cols: Range<usize>, out: &mut [u8]) {
    let above = &src[(y - 1) * stride..y * stride];
    let row = &src[y * stride..(y + 1) * stride];
    let below = &src[(y + 1) * stride..(y + 2) * stride];
    for x in cols {
        out[x] = blur_px(above, row, below, x);
    }
}

/// Blur the interior columns of `rows` into `out`, one `stride`-sized row per source row.
///
/// `rows` must lie within `1..height-1` of the plane held in `src`.
pub fn blur_rows_into(src: &[u8], stride: usize, rows: Range<usize>, out: &mut [u8]) {
    if stride < 3 {
        return;
    }
    for (y, dst) in rows.zip(out.chunks_exact_mut(stride)) {
        blur_cols(src, stride, y, 1..stride - 1, dst);
    }
}

/// Copy the interior columns of every scratch row back into the plane rows.
pub fn copy_back_rows(dst: &mut [u8], scratch: &[u8], stride: usize) {
    if stride < 3 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(stride).zip(scratch.chunks_exact(stride)) {
        d[1..stride - 1].copy_from_slice(&s[1..stride - 1]);
    }
}

/// Rows a blur rewrites for a plane `height` rows tall.
pub fn interior_rows(height: usize) -> Range<usize> {
    if height < 3 { 1..1 } else { 1..height - 1 }
}

/// Whether a plane is large enough to have interior pixels.
pub fn has_interior(stride: usize, height: usize) -> bool {
    stride >= 3 && height >= 3
}

/// Blur a whole plane in place using `scratch` for the snapshot-computed rows.
pub fn blur_plane(data: &mut [u8], stride: usize, height: usize, scratch: &mut Vec<u8>) {
    if !has_interior(stride, height) {
        return;
    }
    let rows = interior_rows(height);
    scratch.resize(rows.len() * stride, 0);
    blur_rows_into(data, stride, rows.clone(), scratch);
    copy_back_rows(&mut data[rows.start * stride..rows.end * stride], scratch, stride);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_plane_is_unchanged() {
        let mut data = vec![77u8; 5 * 4];
        let mut scratch = Vec::new();
        blur_plane(&mut data, 5, 4, &mut scratch);
        assert!(data.iter().all(|&v| v == 77));
    }

    #[test]
    fn single_spike_spreads_with_rounding() {
        let mut data = vec![0u8; 9];
        data[4] = 160;
        let mut scratch = Vec::new();
        blur_plane(&mut data, 3, 3, &mut scratch);
        // Only the centre is interior: 160 * 4 / 16.
        assert_eq!(data[4], 40);
        assert_eq!(data.iter().filter(|&&v| v != 0).count(), 1);
    }

    #[test]
    fn rounds_to_nearest() {
        // sum = 4 * 2 = 8, (8 + 8) >> 4 = 1
        let mut data = vec![0u8; 9];
        data[4] = 2;
        let mut scratch = Vec::new();
        blur_plane(&mut data, 3, 3, &mut scratch);
        assert_eq!(data[4], 1);
    }

    #[test]
    fn reads_come_from_the_unmodified_snapshot() {
        #[rustfmt::skip]
        let mut data = vec![
            0, 0, 0, 0,
            0, 255, 0, 0,
            0, 0, 0, 0,
            0, 0, 0, 0,
        ];
        let mut scratch = Vec::new();
        blur_plane(&mut data, 4, 4, &mut scratch);
        // (1,1): 255*4 = 1020 -> 64; (2,1): 255*2 = 510 -> 32; (1,2): 32; (2,2): 255 -> 16.
        assert_eq!(&data[5..7], &[64, 32]);
        assert_eq!(&data[9..11], &[32, 16]);
    }

    #[test]
    fn thin_planes_are_unchanged() {
        let mut scratch = Vec::new();
        let mut one_row = vec![1, 200, 3, 4];
        blur_plane(&mut one_row, 4, 1, &mut scratch);
        assert_eq!(one_row, vec![1, 200, 3, 4]);

        let mut one_col = vec![1, 200, 3, 4];
        blur_plane(&mut one_col, 1, 4, &mut scratch);
        assert_eq!(one_col, vec![1, 200, 3, 4]);
    }
}
