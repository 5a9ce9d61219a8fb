use std::ops::Range;

/// Split `rows` into at most `count` contiguous bands of equal size; the last band takes the
/// remainder. Empty input yields no bands.
pub fn row_bands(rows: Range<usize>, count: usize) -> Vec<Range<usize>> {
    let len = rows.len();
    if len == 0 {
        return Vec::new();
    }
    let count = count.clamp(1, len);
    let size = len / count;
    (0..count)
        .map(|i| {
            let start = rows.start + i * size;
            let end = if i + 1 == count {
                rows.end
            } else {
                start + size
            };
            start..end
        })
        .collect()
}

/// Bands for line-blend over a plane of `height` rows: every band starts on an even row and
/// holds whole (even, odd) pairs, except that the last band also covers a trailing even row.
pub fn pair_bands(height: usize, count: usize) -> Vec<Range<usize>> {
    let pairs = height / 2;
    if pairs == 0 {
        return Vec::new();
    }
    let mut bands: Vec<Range<usize>> = row_bands(0..pairs, count)
        .into_iter()
        .map(|b| 2 * b.start..2 * b.end)
        .collect();
    if let Some(last) = bands.last_mut() {
        last.end = height;
    }
    bands
}

/// Carve `buf` into one mutable slice per band.
///
/// `bands` must be sorted and non-overlapping; rows between bands are skipped.
pub fn split_rows_mut<'a>(
    mut buf: &'a mut [u8],
    stride: usize,
    bands: &[Range<usize>],
) -> Vec<&'a mut [u8]> {
    let mut out = Vec::with_capacity(bands.len());
    let mut row = 0;
    for band in bands {
        debug_assert!(band.start >= row, "bands must be sorted and disjoint");
        let (_, rest) = std::mem::take(&mut buf).split_at_mut((band.start - row) * stride);
        let (head, tail) = rest.split_at_mut(band.len() * stride);
        out.push(head);
        buf = tail;
        row = band.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_goes_to_last_band() {
        assert_eq!(row_bands(1..11, 3), vec![1..4, 4..7, 7..11]);
    }

    #[test]
    fn band_count_is_clamped_to_rows() {
        assert_eq!(row_bands(0..2, 8), vec![0..1, 1..2]);
        assert_eq!(row_bands(0..5, 0), vec![0..5]);
        assert!(row_bands(3..3, 4).is_empty());
    }

    #[test]
    fn pair_bands_start_on_even_rows() {
        let bands = pair_bands(11, 3);
        assert_eq!(bands, vec![0..2, 2..4, 4..11]);
        assert!(bands.iter().all(|b| b.start % 2 == 0));
        assert!(pair_bands(1, 4).is_empty());
    }

    #[test]
    fn split_rows_skips_gaps() {
        let mut buf: Vec<u8> = (0..10).collect();
        let parts = split_rows_mut(&mut buf, 2, &[1..2, 3..5]);
        assert_eq!(parts.len(), 2);
        assert_eq!(&*parts[0], &[2, 3]);
        assert_eq!(&*parts[1], &[6, 7, 8, 9]);
    }
}
