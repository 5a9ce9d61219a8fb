/// Truncating average of two samples.
#[inline]
pub fn avg(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b)) >> 1) as u8
}

/// Blend `cur` with the row above it, in place.
#[inline]
pub fn blend_row(prev: &[u8], cur: &mut [u8]) {
    for (c, &p) in cur.iter_mut().zip(prev) {
        *c = avg(*c, p);
    }
}

/// Line-blend a run of whole rows whose first row has an even index.
///
/// Every (even, odd) row pair is blended into its odd row over the first `width` columns.
/// A trailing unpaired row is an even row and stays untouched.
pub fn line_blend_band(rows: &mut [u8], stride: usize, width: usize) {
    if stride == 0 {
        return;
    }
    let width = width.min(stride);
    for pair in rows.chunks_exact_mut(2 * stride) {
        let (even, odd) = pair.split_at_mut(stride);
        blend_row(&even[..width], &mut odd[..width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_truncates() {
        assert_eq!(avg(10, 30), 20);
        assert_eq!(avg(1, 2), 1);
        assert_eq!(avg(255, 255), 255);
        assert_eq!(avg(0, 255), 127);
    }

    #[test]
    fn two_by_two_blends_second_row() {
        let mut buf = vec![10, 20, 30, 40];
        line_blend_band(&mut buf, 2, 2);
        assert_eq!(buf, vec![10, 20, 20, 30]);
    }

    #[test]
    fn padding_columns_are_left_alone() {
        let mut buf = vec![0, 0, 9, 100, 100, 9, 50, 50, 9];
        line_blend_band(&mut buf, 3, 2);
        assert_eq!(buf, vec![0, 0, 9, 50, 50, 9, 50, 50, 9]);
    }

    #[test]
    fn single_row_is_unchanged() {
        let mut buf = vec![1, 2, 3, 4];
        line_blend_band(&mut buf, 4, 4);
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }
}
