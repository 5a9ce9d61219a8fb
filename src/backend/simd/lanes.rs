//! Portable 32-byte lane kernels. Plain array code the compiler is free to vectorize.

use super::LANE;

#[inline]
fn avg_lane(a: &[u8; LANE], b: &[u8; LANE]) -> [u8; LANE] {
    std::array::from_fn(|i| ((u16::from(a[i]) + u16::from(b[i])) >> 1) as u8)
}

/// Blend whole lanes of `cur` with `prev`; returns the number of leading bytes written.
pub(super) fn blend_row(prev: &[u8], cur: &mut [u8]) -> usize {
    let (cur_lanes, _) = cur.as_chunks_mut::<LANE>();
    let (prev_lanes, _) = prev.as_chunks::<LANE>();
    let n = cur_lanes.len().min(prev_lanes.len());
    for (c, p) in cur_lanes.iter_mut().zip(prev_lanes) {
        *c = avg_lane(c, p);
    }
    n * LANE
}

#[inline]
fn taps(r: &[u8], x: usize) -> [u16; LANE] {
    std::array::from_fn(|i| {
        u16::from(r[x + i - 1]) + 2 * u16::from(r[x + i]) + u16::from(r[x + i + 1])
    })
}

/// Blur lanes starting at column 1 while a lane and its right neighbour column fit inside the
/// interior; returns the first column left for the scalar tail.
pub(super) fn blur_row(above: &[u8], row: &[u8], below: &[u8], out: &mut [u8]) -> usize {
    let end = row.len() - 1;
    let mut x = 1;
    while x + LANE <= end {
        let (a, m, b) = (taps(above, x), taps(row, x), taps(below, x));
        for i in 0..LANE {
            out[x + i] = ((a[i] + 2 * m[i] + b[i] + 8) >> 4) as u8;
        }
        x += LANE;
    }
    x
}
