//! Vectorized single-threaded backend: 32-byte lanes for the bulk of each row, scalar loops for
//! the tail and the columns next to the row ends.

#[cfg(target_arch = "x86_64")]
mod avx2;
mod lanes;

use crate::{
    backend::{BackendKind, Prepared, Processor, init_once, require_init},
    foundation::error::FrameResult,
    frame::{
        context::{Context, PlaneGeometry},
        packet::Packet,
    },
    stencil::{
        Kernel,
        blur::{blur_px, copy_back_rows, has_interior, interior_rows},
        line_blend,
    },
};

/// Bytes per vector lane.
pub const LANE: usize = 32;

/// Instruction set the lane kernels run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimdLevel {
    /// Array-based lanes, any target.
    Portable,
    /// x86_64 AVX2 intrinsics.
    Avx2,
}

impl SimdLevel {
    /// Best level supported by the running CPU.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        if std::arch::is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
        SimdLevel::Portable
    }
}

/// Blend `cur` with `prev` over their common length.
fn blend_row(level: SimdLevel, prev: &[u8], cur: &mut [u8]) {
    let n = prev.len().min(cur.len());
    let (prev, cur) = (&prev[..n], &mut cur[..n]);
    let done = match level {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: `Avx2` is only produced by `detect` after a successful runtime check.
        SimdLevel::Avx2 => unsafe { avx2::blend_row(prev, cur) },
        _ => lanes::blend_row(prev, cur),
    };
    line_blend::blend_row(&prev[done..], &mut cur[done..]);
}

/// Blur the interior columns of one row into `out`.
fn blur_row(level: SimdLevel, above: &[u8], row: &[u8], below: &[u8], out: &mut [u8]) {
    let stride = row.len();
    let next = match level {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: runtime-detected AVX2; all slices are one row long.
        SimdLevel::Avx2 => unsafe { avx2::blur_row(above, row, below, out) },
        _ => lanes::blur_row(above, row, below, out),
    };
    for x in next..stride - 1 {
        out[x] = blur_px(above, row, below, x);
    }
}

pub struct SimdProcessor {
    kernel: Kernel,
    level: SimdLevel,
    prepared: Option<Prepared>,
    scratch: Vec<u8>,
}

impl SimdProcessor {
    pub fn new(kernel: Kernel) -> Self {
        let level = SimdLevel::detect();
        tracing::debug!(?level, "simd level selected");
        Self::with_level(kernel, level)
    }

    /// Force the portable lane path regardless of CPU support.
    pub fn portable(kernel: Kernel) -> Self {
        Self::with_level(kernel, SimdLevel::Portable)
    }

    fn with_level(kernel: Kernel, level: SimdLevel) -> Self {
        Self {
            kernel,
            level,
            prepared: None,
            scratch: Vec::new(),
        }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    fn line_blend_plane(&self, data: &mut [u8], geom: &PlaneGeometry) {
        if geom.stride == 0 {
            return;
        }
        for pair in data.chunks_exact_mut(2 * geom.stride) {
            let (even, odd) = pair.split_at_mut(geom.stride);
            blend_row(self.level, &even[..geom.width], &mut odd[..geom.width]);
        }
    }

    fn blur_plane(&mut self, data: &mut [u8], geom: &PlaneGeometry) {
        let (stride, height) = (geom.stride, geom.height);
        if !has_interior(stride, height) {
            return;
        }
        let rows = interior_rows(height);
        self.scratch.resize(rows.len() * stride, 0);
        for (y, out) in rows.clone().zip(self.scratch.chunks_exact_mut(stride)) {
            let above = &data[(y - 1) * stride..y * stride];
            let row = &data[y * stride..(y + 1) * stride];
            let below = &data[(y + 1) * stride..(y + 2) * stride];
            blur_row(self.level, above, row, below, out);
        }
        copy_back_rows(
            &mut data[rows.start * stride..rows.end * stride],
            &self.scratch,
            stride,
        );
    }
}

impl Processor for SimdProcessor {
    fn kind(&self) -> BackendKind {
        BackendKind::Simd
    }

    fn init(&mut self, ctx: &Context) -> FrameResult<()> {
        init_once(&mut self.prepared, ctx)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kernel = %self.kernel, level = ?self.level))]
    fn process(&mut self, mut packet: Packet) -> FrameResult<Packet> {
        let geoms = require_init(&self.prepared)?.check(&packet)?;
        for (plane, geom) in packet.frame_mut().planes_mut().iter_mut().zip(&geoms) {
            let data = &mut plane.data_mut()[..geom.byte_len()];
            match self.kernel {
                Kernel::LineBlend => self.line_blend_plane(data, geom),
                Kernel::Blur => self.blur_plane(data, geom),
            }
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, seed: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 37 + seed * 11) % 256) as u8).collect()
    }

    fn levels() -> Vec<SimdLevel> {
        let mut out = vec![SimdLevel::Portable];
        if SimdLevel::detect() != SimdLevel::Portable {
            out.push(SimdLevel::detect());
        }
        out
    }

    #[test]
    fn blend_row_matches_scalar_across_lane_boundaries() {
        for level in levels() {
            for len in [0, 1, 31, 32, 33, 64, 95] {
                let prev = ramp(len, 1);
                let mut cur = ramp(len, 2);
                let mut expected = cur.clone();
                line_blend::blend_row(&prev, &mut expected);
                blend_row(level, &prev, &mut cur);
                assert_eq!(cur, expected, "{level:?} len={len}");
            }
        }
    }

    #[test]
    fn blur_row_matches_scalar_across_lane_boundaries() {
        for level in levels() {
            for stride in [3, 4, 33, 34, 35, 66, 100] {
                let (a, m, b) = (ramp(stride, 3), ramp(stride, 4), ramp(stride, 5));
                let mut out = vec![0u8; stride];
                blur_row(level, &a, &m, &b, &mut out);
                for x in 1..stride - 1 {
                    assert_eq!(out[x], blur_px(&a, &m, &b, x), "{level:?} stride={stride} x={x}");
                }
            }
        }
    }
}
