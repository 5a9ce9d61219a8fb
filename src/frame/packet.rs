use std::sync::Arc;

use crate::foundation::core::PixelFormat;
use crate::frame::context::Context;

/// One plane's bytes plus its row pitch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }

    /// A zeroed plane of `rows` rows.
    pub fn zeroed(stride: usize, rows: usize) -> Self {
        Self::new(vec![0u8; stride * rows], stride)
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of complete rows held by the buffer.
    pub fn rows(&self) -> usize {
        if self.stride == 0 {
            return 0;
        }
        self.data.len() / self.stride
    }

    /// Row `y`, `stride` bytes long (padding included).
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.stride..(y + 1) * self.stride]
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// A decoded raster frame: geometry plus one buffer per plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
        }
    }

    /// Allocate a zeroed, tightly packed frame.
    pub fn alloc(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::alloc_aligned(width, height, format, 1)
    }

    /// Allocate a zeroed frame whose strides are rounded up to a multiple of `align`.
    ///
    /// Decoders commonly pad rows to 32 or 64 bytes; this reproduces that layout.
    pub fn alloc_aligned(width: u32, height: u32, format: PixelFormat, align: usize) -> Self {
        let align = align.max(1);
        let planes = format
            .plane_sizes(width, height)
            .into_iter()
            .map(|(row_bytes, rows)| Plane::zeroed(row_bytes.next_multiple_of(align), rows))
            .collect();
        Self::new(width, height, format, planes)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut Plane> {
        self.planes.get_mut(index)
    }

    pub fn strides(&self) -> Vec<usize> {
        self.planes.iter().map(Plane::stride).collect()
    }
}

/// The unit of work moving through a pipeline: one owned frame and the run's shared context.
///
/// Nodes take packets by value and hand them on by value, so exactly one node owns a packet at
/// any time.
#[derive(Debug)]
pub struct Packet {
    frame: Frame,
    context: Arc<Context>,
}

impl Packet {
    pub fn new(frame: Frame, context: Arc<Context>) -> Self {
        Self { frame, context }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn into_parts(self) -> (Frame, Arc<Context>) {
        (self.frame, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_alloc_pads_every_plane() {
        let f = Frame::alloc_aligned(10, 4, PixelFormat::Yuv420p, 16);
        assert_eq!(f.strides(), vec![16, 16, 16]);
        assert_eq!(f.planes()[0].rows(), 4);
        assert_eq!(f.planes()[1].rows(), 2);
    }

    #[test]
    fn row_spans_full_stride() {
        let p = Plane::new((0u8..12).collect(), 4);
        assert_eq!(p.rows(), 3);
        assert_eq!(p.row(1), &[4, 5, 6, 7]);
    }

    #[test]
    fn zero_stride_plane_has_no_rows() {
        assert_eq!(Plane::new(vec![1, 2, 3], 0).rows(), 0);
    }
}
