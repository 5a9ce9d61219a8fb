use crate::foundation::core::{PixelFormat, Rational};
use crate::foundation::error::{FrameError, FrameResult};
use crate::frame::packet::Frame;

/// Stream-level metadata a decoder reports alongside frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub aspect_ratio: Rational,
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self {
            time_base: Rational::new(1, 25),
            frame_rate: Rational::new(25, 1),
            aspect_ratio: Rational::SQUARE,
        }
    }
}

/// Geometry of one plane as every backend sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneGeometry {
    pub index: usize,
    /// Row pitch in bytes.
    pub stride: usize,
    /// Columns touched by line-blend: `min(frame width, stride)`.
    pub width: usize,
    /// Effective row count (`height >> log2_chroma_h` for chroma planes).
    pub height: usize,
}

impl PlaneGeometry {
    /// Bytes the plane buffer must hold at minimum.
    pub fn byte_len(&self) -> usize {
        self.stride * self.height
    }

    /// GPU cache key: `(stride, height)`.
    pub fn key(&self) -> (u32, u32) {
        (self.stride as u32, self.height as u32)
    }
}

/// Immutable description of the stream, built once from the first decoded frame.
///
/// Shared read-only by every node for the whole run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Row pitch of each plane, in plane order.
    pub strides: Vec<usize>,
    pub plane_count: usize,
    pub log2_chroma_w: u32,
    pub log2_chroma_h: u32,
    pub aspect_ratio: Rational,
    pub time_base: Rational,
    pub frame_rate: Rational,
}

impl Context {
    pub fn from_frame(frame: &Frame, info: &StreamInfo) -> Self {
        let desc = frame.format().descriptor();
        Self {
            width: frame.width(),
            height: frame.height(),
            pixel_format: frame.format(),
            strides: frame.strides(),
            plane_count: desc.plane_count(),
            log2_chroma_w: desc.log2_chroma_w,
            log2_chroma_h: desc.log2_chroma_h,
            aspect_ratio: info.aspect_ratio,
            time_base: info.time_base,
            frame_rate: info.frame_rate,
        }
    }

    /// Geometry of plane `index`, or `None` past the last plane.
    pub fn plane_geometry(&self, index: usize) -> Option<PlaneGeometry> {
        if index >= self.plane_count {
            return None;
        }
        let stride = *self.strides.get(index)?;
        let height = if index > 0 {
            (self.height >> self.log2_chroma_h) as usize
        } else {
            self.height as usize
        };
        Some(PlaneGeometry {
            index,
            stride,
            width: (self.width as usize).min(stride),
            height,
        })
    }

    pub fn plane_geometries(&self) -> Vec<PlaneGeometry> {
        (0..self.plane_count)
            .filter_map(|p| self.plane_geometry(p))
            .collect()
    }

    /// Check that `frame` is non-empty, has positive dimensions, and matches this context.
    pub fn validate_frame(&self, frame: &Frame) -> FrameResult<()> {
        match frame.plane(0) {
            Some(p) if !p.is_empty() => {}
            _ => return Err(FrameError::invalid_frame("plane 0 has no data")),
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FrameError::InvalidDimensions {
                width: frame.width(),
                height: frame.height(),
            });
        }
        if frame.width() != self.width
            || frame.height() != self.height
            || frame.format() != self.pixel_format
        {
            return Err(FrameError::invalid_frame(format!(
                "frame {}x{} {} does not match stream {}x{} {}",
                frame.width(),
                frame.height(),
                frame.format(),
                self.width,
                self.height,
                self.pixel_format
            )));
        }
        for geom in self.plane_geometries() {
            let plane = frame.plane(geom.index).ok_or_else(|| {
                FrameError::invalid_frame(format!("plane {} is missing", geom.index))
            })?;
            if plane.stride() != geom.stride {
                return Err(FrameError::invalid_frame(format!(
                    "plane {} stride {} differs from stream stride {}",
                    geom.index,
                    plane.stride(),
                    geom.stride
                )));
            }
            if plane.data().len() < geom.byte_len() {
                return Err(FrameError::invalid_frame(format!(
                    "plane {} holds {} bytes, expected at least {}",
                    geom.index,
                    plane.data().len(),
                    geom.byte_len()
                )));
            }
        }
        Ok(())
    }
}
