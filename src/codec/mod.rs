//! Decode/encode collaborators feeding and draining the pipeline.

pub mod ffmpeg;
pub mod image_io;
pub mod memory;

use std::path::Path;

use crate::{
    foundation::{
        core::PixelFormat,
        error::{FrameError, FrameResult},
    },
    frame::{
        context::{Context, StreamInfo},
        packet::{Frame, Plane},
    },
};

pub use ffmpeg::{FfmpegSink, FfmpegSource};
pub use image_io::{ImageFileSink, ImageFileSource};
pub use memory::{InMemoryOutput, InMemorySink, InMemorySource};

/// One frame as produced by a decoder, with the stream metadata that accompanies it.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub info: StreamInfo,
}

/// Produces decoded frames until the stream ends (`Ok(None)`).
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> FrameResult<Option<DecodedFrame>>;
}

/// Consumes processed frames.
///
/// `begin` is called once with the stream context before the first frame, `end` once after the
/// last one. A sink dropped without `end` must not leave finished-looking output behind.
pub trait FrameSink: Send {
    fn begin(&mut self, ctx: &Context) -> FrameResult<()>;
    fn write_frame(&mut self, frame: Frame) -> FrameResult<()>;
    fn end(&mut self) -> FrameResult<()>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> FrameResult<Option<DecodedFrame>> {
        (**self).next_frame()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn begin(&mut self, ctx: &Context) -> FrameResult<()> {
        (**self).begin(ctx)
    }

    fn write_frame(&mut self, frame: Frame) -> FrameResult<()> {
        (**self).write_frame(frame)
    }

    fn end(&mut self) -> FrameResult<()> {
        (**self).end()
    }
}

/// File extensions handled by the `image` crate; everything else goes through ffmpeg.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "pgm", "ppm", "pnm", "tga",
];

/// Which collaborator reads or writes a path.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CodecEngine {
    /// Still images via the `image` crate.
    Image,
    /// Any container ffmpeg understands, as rawvideo over pipes.
    Ffmpeg,
}

impl CodecEngine {
    /// Pick the engine from the file extension (case-insensitive).
    pub fn for_path(path: &Path) -> Self {
        match extension(path) {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => CodecEngine::Image,
            _ => CodecEngine::Ffmpeg,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecEngine::Image => "image",
            CodecEngine::Ffmpeg => "ffmpeg",
        }
    }

    /// Open a decoder for `path`. Row strides are rounded up to a multiple of `row_align`.
    pub fn open_source(self, path: &Path, row_align: usize) -> FrameResult<Box<dyn FrameSource>> {
        tracing::debug!(engine = self.name(), path = %path.display(), "opening source");
        Ok(match self {
            CodecEngine::Image => Box::new(ImageFileSource::open(path, row_align)?),
            CodecEngine::Ffmpeg => Box::new(FfmpegSource::open(path, row_align)?),
        })
    }

    pub fn open_sink(self, path: &Path, overwrite: bool) -> FrameResult<Box<dyn FrameSink>> {
        tracing::debug!(engine = self.name(), path = %path.display(), "opening sink");
        Ok(match self {
            CodecEngine::Image => Box::new(ImageFileSink::new(path, overwrite)?),
            CodecEngine::Ffmpeg => Box::new(FfmpegSink::new(path, overwrite)?),
        })
    }
}

impl std::fmt::Display for CodecEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> FrameResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

pub(crate) fn refuse_existing(path: &Path, overwrite: bool) -> FrameResult<()> {
    if !overwrite && path.exists() {
        return Err(FrameError::validation(format!(
            "output file '{}' already exists",
            path.display()
        )));
    }
    Ok(())
}

/// Bytes of one tightly packed frame, all planes back to back.
pub fn packed_len(format: PixelFormat, width: u32, height: u32) -> usize {
    format
        .plane_sizes(width, height)
        .iter()
        .map(|(w, h)| w * h)
        .sum()
}

/// Copy the visible bytes of every plane into `out`, dropping row padding.
pub fn pack_planes(frame: &Frame, out: &mut Vec<u8>) -> FrameResult<()> {
    out.clear();
    let sizes = frame.format().plane_sizes(frame.width(), frame.height());
    for (index, (row_bytes, rows)) in sizes.into_iter().enumerate() {
        let plane = frame
            .plane(index)
            .ok_or_else(|| FrameError::invalid_frame(format!("plane {index} is missing")))?;
        if plane.stride() < row_bytes || plane.rows() < rows {
            return Err(FrameError::invalid_frame(format!(
                "plane {index} is smaller than {row_bytes}x{rows}"
            )));
        }
        for y in 0..rows {
            out.extend_from_slice(&plane.row(y)[..row_bytes]);
        }
    }
    Ok(())
}

/// Build a frame from tightly packed plane bytes, padding each row to a multiple of `row_align`.
pub fn unpack_planes(
    bytes: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    row_align: usize,
) -> FrameResult<Frame> {
    let expected = packed_len(format, width, height);
    if bytes.len() != expected {
        return Err(FrameError::decoding(format!(
            "raw frame holds {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    let mut frame = Frame::alloc_aligned(width, height, format, row_align);
    let mut offset = 0;
    let sizes = format.plane_sizes(width, height);
    for (plane, (row_bytes, rows)) in frame.planes_mut().iter_mut().zip(sizes) {
        let stride = plane.stride();
        for (y, dst) in plane.data_mut().chunks_exact_mut(stride).take(rows).enumerate() {
            let src = &bytes[offset + y * row_bytes..offset + (y + 1) * row_bytes];
            dst[..row_bytes].copy_from_slice(src);
        }
        offset += row_bytes * rows;
    }
    Ok(frame)
}

/// Wrap tightly packed rows (`row_bytes` per row) into a plane with a padded stride.
pub(crate) fn padded_plane(rows: &[u8], row_bytes: usize, row_align: usize) -> Plane {
    let stride = row_bytes.next_multiple_of(row_align.max(1));
    if stride == row_bytes {
        return Plane::new(rows.to_vec(), stride);
    }
    let mut plane = Plane::zeroed(stride, rows.len() / row_bytes.max(1));
    for (dst, src) in plane
        .data_mut()
        .chunks_exact_mut(stride)
        .zip(rows.chunks_exact(row_bytes))
    {
        dst[..row_bytes].copy_from_slice(src);
    }
    plane
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn engine_follows_extension() {
        for name in ["a.png", "b.JPG", "c.jpeg", "d.tiff", "e.pgm", "f.tga"] {
            assert_eq!(CodecEngine::for_path(&PathBuf::from(name)), CodecEngine::Image, "{name}");
        }
        for name in ["a.mp4", "b.mkv", "c", "d.y4m"] {
            assert_eq!(CodecEngine::for_path(&PathBuf::from(name)), CodecEngine::Ffmpeg, "{name}");
        }
    }

    #[test]
    fn unpack_pads_rows_and_pack_strips_them() {
        // 3x3 yuv420p: luma 3x3, chroma 2x2 each.
        let bytes: Vec<u8> = (0..17).collect();
        let frame = unpack_planes(&bytes, 3, 3, PixelFormat::Yuv420p, 8).unwrap();
        assert_eq!(frame.strides(), vec![8, 8, 8]);
        assert_eq!(&frame.planes()[0].row(1)[..3], &[3, 4, 5]);
        assert_eq!(&frame.planes()[2].row(1)[..2], &[15, 16]);

        let mut out = Vec::new();
        pack_planes(&frame, &mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn unpack_rejects_short_input() {
        let err = unpack_planes(&[0; 5], 2, 3, PixelFormat::Gray, 1).unwrap_err();
        assert!(matches!(err, FrameError::Decoding(_)));
    }

    #[test]
    fn padded_plane_keeps_tight_rows_when_aligned() {
        let p = padded_plane(&[1, 2, 3, 4], 2, 1);
        assert_eq!(p.stride(), 2);
        let p = padded_plane(&[1, 2, 3, 4], 2, 4);
        assert_eq!(p.data(), &[1, 2, 0, 0, 3, 4, 0, 0]);
    }
}
