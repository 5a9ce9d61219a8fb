use std::path::{Path, PathBuf};

use crate::{
    codec::{DecodedFrame, FrameSink, FrameSource, ensure_parent_dir, extension, padded_plane},
    foundation::{
        core::PixelFormat,
        error::{FrameError, FrameResult},
    },
    frame::{
        context::{Context, StreamInfo},
        packet::Frame,
    },
};

/// Map a still-image path to its `image` format.
pub fn image_format_for(path: &Path) -> FrameResult<image::ImageFormat> {
    let ext = extension(path).unwrap_or_default();
    let format = match ext.as_str() {
        "png" => image::ImageFormat::Png,
        "jpg" | "jpeg" => image::ImageFormat::Jpeg,
        "bmp" => image::ImageFormat::Bmp,
        "tif" | "tiff" => image::ImageFormat::Tiff,
        "webp" => image::ImageFormat::WebP,
        "pgm" | "ppm" | "pnm" => image::ImageFormat::Pnm,
        "tga" => image::ImageFormat::Tga,
        _ => {
            return Err(FrameError::validation(format!(
                "unsupported image extension '{ext}' for '{}'",
                path.display()
            )));
        }
    };
    Ok(format)
}

/// Single-frame source reading a still image.
///
/// Grayscale images decode to `gray`; anything with colour decodes to planar `gbrp`. Alpha is
/// dropped.
pub struct ImageFileSource {
    path: PathBuf,
    row_align: usize,
    done: bool,
}

impl ImageFileSource {
    pub fn open(path: &Path, row_align: usize) -> FrameResult<Self> {
        image_format_for(path)?;
        if !path.exists() {
            return Err(FrameError::decoding(format!(
                "input '{}' does not exist",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            row_align: row_align.max(1),
            done: false,
        })
    }

    fn decode(&self) -> FrameResult<Frame> {
        let img = image::open(&self.path).map_err(|e| {
            FrameError::decoding(format!("failed to decode '{}': {e}", self.path.display()))
        })?;
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let w = width as usize;

        if !img.color().has_color() {
            let luma = img.into_luma8();
            let plane = padded_plane(luma.as_raw(), w, self.row_align);
            return Ok(Frame::new(width, height, PixelFormat::Gray, vec![plane]));
        }

        let rgb = img.into_rgb8();
        let px = w * height as usize;
        let (mut g, mut b, mut r) = (
            Vec::with_capacity(px),
            Vec::with_capacity(px),
            Vec::with_capacity(px),
        );
        for p in rgb.pixels() {
            r.push(p.0[0]);
            g.push(p.0[1]);
            b.push(p.0[2]);
        }
        let planes = [g, b, r]
            .iter()
            .map(|data| padded_plane(data, w, self.row_align))
            .collect();
        Ok(Frame::new(width, height, PixelFormat::Gbrp, planes))
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> FrameResult<Option<DecodedFrame>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let frame = self.decode()?;
        tracing::debug!(
            path = %self.path.display(),
            width = frame.width(),
            height = frame.height(),
            format = %frame.format(),
            "decoded image"
        );
        Ok(Some(DecodedFrame {
            frame,
            info: StreamInfo::default(),
        }))
    }
}

/// Writes each frame as a still image.
///
/// The first frame goes to the given path, later ones to `{stem}_{index:05}.{ext}` beside it.
/// Frames are held until `end`, so an aborted run writes nothing.
pub struct ImageFileSink {
    path: PathBuf,
    format: image::ImageFormat,
    overwrite: bool,
    pending: Vec<Frame>,
}

impl ImageFileSink {
    pub fn new(path: &Path, overwrite: bool) -> FrameResult<Self> {
        let format = image_format_for(path)?;
        super::refuse_existing(path, overwrite)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            overwrite,
            pending: Vec::new(),
        })
    }

    /// Output path of frame `index`.
    pub fn frame_path(&self, index: usize) -> PathBuf {
        if index == 0 {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame");
        let ext = extension(&self.path).unwrap_or_default();
        self.path.with_file_name(format!("{stem}_{index:05}.{ext}"))
    }

    fn save(&self, index: usize, frame: &Frame) -> FrameResult<()> {
        let path = self.frame_path(index);
        if index > 0 {
            super::refuse_existing(&path, self.overwrite)?;
        }
        let (color, data) = to_interleaved(frame)?;
        image::save_buffer_with_format(
            &path,
            &data,
            frame.width(),
            frame.height(),
            color,
            self.format,
        )
        .map_err(|e| FrameError::encoding(format!("failed to write '{}': {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "wrote image");
        Ok(())
    }
}

impl FrameSink for ImageFileSink {
    fn begin(&mut self, _ctx: &Context) -> FrameResult<()> {
        ensure_parent_dir(&self.path)
    }

    fn write_frame(&mut self, frame: Frame) -> FrameResult<()> {
        self.pending.push(frame);
        Ok(())
    }

    fn end(&mut self) -> FrameResult<()> {
        let frames = std::mem::take(&mut self.pending);
        for (index, frame) in frames.iter().enumerate() {
            self.save(index, frame)?;
        }
        Ok(())
    }
}

/// Convert a frame to tightly packed `L8` or `Rgb8` bytes.
fn to_interleaved(frame: &Frame) -> FrameResult<(image::ColorType, Vec<u8>)> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let plane = |i: usize| {
        frame
            .plane(i)
            .ok_or_else(|| FrameError::invalid_frame(format!("plane {i} is missing")))
    };
    let sample = |i: usize, x: usize, y: usize| -> FrameResult<u8> {
        let p = plane(i)?;
        p.data()
            .get(y * p.stride() + x)
            .copied()
            .ok_or_else(|| FrameError::invalid_frame(format!("plane {i} is too short")))
    };

    let format = frame.format();
    if format == PixelFormat::Gray {
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                out.push(sample(0, x, y)?);
            }
        }
        return Ok((image::ColorType::L8, out));
    }

    let desc = format.descriptor();
    let full_range = matches!(
        format,
        PixelFormat::Yuvj420p | PixelFormat::Yuvj422p | PixelFormat::Yuvj444p
    );
    let mut out = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let rgb = match format {
                PixelFormat::Gbrp => [sample(2, x, y)?, sample(0, x, y)?, sample(1, x, y)?],
                PixelFormat::Rgb24 | PixelFormat::Rgba => {
                    let bpp = desc.bytes_per_pixel;
                    [
                        sample(0, x * bpp, y)?,
                        sample(0, x * bpp + 1, y)?,
                        sample(0, x * bpp + 2, y)?,
                    ]
                }
                _ => {
                    let (cx, cy) = (x >> desc.log2_chroma_w, y >> desc.log2_chroma_h);
                    yuv_to_rgb(
                        sample(0, x, y)?,
                        sample(1, cx, cy)?,
                        sample(2, cx, cy)?,
                        full_range,
                    )
                }
            };
            out.extend_from_slice(&rgb);
        }
    }
    Ok((image::ColorType::Rgb8, out))
}

/// BT.601 YCbCr to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8, full_range: bool) -> [u8; 3] {
    let (y, u, v) = (f32::from(y), f32::from(u) - 128.0, f32::from(v) - 128.0);
    let (y, cscale) = if full_range {
        (y, 1.0)
    } else {
        ((y - 16.0) * 255.0 / 219.0, 255.0 / 224.0)
    };
    let (u, v) = (u * cscale, v * cscale);
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::packet::Plane;

    #[test]
    fn unknown_image_extension_is_validation_error() {
        let err = image_format_for(Path::new("clip.xyz")).unwrap_err();
        assert!(matches!(err, FrameError::Validation(_)));
        assert_eq!(
            image_format_for(Path::new("a.PNG")).unwrap(),
            image::ImageFormat::Png
        );
    }

    #[test]
    fn later_frames_get_numbered_paths() {
        let sink = ImageFileSink::new(Path::new("target/none/out.png"), true).unwrap();
        assert_eq!(sink.frame_path(0), PathBuf::from("target/none/out.png"));
        assert_eq!(sink.frame_path(3), PathBuf::from("target/none/out_00003.png"));
    }

    #[test]
    fn gbrp_interleaves_as_rgb() {
        let frame = Frame::new(
            2,
            1,
            PixelFormat::Gbrp,
            vec![
                Plane::new(vec![1, 2, 0, 0], 4),
                Plane::new(vec![3, 4, 0, 0], 4),
                Plane::new(vec![5, 6, 0, 0], 4),
            ],
        );
        let (color, data) = to_interleaved(&frame).unwrap();
        assert_eq!(color, image::ColorType::Rgb8);
        assert_eq!(data, vec![5, 1, 3, 6, 2, 4]);
    }

    #[test]
    fn neutral_chroma_maps_to_gray() {
        assert_eq!(yuv_to_rgb(128, 128, 128, true), [128, 128, 128]);
        assert_eq!(yuv_to_rgb(16, 128, 128, false), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128, false), [255, 255, 255]);
    }
}
