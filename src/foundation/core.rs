use crate::foundation::error::{FrameError, FrameResult};

/// A rational number `num/den`, used for time bases, frame rates and aspect ratios.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rational {
    /// Numerator.
    pub num: i32,
    /// Denominator; zero marks an unknown value.
    pub den: i32,
}

impl Rational {
    /// Unknown/unspecified value (`0/1`), mirroring how containers report missing metadata.
    pub const UNKNOWN: Rational = Rational { num: 0, den: 1 };

    /// Square pixels.
    pub const SQUARE: Rational = Rational { num: 1, den: 1 };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Return `true` when both terms are positive.
    pub fn is_known(self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Parse `"num/den"` (ffprobe style) or a plain integer.
    ///
    /// `"0/0"` parses to [`Rational::UNKNOWN`].
    pub fn parse(s: &str) -> FrameResult<Self> {
        let s = s.trim();
        let parse_term = |t: &str| {
            t.trim()
                .parse::<i32>()
                .map_err(|e| FrameError::validation(format!("invalid rational '{s}': {e}")))
        };
        let r = match s.split_once(['/', ':']) {
            Some((n, d)) => Rational::new(parse_term(n)?, parse_term(d)?),
            None => Rational::new(parse_term(s)?, 1),
        };
        if r.den == 0 {
            return Ok(Rational::UNKNOWN);
        }
        Ok(r)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 8-bit pixel formats understood by the decode/encode collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray,
    Yuv420p,
    Yuvj420p,
    Yuv422p,
    Yuvj422p,
    Yuv440p,
    Yuv444p,
    Yuvj444p,
    /// Planar RGB, planes ordered G, B, R.
    Gbrp,
    /// Packed RGB, one plane.
    Rgb24,
    /// Packed RGBA, one plane.
    Rgba,
}

/// Static layout facts for a [`PixelFormat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// Number of colour components.
    pub components: usize,
    /// Whether every component lives in its own plane.
    pub planar: bool,
    /// Horizontal chroma subsampling, log2.
    pub log2_chroma_w: u32,
    /// Vertical chroma subsampling, log2.
    pub log2_chroma_h: u32,
    /// Bytes per pixel in plane 0 (1 for planar formats).
    pub bytes_per_pixel: usize,
}

impl PixelFormatDescriptor {
    /// Number of buffers a frame of this format carries.
    pub fn plane_count(&self) -> usize {
        if self.planar { self.components } else { 1 }
    }
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 11] = [
        PixelFormat::Gray,
        PixelFormat::Yuv420p,
        PixelFormat::Yuvj420p,
        PixelFormat::Yuv422p,
        PixelFormat::Yuvj422p,
        PixelFormat::Yuv440p,
        PixelFormat::Yuv444p,
        PixelFormat::Yuvj444p,
        PixelFormat::Gbrp,
        PixelFormat::Rgb24,
        PixelFormat::Rgba,
    ];

    pub fn descriptor(self) -> PixelFormatDescriptor {
        let planar = |log2_chroma_w, log2_chroma_h| PixelFormatDescriptor {
            components: 3,
            planar: true,
            log2_chroma_w,
            log2_chroma_h,
            bytes_per_pixel: 1,
        };
        match self {
            PixelFormat::Gray => PixelFormatDescriptor {
                components: 1,
                planar: false,
                log2_chroma_w: 0,
                log2_chroma_h: 0,
                bytes_per_pixel: 1,
            },
            PixelFormat::Yuv420p | PixelFormat::Yuvj420p => planar(1, 1),
            PixelFormat::Yuv422p | PixelFormat::Yuvj422p => planar(1, 0),
            PixelFormat::Yuv440p => planar(0, 1),
            PixelFormat::Yuv444p | PixelFormat::Yuvj444p | PixelFormat::Gbrp => planar(0, 0),
            PixelFormat::Rgb24 => PixelFormatDescriptor {
                components: 3,
                planar: false,
                log2_chroma_w: 0,
                log2_chroma_h: 0,
                bytes_per_pixel: 3,
            },
            PixelFormat::Rgba => PixelFormatDescriptor {
                components: 4,
                planar: false,
                log2_chroma_w: 0,
                log2_chroma_h: 0,
                bytes_per_pixel: 4,
            },
        }
    }

    /// The `ffmpeg -pix_fmt` name.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Gray => "gray",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuvj420p => "yuvj420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuvj422p => "yuvj422p",
            PixelFormat::Yuv440p => "yuv440p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Yuvj444p => "yuvj444p",
            PixelFormat::Gbrp => "gbrp",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
        }
    }

    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.ffmpeg_name() == name)
    }

    /// Tightly packed `(width_bytes, rows)` of every plane for a `width`x`height` frame.
    ///
    /// Chroma planes round up, matching how ffmpeg lays out odd-sized frames.
    pub fn plane_sizes(self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let desc = self.descriptor();
        let (w, h) = (width as usize, height as usize);
        (0..desc.plane_count())
            .map(|p| {
                if p == 0 || !desc.planar {
                    (w * desc.bytes_per_pixel, h)
                } else {
                    (
                        w.div_ceil(1 << desc.log2_chroma_w),
                        h.div_ceil(1 << desc.log2_chroma_h),
                    )
                }
            })
            .collect()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_parses_ffprobe_forms() {
        assert_eq!(Rational::parse("30000/1001").unwrap(), Rational::new(30000, 1001));
        assert_eq!(Rational::parse("25").unwrap(), Rational::new(25, 1));
        assert_eq!(Rational::parse("1:1").unwrap(), Rational::SQUARE);
        assert_eq!(Rational::parse("0/0").unwrap(), Rational::UNKNOWN);
        assert!(Rational::parse("abc").is_err());
    }

    #[test]
    fn planar_formats_report_component_planes() {
        let d = PixelFormat::Yuv420p.descriptor();
        assert_eq!(d.plane_count(), 3);
        assert_eq!(d.log2_chroma_h, 1);
        assert_eq!(PixelFormat::Gray.descriptor().plane_count(), 1);
        assert_eq!(PixelFormat::Rgb24.descriptor().plane_count(), 1);
        assert_eq!(PixelFormat::Gbrp.descriptor().plane_count(), 3);
    }

    #[test]
    fn plane_sizes_round_chroma_up() {
        let sizes = PixelFormat::Yuv420p.plane_sizes(5, 3);
        assert_eq!(sizes, vec![(5, 3), (3, 2), (3, 2)]);
        assert_eq!(PixelFormat::Rgb24.plane_sizes(4, 2), vec![(12, 2)]);
    }

    #[test]
    fn ffmpeg_names_round_trip() {
        for f in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_ffmpeg_name(f.ffmpeg_name()), Some(f));
        }
        assert_eq!(PixelFormat::from_ffmpeg_name("nv12"), None);
    }
}
