//! Scalar ground truth for both kernels plus the row-band partitioning the parallel backends
//! share.

pub mod bands;
pub mod blur;
pub mod line_blend;

use crate::frame::context::PlaneGeometry;

/// Which filter a processor applies.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Kernel {
    /// Replace every odd row by the average of itself and the row above.
    #[default]
    LineBlend,
    /// 3x3 weighted blur of interior pixels.
    Blur,
}

impl Kernel {
    pub fn name(self) -> &'static str {
        match self {
            Kernel::LineBlend => "line-blend",
            Kernel::Blur => "blur",
        }
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply `kernel` to one plane with the scalar reference loops.
pub fn apply_plane(kernel: Kernel, data: &mut [u8], geom: &PlaneGeometry, scratch: &mut Vec<u8>) {
    let data = &mut data[..geom.byte_len()];
    match kernel {
        Kernel::LineBlend => line_blend::line_blend_band(data, geom.stride, geom.width),
        Kernel::Blur => blur::blur_plane(data, geom.stride, geom.height, scratch),
    }
}
