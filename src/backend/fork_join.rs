use anyhow::Context as _;

use crate::{
    backend::{BackendKind, Prepared, Processor, ProcessorOpts, init_once, require_init},
    foundation::error::FrameResult,
    frame::{
        context::{Context, PlaneGeometry},
        packet::Packet,
    },
    stencil::{
        Kernel,
        bands::{pair_bands, row_bands, split_rows_mut},
        blur::{blur_rows_into, copy_back_rows, has_interior, interior_rows},
        line_blend::line_blend_band,
    },
};

/// Two nested fork-join levels: one task per plane, then one task per row band inside each plane.
///
/// Every level spawns all of its tasks and joins them before the enclosing level continues. Blur
/// runs two band phases per plane (compute into scratch, then copy back) with a join between.
pub struct ForkJoinProcessor {
    kernel: Kernel,
    bands: usize,
    pool: rayon::ThreadPool,
    prepared: Option<Prepared>,
    scratch: Vec<Vec<u8>>,
}

impl ForkJoinProcessor {
    pub fn new(opts: &ProcessorOpts) -> FrameResult<Self> {
        let bands = opts.resolved_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(bands)
            .thread_name(|i| format!("frameblend-fj-{i}"))
            .build()
            .context("failed to build fork-join thread pool")?;
        Ok(Self {
            kernel: opts.kernel,
            bands,
            pool,
            prepared: None,
            scratch: Vec::new(),
        })
    }
}

impl Processor for ForkJoinProcessor {
    fn kind(&self) -> BackendKind {
        BackendKind::ForkJoin
    }

    fn init(&mut self, ctx: &Context) -> FrameResult<()> {
        init_once(&mut self.prepared, ctx)?;
        let planes = require_init(&self.prepared)?.planes().len();
        self.scratch = vec![Vec::new(); planes];
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kernel = %self.kernel, bands = self.bands))]
    fn process(&mut self, mut packet: Packet) -> FrameResult<Packet> {
        let geoms = require_init(&self.prepared)?.check(&packet)?;
        let (kernel, bands) = (self.kernel, self.bands);
        let planes = packet.frame_mut().planes_mut();
        let scratch = &mut self.scratch;

        self.pool.scope(|s| {
            for ((plane, geom), scratch) in planes.iter_mut().zip(&geoms).zip(scratch.iter_mut()) {
                s.spawn(move |_| {
                    let data = &mut plane.data_mut()[..geom.byte_len()];
                    match kernel {
                        Kernel::LineBlend => line_blend_plane(data, geom, bands),
                        Kernel::Blur => blur_plane(data, geom, bands, scratch),
                    }
                });
            }
        });
        Ok(packet)
    }
}

fn line_blend_plane(data: &mut [u8], geom: &PlaneGeometry, bands: usize) {
    let (stride, width) = (geom.stride, geom.width);
    let ranges = pair_bands(geom.height, bands);
    let slices = split_rows_mut(data, stride, &ranges);
    rayon::scope(|s| {
        for rows in slices {
            s.spawn(move |_| line_blend_band(rows, stride, width));
        }
    });
}

fn blur_plane(data: &mut [u8], geom: &PlaneGeometry, bands: usize, scratch: &mut Vec<u8>) {
    let (stride, height) = (geom.stride, geom.height);
    if !has_interior(stride, height) {
        return;
    }
    let interior = interior_rows(height);
    scratch.resize(interior.len() * stride, 0);
    let ranges = row_bands(interior.clone(), bands);
    // Scratch row 0 holds plane row 1.
    let local: Vec<_> = ranges.iter().map(|r| r.start - 1..r.end - 1).collect();

    {
        let src: &[u8] = data;
        let outs = split_rows_mut(scratch, stride, &local);
        rayon::scope(|s| {
            for (rows, out) in ranges.iter().cloned().zip(outs) {
                s.spawn(move |_| blur_rows_into(src, stride, rows, out));
            }
        });
    }

    let tmp: &[u8] = scratch;
    let dsts = split_rows_mut(data, stride, &ranges);
    rayon::scope(|s| {
        for (dst, rows) in dsts.into_iter().zip(&local) {
            let src = &tmp[rows.start * stride..rows.end * stride];
            s.spawn(move |_| copy_back_rows(dst, src, stride));
        }
    });
}
