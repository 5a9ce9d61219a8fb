use crate::{
    backend::{BackendKind, Prepared, Processor, ProcessorOpts, init_once, require_init},
    foundation::error::FrameResult,
    frame::{
        context::{Context, PlaneGeometry},
        packet::{Packet, Plane},
    },
    pool::ThreadPool,
    stencil::{
        Kernel,
        bands::{pair_bands, row_bands, split_rows_mut},
        blur::{blur_rows_into, copy_back_rows, has_interior, interior_rows},
        line_blend::line_blend_band,
    },
};

/// Row bands of every plane fanned out to a persistent [`ThreadPool`] owned by the processor.
///
/// Blur uses two pool batches per frame separated by a full quiescence barrier.
pub struct ThreadPoolProcessor {
    kernel: Kernel,
    bands: usize,
    pool: ThreadPool,
    prepared: Option<Prepared>,
    scratch: Vec<Vec<u8>>,
}

impl ThreadPoolProcessor {
    pub fn new(opts: &ProcessorOpts) -> FrameResult<Self> {
        let bands = opts.resolved_threads();
        Ok(Self {
            kernel: opts.kernel,
            bands,
            pool: ThreadPool::new(bands)?,
            prepared: None,
            scratch: Vec::new(),
        })
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    fn line_blend(&mut self, packet: &mut Packet, geoms: &[PlaneGeometry]) -> FrameResult<()> {
        let bands = self.bands;
        let planes = packet.frame_mut().planes_mut();
        self.pool.scope(|s| -> FrameResult<()> {
            for (plane, geom) in planes.iter_mut().zip(geoms) {
                let (stride, width) = (geom.stride, geom.width);
                let data = &mut plane.data_mut()[..geom.byte_len()];
                let ranges = pair_bands(geom.height, bands);
                for rows in split_rows_mut(data, stride, &ranges) {
                    s.spawn(move || {
                        line_blend_band(rows, stride, width);
                        Ok(())
                    })?;
                }
            }
            Ok(())
        })?
    }

    fn blur(&mut self, packet: &mut Packet, geoms: &[PlaneGeometry]) -> FrameResult<()> {
        let bands = self.bands;
        let mut jobs = Vec::with_capacity(geoms.len());
        for geom in geoms {
            if !has_interior(geom.stride, geom.height) {
                continue;
            }
            let ranges = row_bands(interior_rows(geom.height), bands);
            let local: Vec<_> = ranges.iter().map(|r| r.start - 1..r.end - 1).collect();
            jobs.push((*geom, ranges, local));
        }
        for (geom, _, _) in &jobs {
            self.scratch[geom.index].resize((geom.height - 2) * geom.stride, 0);
        }

        // Phase 1: every band of every plane reads the untouched frame.
        let planes = packet.frame().planes();
        let mut scratch: Vec<Option<&mut Vec<u8>>> = self.scratch.iter_mut().map(Some).collect();
        self.pool.scope(|s| -> FrameResult<()> {
            for (geom, ranges, local) in &jobs {
                let stride = geom.stride;
                let src = &planes[geom.index].data()[..geom.byte_len()];
                let Some(tmp) = scratch[geom.index].take() else {
                    continue;
                };
                for (rows, out) in ranges.iter().cloned().zip(split_rows_mut(tmp, stride, local)) {
                    s.spawn(move || {
                        blur_rows_into(src, stride, rows, out);
                        Ok(())
                    })?;
                }
            }
            Ok(())
        })??;

        // Phase 2: copy back once every snapshot read has finished.
        let scratch = &self.scratch;
        let mut planes: Vec<Option<&mut Plane>> =
            packet.frame_mut().planes_mut().iter_mut().map(Some).collect();
        self.pool.scope(|s| -> FrameResult<()> {
            for (geom, ranges, local) in &jobs {
                let stride = geom.stride;
                let Some(plane) = planes[geom.index].take() else {
                    continue;
                };
                let data = &mut plane.data_mut()[..geom.byte_len()];
                let tmp = &scratch[geom.index];
                for (dst, rows) in split_rows_mut(data, stride, ranges).into_iter().zip(local) {
                    let src = &tmp[rows.start * stride..rows.end * stride];
                    s.spawn(move || {
                        copy_back_rows(dst, src, stride);
                        Ok(())
                    })?;
                }
            }
            Ok(())
        })?
    }
}

impl Processor for ThreadPoolProcessor {
    fn kind(&self) -> BackendKind {
        BackendKind::ThreadPool
    }

    fn init(&mut self, ctx: &Context) -> FrameResult<()> {
        init_once(&mut self.prepared, ctx)?;
        let planes = require_init(&self.prepared)?.planes().len();
        self.scratch = vec![Vec::new(); planes];
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kernel = %self.kernel, workers = self.pool.size()))]
    fn process(&mut self, mut packet: Packet) -> FrameResult<Packet> {
        let geoms = require_init(&self.prepared)?.check(&packet)?;
        match self.kernel {
            Kernel::LineBlend => self.line_blend(&mut packet, &geoms)?,
            Kernel::Blur => self.blur(&mut packet, &geoms)?,
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        backend::sequential::SequentialProcessor,
        foundation::core::PixelFormat,
        frame::{context::StreamInfo, packet::Frame},
    };

    fn run(proc_: &mut dyn Processor, frame: Frame) -> Frame {
        let ctx = Arc::new(Context::from_frame(&frame, &StreamInfo::default()));
        proc_.init(&ctx).unwrap();
        proc_.process(Packet::new(frame, ctx)).unwrap().into_frame()
    }

    #[test]
    fn pool_is_idle_after_each_frame() {
        let mut frame = Frame::alloc_aligned(33, 9, PixelFormat::Yuv444p, 32);
        for plane in frame.planes_mut() {
            for (i, v) in plane.data_mut().iter_mut().enumerate() {
                *v = (i % 256) as u8;
            }
        }
        let expected = run(&mut SequentialProcessor::new(Kernel::Blur), frame.clone());
        let mut tp =
            ThreadPoolProcessor::new(&ProcessorOpts::new(Kernel::Blur).with_threads(3)).unwrap();
        assert_eq!(run(&mut tp, frame), expected);
        assert!(tp.pool().is_idle());
        assert_eq!(tp.pool().size(), 3);
    }
}
