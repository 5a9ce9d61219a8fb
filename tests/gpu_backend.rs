#[cfg(feature = "gpu")]
mod gpu_backend {
    use std::sync::Arc;

    use frameblend::{
        Context, Frame, Kernel, Packet, PixelFormat, Processor, ProcessorOpts, StreamInfo,
        backend::gpu::GpuProcessor,
    };

    fn frame(seed: u8) -> Frame {
        let mut f = Frame::alloc_aligned(48, 10, PixelFormat::Yuv420p, 16);
        for plane in f.planes_mut() {
            for (i, b) in plane.data_mut().iter_mut().enumerate() {
                *b = (i as u8).wrapping_mul(7).wrapping_add(seed);
            }
        }
        f
    }

    /// `None` when no adapter is present on this machine.
    fn start(kernel: Kernel, ctx: &Context) -> Option<GpuProcessor> {
        let mut p = GpuProcessor::new(&ProcessorOpts::new(kernel));
        match p.init(ctx) {
            Ok(()) => Some(p),
            Err(e) if e.to_string().contains("no gpu adapter available") => None,
            Err(e) => panic!("unexpected gpu init error: {e}"),
        }
    }

    #[test]
    fn identical_geometry_reuses_image_handles() {
        let first = frame(1);
        let ctx = Arc::new(Context::from_frame(&first, &StreamInfo::default()));
        let Some(mut gpu) = start(Kernel::Blur, &ctx) else {
            return;
        };

        // Luma and both chroma planes: chroma share one geometry.
        let luma = ctx.plane_geometry(0).unwrap().key();
        let chroma = ctx.plane_geometry(1).unwrap().key();
        assert_eq!(gpu.allocations(), 2);
        let luma_id = gpu.image_handles(luma.0, luma.1).unwrap();
        let chroma_id = gpu.image_handles(chroma.0, chroma.1).unwrap();

        gpu.process(Packet::new(first, Arc::clone(&ctx))).unwrap();
        gpu.process(Packet::new(frame(2), Arc::clone(&ctx))).unwrap();

        assert_eq!(gpu.allocations(), 2);
        assert_eq!(gpu.image_handles(luma.0, luma.1), Some(luma_id));
        assert_eq!(gpu.image_handles(chroma.0, chroma.1), Some(chroma_id));
    }

    #[test]
    fn gpu_line_blend_writes_expected_rows() {
        let f = frame(3);
        let ctx = Arc::new(Context::from_frame(&f, &StreamInfo::default()));
        let Some(mut gpu) = start(Kernel::LineBlend, &ctx) else {
            return;
        };
        let out = gpu.process(Packet::new(f.clone(), ctx)).unwrap().into_frame();
        let (src, dst) = (f.planes()[0].data(), out.planes()[0].data());
        let stride = f.strides()[0];
        for x in 0..48 {
            let expected = ((u16::from(src[x]) + u16::from(src[stride + x])) >> 1) as u8;
            assert_eq!(dst[x], src[x]);
            assert_eq!(dst[stride + x], expected, "x={x}");
        }
    }
}
