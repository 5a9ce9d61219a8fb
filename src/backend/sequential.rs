use crate::{
    backend::{BackendKind, Prepared, Processor, init_once, require_init},
    foundation::error::FrameResult,
    frame::{context::Context, packet::Packet},
    stencil::{self, Kernel},
};

/// Single-threaded nested loops. Its output is the reference every other backend must match.
#[derive(Debug)]
pub struct SequentialProcessor {
    kernel: Kernel,
    prepared: Option<Prepared>,
    scratch: Vec<u8>,
}

impl SequentialProcessor {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            prepared: None,
            scratch: Vec::new(),
        }
    }
}

impl Processor for SequentialProcessor {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn init(&mut self, ctx: &Context) -> FrameResult<()> {
        init_once(&mut self.prepared, ctx)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kernel = %self.kernel))]
    fn process(&mut self, mut packet: Packet) -> FrameResult<Packet> {
        let geoms = require_init(&self.prepared)?.check(&packet)?;
        for (plane, geom) in packet.frame_mut().planes_mut().iter_mut().zip(&geoms) {
            stencil::apply_plane(self.kernel, plane.data_mut(), geom, &mut self.scratch);
        }
        Ok(packet)
    }
}
