//! frameblend filters decoded video frames with one of two stencils: a line-blend deinterlace
//! (every odd row averaged with the row above) or a 3x3 weighted blur.
//!
//! The same filter runs on five interchangeable backends chosen once per run:
//!
//! - sequential scalar loops (the reference)
//! - rayon fork-join over row bands
//! - a persistent worker [`ThreadPool`]
//! - wgpu compute shaders (feature `gpu`)
//! - 32-byte SIMD lanes
//!
//! A [`Pipeline`] moves packets from a [`FrameSource`] through a [`Processor`] into a
//! [`FrameSink`]; [`run`] wires that up from a [`RunConfig`].

mod foundation;

pub mod backend;
pub mod codec;
pub mod config;
pub mod frame;
pub mod pipeline;
pub mod pool;
mod runner;
pub mod stencil;

pub use crate::foundation::core::{PixelFormat, PixelFormatDescriptor, Rational};
pub use crate::foundation::error::{FrameError, FrameResult};
pub use crate::foundation::timing::Stopwatch;

pub use crate::backend::{
    BackendKind, GpuOpts, Processor, ProcessorOpts, create_processor,
};
pub use crate::codec::{
    CodecEngine, DecodedFrame, FrameSink, FrameSource, InMemoryOutput, InMemorySink,
    InMemorySource,
};
pub use crate::config::RunConfig;
pub use crate::frame::context::{Context, PlaneGeometry, StreamInfo};
pub use crate::frame::packet::{Frame, Packet, Plane};
pub use crate::pipeline::{
    NodeRole, NodeState, Pipeline, PipelineNode, ProcessorNode, RunStats, SinkNode, SourceNode,
};
pub use crate::pool::ThreadPool;
pub use crate::runner::run;
pub use crate::stencil::Kernel;
