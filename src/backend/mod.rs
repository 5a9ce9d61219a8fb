//! The processor contract and the five interchangeable stencil backends.

pub mod fork_join;
pub mod geometry_cache;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod sequential;
pub mod simd;
pub mod thread_pool;

use crate::{
    foundation::error::{FrameError, FrameResult},
    frame::{
        context::{Context, PlaneGeometry},
        packet::Packet,
    },
    stencil::Kernel,
};

/// Execution strategy a processor uses. Fixed for the whole run.
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
pub enum BackendKind {
    #[default]
    Sequential,
    ForkJoin,
    ThreadPool,
    Gpu,
    Simd,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Sequential,
        BackendKind::ForkJoin,
        BackendKind::ThreadPool,
        BackendKind::Gpu,
        BackendKind::Simd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Sequential => "sequential",
            BackendKind::ForkJoin => "fork-join",
            BackendKind::ThreadPool => "thread-pool",
            BackendKind::Gpu => "gpu",
            BackendKind::Simd => "simd",
        }
    }

    /// Whether this build can construct the backend.
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::Gpu => cfg!(feature = "gpu"),
            _ => true,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// GPU completion-wait budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GpuOpts {
    /// Timeout of a single completion wait.
    pub fence_timeout_ms: u64,
    /// Waits attempted before giving up with `DeviceLost`.
    pub max_wait_attempts: u32,
}

impl Default for GpuOpts {
    fn default() -> Self {
        Self {
            fence_timeout_ms: 2_000,
            max_wait_attempts: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessorOpts {
    pub kernel: Kernel,
    /// Row bands (and workers) per plane for the parallel CPU backends; `0` picks the
    /// available hardware concurrency.
    pub threads: usize,
    pub gpu: GpuOpts,
}

impl ProcessorOpts {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub(crate) fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            crate::pool::default_thread_count()
        } else {
            self.threads
        }
    }
}

/// A per-frame transform with one-time lazy setup.
///
/// `init` is called exactly once, with the run's context, before the first `process`. Frames are
/// mutated in place and handed back inside the same packet.
pub trait Processor: Send {
    fn kind(&self) -> BackendKind;

    fn init(&mut self, ctx: &Context) -> FrameResult<()>;

    fn process(&mut self, packet: Packet) -> FrameResult<Packet>;
}

/// Build the processor for `kind`.
pub fn create_processor(kind: BackendKind, opts: &ProcessorOpts) -> FrameResult<Box<dyn Processor>> {
    tracing::debug!(backend = %kind, kernel = %opts.kernel, "creating processor");
    match kind {
        BackendKind::Sequential => Ok(Box::new(sequential::SequentialProcessor::new(
            opts.kernel,
        ))),
        BackendKind::ForkJoin => Ok(Box::new(fork_join::ForkJoinProcessor::new(opts)?)),
        BackendKind::ThreadPool => Ok(Box::new(thread_pool::ThreadPoolProcessor::new(opts)?)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(gpu::GpuProcessor::new(opts))),
        BackendKind::Simd => Ok(Box::new(simd::SimdProcessor::new(opts.kernel))),
        #[allow(unreachable_patterns)]
        _ => Err(FrameError::validation(format!(
            "requested backend is not available: {kind}"
        ))),
    }
}

/// Geometry captured by `init` and checked against every packet.
#[derive(Debug)]
pub(crate) struct Prepared {
    context: Context,
    planes: Vec<PlaneGeometry>,
}

impl Prepared {
    pub(crate) fn new(ctx: &Context) -> FrameResult<Self> {
        if ctx.width == 0 || ctx.height == 0 {
            return Err(FrameError::InvalidDimensions {
                width: ctx.width,
                height: ctx.height,
            });
        }
        Ok(Self {
            context: ctx.clone(),
            planes: ctx.plane_geometries(),
        })
    }

    pub(crate) fn planes(&self) -> &[PlaneGeometry] {
        &self.planes
    }

    /// Validate a packet's frame and context; returns the plane geometry to process.
    pub(crate) fn check(&self, packet: &Packet) -> FrameResult<Vec<PlaneGeometry>> {
        self.context.validate_frame(packet.frame())?;
        if **packet.context() != self.context {
            return Err(FrameError::validation(
                "packet context differs from the one the processor was initialized with",
            ));
        }
        Ok(self.planes.clone())
    }
}

/// Store the result of a first `init`; a second call is rejected.
pub(crate) fn init_once(slot: &mut Option<Prepared>, ctx: &Context) -> FrameResult<()> {
    if slot.is_some() {
        return Err(FrameError::validation("processor is already initialized"));
    }
    *slot = Some(Prepared::new(ctx)?);
    Ok(())
}

pub(crate) fn require_init(slot: &Option<Prepared>) -> FrameResult<&Prepared> {
    slot.as_ref()
        .ok_or_else(|| FrameError::validation("process called before init"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_match_cli_values() {
        use clap::ValueEnum as _;
        for kind in BackendKind::ALL {
            let pv = kind.to_possible_value().unwrap();
            assert_eq!(pv.get_name(), kind.name());
        }
    }

    #[test]
    fn opts_deserialize_with_defaults() {
        let opts: ProcessorOpts = serde_json::from_str(r#"{"kernel":"blur"}"#).unwrap();
        assert_eq!(opts.kernel, Kernel::Blur);
        assert_eq!(opts.threads, 0);
        assert_eq!(opts.gpu, GpuOpts::default());
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_is_unavailable_without_feature() {
        assert!(!BackendKind::Gpu.is_available());
        let err = match create_processor(BackendKind::Gpu, &ProcessorOpts::default()) {
            Ok(_) => panic!("gpu backend should not be available"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("not available"));
    }
}
