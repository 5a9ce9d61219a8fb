use std::path::{Path, PathBuf};

use crate::{
    backend::{BackendKind, GpuOpts, ProcessorOpts},
    codec::CodecEngine,
    foundation::error::{FrameError, FrameResult},
    stencil::Kernel,
};

/// Everything one run needs. Loaded from JSON, then overridden field by field from the CLI.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub backend: BackendKind,
    pub kernel: Kernel,
    /// Codec for both ends; `None` picks by file extension.
    pub engine: Option<CodecEngine>,
    /// Worker count for the parallel CPU backends; `0` means available parallelism.
    pub threads: usize,
    /// Decoded row strides are rounded up to a multiple of this.
    pub row_align: usize,
    pub overwrite: bool,
    pub gpu: GpuOpts,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            backend: BackendKind::default(),
            kernel: Kernel::default(),
            engine: None,
            threads: 0,
            row_align: 1,
            overwrite: true,
            gpu: GpuOpts::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> FrameResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg = serde_json::from_str(&text)
            .with_context(|| format!("parse config '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn processor_opts(&self) -> ProcessorOpts {
        ProcessorOpts {
            kernel: self.kernel,
            threads: self.threads,
            gpu: self.gpu,
        }
    }

    pub fn input_engine(&self) -> CodecEngine {
        self.engine
            .unwrap_or_else(|| CodecEngine::for_path(&self.input))
    }

    pub fn output_engine(&self) -> CodecEngine {
        self.engine
            .unwrap_or_else(|| CodecEngine::for_path(&self.output))
    }

    pub fn validate(&self) -> FrameResult<()> {
        if self.input.as_os_str().is_empty() {
            return Err(FrameError::validation("input path is required"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(FrameError::validation("output path is required"));
        }
        if self.input == self.output {
            return Err(FrameError::validation(
                "input and output must be different files",
            ));
        }
        if self.row_align == 0 || !self.row_align.is_power_of_two() {
            return Err(FrameError::validation(format!(
                "row_align must be a power of two, got {}",
                self.row_align
            )));
        }
        if self.gpu.fence_timeout_ms == 0 || self.gpu.max_wait_attempts == 0 {
            return Err(FrameError::validation(
                "gpu fence_timeout_ms and max_wait_attempts must be non-zero",
            ));
        }
        if !self.backend.is_available() {
            return Err(FrameError::validation(format!(
                "requested backend is not available: {} (rebuild with the 'gpu' feature)",
                self.backend
            )));
        }
        Ok(())
    }
}
