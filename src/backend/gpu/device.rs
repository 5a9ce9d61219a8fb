use std::time::Duration;

use crate::{
    backend::GpuOpts,
    foundation::error::{FrameError, FrameResult},
};

/// Headless wgpu device plus queue.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub info: wgpu::AdapterInfo,
}

impl GpuDevice {
    /// Acquire the preferred adapter and a device with default limits. No surface is involved.
    pub fn new() -> FrameResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                FrameError::device_init("no gpu adapter available")
            }
            other => FrameError::device_init(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("frameblend_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| FrameError::device_init(format!("wgpu request_device failed: {e:?}")))?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "gpu adapter selected");
        Ok(Self {
            device,
            queue,
            info,
        })
    }

    /// Compile `source` and build a compute pipeline with an explicit bind group layout.
    ///
    /// Validation failures are captured through an error scope and reported as `ShaderCompile`.
    pub fn compile_compute(
        &self,
        label: &str,
        source: &'static str,
        layout: &wgpu::BindGroupLayout,
    ) -> FrameResult<wgpu::ComputePipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FrameError::shader_compile(format!("{label}: {err}")));
        }
        Ok(pipeline)
    }

    /// Block until `index` completes, one `fence_timeout` at a time.
    ///
    /// Gives up with `DeviceLost` after `max_wait_attempts` timed-out waits.
    pub fn wait_for(&self, index: wgpu::SubmissionIndex, opts: &GpuOpts) -> FrameResult<()> {
        let timeout = Duration::from_millis(opts.fence_timeout_ms);
        let attempts = opts.max_wait_attempts.max(1);
        for attempt in 1..=attempts {
            match self.device.poll(wgpu::PollType::Wait {
                submission_index: Some(index.clone()),
                timeout: Some(timeout),
            }) {
                Ok(_) => return Ok(()),
                Err(wgpu::PollError::Timeout) => {
                    tracing::warn!(attempt, attempts, "gpu completion wait timed out");
                }
                Err(other) => {
                    return Err(FrameError::device_lost(format!("wgpu poll failed: {other}")));
                }
            }
        }
        Err(FrameError::device_lost(format!(
            "gpu work did not complete after {attempts} waits of {}ms",
            opts.fence_timeout_ms
        )))
    }
}

/// Round `value` up to a multiple of `alignment` (a power of two).
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_copy_alignment() {
        let a = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        assert_eq!(align_to(1, a), 256);
        assert_eq!(align_to(256, a), 256);
        assert_eq!(align_to(257, a), 512);
    }
}
