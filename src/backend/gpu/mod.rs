//! Compute-shader backend on wgpu.
//!
//! Each plane is uploaded into a read image, filtered into a write image by one dispatch, and
//! copied back through a mapped readback buffer. Images are 32-bit unsigned texels holding one
//! sample each; they are allocated once per distinct `(stride, height)` and reused for every frame.

mod device;

pub use device::GpuDevice;

use wgpu::util::DeviceExt as _;

use crate::{
    backend::{
        BackendKind, GpuOpts, Prepared, Processor, ProcessorOpts,
        geometry_cache::GeometryCache,
    },
    foundation::error::{FrameError, FrameResult},
    frame::{
        context::{Context, PlaneGeometry},
        packet::Packet,
    },
    stencil::Kernel,
};

use device::align_to;

const LINE_BLEND_WGSL: &str = include_str!("shaders/line_blend.wgsl");
const BLUR_WGSL: &str = include_str!("shaders/blur.wgsl");

/// Uniform block shared by both shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PlaneParams {
    /// Columns line-blend touches.
    width: u32,
    height: u32,
    /// Full row length (stride) in texels.
    row_len: u32,
    _pad: u32,
}

/// Workgroup shape compiled into each shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    pub fn for_kernel(kernel: Kernel) -> Self {
        match kernel {
            Kernel::LineBlend => WorkgroupSize { x: 32, y: 1 },
            Kernel::Blur => WorkgroupSize { x: 16, y: 16 },
        }
    }

    /// Workgroups needed to cover `width`x`height` texels.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(self.x), height.div_ceil(self.y))
    }
}

struct PlaneImages {
    read: wgpu::Texture,
    write: wgpu::Texture,
    readback: wgpu::Buffer,
    readback_bytes_per_row: u32,
    bind_group: wgpu::BindGroup,
}

struct GpuState {
    gpu: GpuDevice,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    images: GeometryCache<PlaneImages>,
    prepared: Prepared,
}

/// GPU compute processor. Device, pipeline and images are created by `init`.
pub struct GpuProcessor {
    kernel: Kernel,
    opts: GpuOpts,
    state: Option<GpuState>,
}

impl GpuProcessor {
    pub fn new(opts: &ProcessorOpts) -> Self {
        Self {
            kernel: opts.kernel,
            opts: opts.gpu,
            state: None,
        }
    }

    /// Id of the cached image pair for a plane geometry, if one has been allocated.
    pub fn image_handles(&self, stride: u32, height: u32) -> Option<u64> {
        self.state
            .as_ref()
            .and_then(|s| s.images.get((stride, height)))
            .map(|e| e.id)
    }

    /// Image pairs allocated so far.
    pub fn allocations(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.images.allocations())
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.gpu.info.name.as_str())
    }
}

impl Processor for GpuProcessor {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn init(&mut self, ctx: &Context) -> FrameResult<()> {
        if self.state.is_some() {
            return Err(FrameError::validation("processor is already initialized"));
        }
        let prepared = Prepared::new(ctx)?;
        let gpu = GpuDevice::new()?;
        let layout = bind_group_layout(&gpu.device);
        let (label, source) = match self.kernel {
            Kernel::LineBlend => ("frameblend_line_blend", LINE_BLEND_WGSL),
            Kernel::Blur => ("frameblend_blur", BLUR_WGSL),
        };
        let pipeline = gpu.compile_compute(label, source, &layout)?;

        let mut images = GeometryCache::new();
        for geom in prepared.planes() {
            images.get_or_try_insert_with(geom.key(), || allocate_images(&gpu, &layout, geom))?;
        }
        tracing::info!(
            kernel = %self.kernel,
            images = images.allocations(),
            "gpu processor initialized"
        );

        self.state = Some(GpuState {
            gpu,
            layout,
            pipeline,
            images,
            prepared,
        });
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kernel = %self.kernel))]
    fn process(&mut self, mut packet: Packet) -> FrameResult<Packet> {
        let GpuState {
            gpu,
            layout,
            pipeline,
            images,
            prepared,
        } = self
            .state
            .as_mut()
            .ok_or_else(|| FrameError::validation("process called before init"))?;
        let geoms = prepared.check(&packet)?;
        let wg = WorkgroupSize::for_kernel(self.kernel);

        for (plane, geom) in packet.frame_mut().planes_mut().iter_mut().zip(&geoms) {
            let entry =
                images.get_or_try_insert_with(geom.key(), || allocate_images(gpu, layout, geom))?;
            let data = &mut plane.data_mut()[..geom.byte_len()];
            run_plane(gpu, pipeline, &entry.value, geom, wg, &self.opts, data)?;
        }
        Ok(packet)
    }
}

fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frameblend_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Uint,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::R32Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<PlaneParams>() as u64
                    ),
                },
                count: None,
            },
        ],
    })
}

fn extent(geom: &PlaneGeometry) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: geom.stride as u32,
        height: geom.height as u32,
        depth_or_array_layers: 1,
    }
}

fn allocate_images(
    gpu: &GpuDevice,
    layout: &wgpu::BindGroupLayout,
    geom: &PlaneGeometry,
) -> FrameResult<PlaneImages> {
    let max = gpu.device.limits().max_texture_dimension_2d as usize;
    if geom.stride == 0 || geom.height == 0 || geom.stride > max || geom.height > max {
        return Err(FrameError::validation(format!(
            "plane {}x{} does not fit a gpu image (max {max})",
            geom.stride, geom.height
        )));
    }

    let image = |label: &str, usage: wgpu::TextureUsages| {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(geom),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Uint,
            usage,
            view_formats: &[],
        })
    };
    let read = image(
        "frameblend_read_image",
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    let write = image(
        "frameblend_write_image",
        wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
    );

    let readback_bytes_per_row = align_to(
        geom.stride as u32 * 4,
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
    );
    let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("frameblend_readback"),
        size: u64::from(readback_bytes_per_row) * geom.height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let params = PlaneParams {
        width: geom.width as u32,
        height: geom.height as u32,
        row_len: geom.stride as u32,
        _pad: 0,
    };
    let params = gpu
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frameblend_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

    let read_view = read.create_view(&wgpu::TextureViewDescriptor::default());
    let write_view = write.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frameblend_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&read_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&write_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params.as_entire_binding(),
            },
        ],
    });

    Ok(PlaneImages {
        read,
        write,
        readback,
        readback_bytes_per_row,
        bind_group,
    })
}

fn run_plane(
    gpu: &GpuDevice,
    pipeline: &wgpu::ComputePipeline,
    images: &PlaneImages,
    geom: &PlaneGeometry,
    wg: WorkgroupSize,
    opts: &GpuOpts,
    data: &mut [u8],
) -> FrameResult<()> {
    let (stride, height) = (geom.stride as u32, geom.height as u32);

    let wide: Vec<u32> = data.iter().map(|&b| u32::from(b)).collect();
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &images.read,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&wide),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(stride * 4),
            rows_per_image: Some(height),
        },
        extent(geom),
    );

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frameblend_plane"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("frameblend_dispatch"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &images.bind_group, &[]);
        let (gx, gy) = wg.dispatch_size(stride, height);
        tracing::debug!(plane = geom.index, gx, gy, "dispatch");
        pass.dispatch_workgroups(gx, gy, 1);
    }
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &images.write,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &images.readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(images.readback_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        extent(geom),
    );
    let index = gpu.queue.submit(Some(encoder.finish()));

    let slice = images.readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    gpu.wait_for(index, opts)?;
    rx.recv()
        .map_err(|_| FrameError::device_lost("readback channel closed"))?
        .map_err(|e| FrameError::device_lost(format!("readback map failed: {e:?}")))?;

    {
        let mapped = slice.get_mapped_range();
        let padded = images.readback_bytes_per_row as usize;
        let row_bytes = geom.stride * 4;
        for (y, row) in data.chunks_exact_mut(geom.stride).enumerate() {
            let texels = &mapped[y * padded..y * padded + row_bytes];
            for (dst, t) in row.iter_mut().zip(texels.chunks_exact(4)) {
                *dst = u32::from_le_bytes([t[0], t[1], t[2], t[3]]).min(255) as u8;
            }
        }
    }
    images.readback.unmap();
    Ok(())
}
