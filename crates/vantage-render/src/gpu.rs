//! wgpu backend.
//!
//! Each unit owns an `Rgba8Unorm` texture; a frame clears every unit to its
//! view's color and then copies the unit textures onto one composite
//! texture following the tile layout. The copies are encoded after all unit
//! passes in the same submission, so the composite always reflects the
//! just-rendered frame.
//!
//! Units paint the same per-view color as the software path, which keeps
//! the two backends byte-compatible and lets the smoke tests compare them
//! directly.
//!
//! Readbacks copy the composite into a mapped staging buffer. The blocking
//! path waits on the device; the async path parks the mapped buffer in a
//! pending list that the frame loop pumps once per tick.

use vantage_core::view::ViewPoint;

use crate::{
    backend::{BackendError, BackendResult, RenderBackend},
    readback::{self, ReadbackError, ReadbackSender, ReadbackTicket},
    software::view_color,
    tile::{TileImage, TileLayout},
    unit::UnitPool,
};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const BYTES_PER_TEXEL: u32 = 4;

/// Row stride of a readback buffer, padded to the copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_TEXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn unit_clear_color(view: &ViewPoint) -> wgpu::Color {
    let [r, g, b] = view_color(view);
    wgpu::Color {
        r: f64::from(r) / 255.0,
        g: f64::from(g) / 255.0,
        b: f64::from(b) / 255.0,
        a: 1.0,
    }
}

struct GpuSurfaces {
    units: Vec<wgpu::Texture>,
    composite: wgpu::Texture,
    layout: TileLayout,
}

/// A submitted composite-to-buffer copy whose mapping has been requested.
struct InflightCopy {
    buffer: wgpu::Buffer,
    map_rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    width: u32,
    height: u32,
    bytes_per_row: u32,
}

struct PendingRead {
    copy: InflightCopy,
    out: ReadbackSender,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surfaces: Option<GpuSurfaces>,
    pending: Vec<PendingRead>,
}

impl GpuBackend {
    /// Request a high-performance adapter and device. Fails with
    /// [`BackendError::NoDevice`] when the machine has no usable GPU, which
    /// callers treat as the cue to fall back to the software backend.
    pub fn new() -> BackendResult<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BackendError::NoDevice {
                message: e.to_string(),
            })?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = %info.backend, "gpu adapter selected");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: Some("vantage-device"),
                ..Default::default()
            })
            .await
            .map_err(|e| BackendError::NoDevice {
                message: e.to_string(),
            })?;

        Ok(GpuBackend {
            device,
            queue,
            surfaces: None,
            pending: Vec::new(),
        })
    }

    fn make_texture(
        &self,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        })
    }

    /// Encode and submit a composite-to-buffer copy, then request the
    /// mapping. The returned copy carries everything needed to resolve it
    /// later, so surface reallocation cannot corrupt an in-flight read.
    fn submit_copy(&mut self) -> Result<InflightCopy, ReadbackError> {
        let surfaces = self
            .surfaces
            .as_ref()
            .ok_or_else(|| ReadbackError::CopyFailed("backend not configured".to_string()))?;
        let width = surfaces.layout.surface_width();
        let height = surfaces.layout.surface_height();
        let bytes_per_row = padded_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vantage-readback"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vantage-readback-copy"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &surfaces.composite,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        Ok(InflightCopy {
            buffer,
            map_rx: rx,
            width,
            height,
            bytes_per_row,
        })
    }

    /// Unpad the mapped rows and drop the alpha channel.
    fn finish_read(copy: InflightCopy) -> Result<TileImage, ReadbackError> {
        let data = copy.buffer.slice(..).get_mapped_range();
        let mut pixels = Vec::with_capacity(
            copy.width as usize * copy.height as usize * TileImage::BYTES_PER_PIXEL,
        );
        for row in 0..copy.height {
            let start = (row * copy.bytes_per_row) as usize;
            let row_data = &data[start..start + (copy.width * BYTES_PER_TEXEL) as usize];
            for texel in row_data.chunks_exact(BYTES_PER_TEXEL as usize) {
                pixels.extend_from_slice(&texel[0..3]);
            }
        }
        drop(data);
        copy.buffer.unmap();
        Ok(TileImage::from_pixels(copy.width, copy.height, pixels))
    }

    fn blocking_read(&mut self) -> Result<TileImage, ReadbackError> {
        let copy = self.submit_copy()?;
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        match copy.map_rx.recv() {
            Ok(Ok(())) => Self::finish_read(copy),
            Ok(Err(err)) => Err(ReadbackError::MapFailed(err.to_string())),
            Err(_) => Err(ReadbackError::Disconnected),
        }
    }

    /// Resolve whichever pending readbacks have mapped by now.
    fn pump_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let _ = self.device.poll(wgpu::PollType::Poll);
        let mut index = 0;
        while index < self.pending.len() {
            match self.pending[index].copy.map_rx.try_recv() {
                Ok(Ok(())) => {
                    let read = self.pending.remove(index);
                    let _ = read.out.send(Self::finish_read(read.copy));
                }
                Ok(Err(err)) => {
                    let read = self.pending.remove(index);
                    let _ = read
                        .out
                        .send(Err(ReadbackError::MapFailed(err.to_string())));
                }
                Err(std::sync::mpsc::TryRecvError::Empty) => index += 1,
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    let read = self.pending.remove(index);
                    let _ = read.out.send(Err(ReadbackError::Disconnected));
                }
            }
        }
    }
}

impl RenderBackend for GpuBackend {
    fn configure(&mut self, layout: &TileLayout) -> BackendResult<()> {
        let cell = layout.cell();
        if cell.width == 0 || cell.height == 0 {
            return Err(BackendError::SurfaceAllocation {
                width: cell.width,
                height: cell.height,
                message: "surface dimensions must be non-zero".to_string(),
            });
        }
        let units = (0..layout.pool_size())
            .map(|_| {
                self.make_texture(
                    cell.width,
                    cell.height,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    "vantage-unit",
                )
            })
            .collect();
        let composite = self.make_texture(
            layout.surface_width(),
            layout.surface_height(),
            wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            "vantage-composite",
        );
        tracing::debug!(
            units = layout.pool_size(),
            cell_width = cell.width,
            cell_height = cell.height,
            "gpu surfaces allocated"
        );
        self.surfaces = Some(GpuSurfaces {
            units,
            composite,
            layout: layout.clone(),
        });
        Ok(())
    }

    fn render_frame(&mut self, pool: &UnitPool) -> BackendResult<()> {
        let surfaces = self.surfaces.as_ref().ok_or_else(|| BackendError::RenderFailed {
            message: "backend not configured".to_string(),
        })?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vantage-frame"),
            });

        for (index, unit) in pool.units().iter().enumerate() {
            let color = if unit.enabled() {
                unit_clear_color(unit.view())
            } else {
                wgpu::Color::BLACK
            };
            let view = surfaces.units[index].create_view(&wgpu::TextureViewDescriptor::default());
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vantage-unit-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        // Composite copies run after every unit pass in this submission.
        let cell = surfaces.layout.cell();
        for placement in surfaces.layout.placements() {
            encoder.copy_texture_to_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &surfaces.units[placement.unit],
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &surfaces.composite,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: placement.x,
                        y: surfaces.layout.top_row(placement),
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: cell.width,
                    height: cell.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        self.queue.submit(Some(encoder.finish()));

        self.pump_pending();
        Ok(())
    }

    fn read_tiles(&mut self) -> BackendResult<TileImage> {
        self.blocking_read()
            .map_err(|err| BackendError::RenderFailed {
                message: err.to_string(),
            })
    }

    fn request_tiles(&mut self) -> ReadbackTicket {
        let (out, ticket) = readback::channel();
        match self.submit_copy() {
            Ok(copy) => self.pending.push(PendingRead { copy, out }),
            Err(err) => {
                let _ = out.send(Err(err));
            }
        }
        ticket
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        for read in self.pending.drain(..) {
            let _ = read.out.send(Err(ReadbackError::Incomplete));
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        readback::Readback,
        unit::{PoolConfig, SurfaceSpec, UnitPool},
    };

    #[test]
    fn test_padded_bytes_per_row() {
        // 100 texels at 4 bytes each pad up to the next multiple of 256.
        assert_eq!(padded_bytes_per_row(100), 512);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(224), 1024);
    }

    #[test]
    fn test_unit_clear_color_round_trips_to_unorm() {
        let view = ViewPoint::looking(Vec3::new(3.0, 1.0, 4.0), Vec3::Z);
        let [r, _, _] = view_color(&view);
        let color = unit_clear_color(&view);
        assert_eq!((color.r * 255.0).round() as u8, r);
        assert_eq!(color.a, 1.0);
    }

    fn gpu_rig(units: usize, cell: u32) -> (UnitPool, GpuBackend) {
        let pool = UnitPool::new(PoolConfig {
            units,
            surface: SurfaceSpec::square(cell),
            field_of_view: 60.0,
        });
        let mut backend = GpuBackend::new().unwrap();
        backend
            .configure(&TileLayout::new(units, pool.surface()))
            .unwrap();
        (pool, backend)
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_matches_software_colors() {
        let (mut pool, mut backend) = gpu_rig(2, 4);
        let view = ViewPoint::looking(Vec3::new(1.0, 2.0, 3.0), Vec3::Z);
        pool.prepare(0, &view);
        backend.render_frame(&pool).unwrap();

        let tiles = backend.read_tiles().unwrap();
        assert_eq!(tiles.width(), 8);
        assert_eq!(&tiles.pixels()[0..3], &view_color(&view));
        // Unit 1 is disabled and cleared to black.
        assert_eq!(&tiles.pixels()[12..15], &[0, 0, 0]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_async_readback_resolves_across_frames() {
        let (mut pool, mut backend) = gpu_rig(1, 4);
        let view = ViewPoint::looking(Vec3::ONE, Vec3::X);
        pool.prepare(0, &view);
        backend.render_frame(&pool).unwrap();

        let mut ticket = backend.request_tiles();
        pool.reset(0);
        // Pump until the mapping resolves; each frame polls the device once.
        let mut image = None;
        for _ in 0..100 {
            backend.render_frame(&pool).unwrap();
            match ticket.poll() {
                Readback::Pending => continue,
                Readback::Ready(tiles) => {
                    image = Some(tiles);
                    break;
                }
                Readback::Failed(err) => panic!("readback failed: {}", err),
            }
        }
        let image = image.expect("readback never resolved");
        assert_eq!(&image.pixels()[0..3], &view_color(&view));
    }
}
