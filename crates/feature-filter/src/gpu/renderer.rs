//! Offscreen renderer for a list of tile meshes with the feature filter applied.

use crate::gpu::buffers::{GpuMesh, VertexBufferPool};
use crate::gpu::context::GpuContext;
use crate::gpu::pipeline::{PipelineCache, COLOR_FORMAT, DEPTH_FORMAT};
use crate::gpu::types::MeshUniform;
use crate::plugin::TilesFilterPlugin;
use crate::scene::{MeshId, TileMesh};
use anyhow::{anyhow, Result};
use glam::Mat4;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

struct Target {
    color_tex: wgpu::Texture,
    color: wgpu::TextureView,
    _depth_tex: wgpu::Texture,
    depth: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl Target {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let create_tex = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color_tex = create_tex(
            "Offscreen Color",
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth_tex = create_tex("Offscreen Depth", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);

        Self {
            color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            color_tex,
            _depth_tex: depth_tex,
            width: size.width,
            height: size.height,
        }
    }
}

pub struct SceneRenderer {
    pipelines: PipelineCache,
    vertices: VertexBufferPool,
    meshes: HashMap<MeshId, GpuMesh>,
    target: Target,
    pub clear_color: wgpu::Color,
}

impl SceneRenderer {
    pub fn new(ctx: &GpuContext, width: u32, height: u32) -> Self {
        Self {
            pipelines: PipelineCache::new(&ctx.device),
            vertices: VertexBufferPool::new(),
            meshes: HashMap::new(),
            target: Target::new(&ctx.device, width, height),
            clear_color: wgpu::Color::TRANSPARENT,
        }
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn vertex_buffers(&self) -> &VertexBufferPool {
        &self.vertices
    }

    /// Draws `meshes` into the offscreen target. Materials are synced with the
    /// plugin's capacity first, so a crossing rebuilds pipelines this frame.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        plugin: &TilesFilterPlugin,
        meshes: &[Rc<TileMesh>],
        view_proj: Mat4,
    ) -> Result<()> {
        let device = &ctx.device;
        let sentinel = plugin.filter().sentinel();

        let mut live_meshes = HashSet::new();
        let mut live_materials = HashSet::new();

        for mesh in meshes {
            let (filtered, base_color) = {
                let mut material = mesh.material.borrow_mut();
                plugin.filter().sync_material(&mut material);
                self.pipelines.prepare(device, &mut material)?;
                live_materials.insert(material.id());
                (material.is_filtered(), material.base_color)
            };

            if !self.meshes.contains_key(&mesh.id) {
                match GpuMesh::new(device, &self.pipelines.mesh_layout, &mut self.vertices, mesh) {
                    Some(gpu) => {
                        self.meshes.insert(mesh.id, gpu);
                    }
                    None => {
                        warn!("{} '{}': no vec3 position attribute, not drawn", mesh.id, mesh.name);
                        continue;
                    }
                }
            }
            let Some(gpu) = self.meshes.get_mut(&mesh.id) else {
                continue;
            };
            live_meshes.insert(mesh.id);

            gpu.write_uniform(&ctx.queue, &MeshUniform::new(view_proj, mesh.transform, base_color));
            if filtered {
                gpu.ensure_feature_ids(device, &mut self.vertices, mesh, sentinel);
                gpu.write_hidden_ids(
                    device,
                    &ctx.queue,
                    &self.pipelines.hidden_layout,
                    &plugin.uniform_values(mesh.id),
                );
            }
        }

        self.meshes.retain(|id, _| live_meshes.contains(id));
        self.pipelines.retain(&live_materials);
        let live_buffers: HashSet<usize> = self.meshes.values().flat_map(GpuMesh::pooled_keys).collect();
        self.vertices.retain(&live_buffers);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut drawn = 0;
            for mesh in meshes {
                let Some(gpu) = self.meshes.get(&mesh.id) else {
                    continue;
                };
                let material_id = mesh.material.borrow().id();
                let Some(cached) = self.pipelines.get(material_id) else {
                    continue;
                };
                let (Some(position), Some(normal)) = (
                    gpu.position.resolve(&self.vertices),
                    gpu.normal.resolve(&self.vertices),
                ) else {
                    continue;
                };

                pass.set_pipeline(&cached.pipeline);
                pass.set_bind_group(0, &gpu.bind, &[]);
                pass.set_vertex_buffer(0, position.slice(..));
                pass.set_vertex_buffer(1, normal.slice(..));

                if cached.filtered {
                    let (Some(ids), Some(hidden)) = (
                        gpu.feature_ids.as_ref().and_then(|f| f.resolve(&self.vertices)),
                        gpu.hidden.as_ref(),
                    ) else {
                        continue;
                    };
                    pass.set_vertex_buffer(2, ids.slice(..));
                    pass.set_bind_group(1, &hidden.bind, &[]);
                }

                match &gpu.index {
                    Some((index, count)) => {
                        pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..*count, 0, 0..1);
                    }
                    None => pass.draw(0..gpu.vertex_count, 0..1),
                }
                drawn += 1;
            }
            debug!("drew {} of {} meshes", drawn, meshes.len());
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Reads the color target back as tightly packed RGBA8 rows.
    pub fn read_pixels(&self, ctx: &GpuContext) -> Result<Vec<u8>> {
        let (width, height) = (self.target.width, self.target.height);
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.color_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        let _ = ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| anyhow!("readback buffer was never mapped"))??;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in mapped.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        staging.unmap();

        Ok(pixels)
    }
}

/// Pixels with non-zero alpha in an RGBA8 image.
pub fn coverage(pixels: &[u8]) -> usize {
    pixels.chunks_exact(4).filter(|p| p[3] != 0).count()
}
