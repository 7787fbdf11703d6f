//! Vertex, index and uniform buffers for tile meshes.
//!
//! Split meshes share their source's attribute allocations, so vertex buffers
//! are pooled by allocation and uploaded once. Index buffers and uniforms are
//! per mesh.

use crate::gpu::types::MeshUniform;
use crate::scene::TileMesh;
use std::collections::{HashMap, HashSet};
use tilemesh::{VertexAttribute, NORMAL, POSITION};
use wgpu::util::DeviceExt;

/// GPU copies of vertex attributes, keyed by backing allocation.
#[derive(Default)]
pub struct VertexBufferPool {
    // The attribute clone keeps the allocation, and so the key, alive.
    buffers: HashMap<usize, (VertexAttribute, wgpu::Buffer)>,
}

impl VertexBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads `attr` unless an attribute sharing its allocation already was.
    pub fn upload(&mut self, device: &wgpu::Device, label: &str, attr: &VertexAttribute) -> usize {
        let key = attr.buffer_key();
        self.buffers.entry(key).or_insert_with(|| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(attr.data()),
                usage: wgpu::BufferUsages::VERTEX,
            });
            (attr.clone(), buffer)
        });
        key
    }

    pub fn get(&self, key: usize) -> Option<&wgpu::Buffer> {
        self.buffers.get(&key).map(|(_, b)| b)
    }

    pub fn retain(&mut self, live: &HashSet<usize>) {
        self.buffers.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// A vertex stream: pooled when the mesh has the attribute, owned otherwise.
pub enum VertexSource {
    Pooled(usize),
    Owned(wgpu::Buffer),
}

impl VertexSource {
    pub fn resolve<'a>(&'a self, pool: &'a VertexBufferPool) -> Option<&'a wgpu::Buffer> {
        match self {
            VertexSource::Pooled(key) => pool.get(*key),
            VertexSource::Owned(buffer) => Some(buffer),
        }
    }

    fn pooled_key(&self) -> Option<usize> {
        match self {
            VertexSource::Pooled(key) => Some(*key),
            VertexSource::Owned(_) => None,
        }
    }
}

/// Hidden-id uniform of one mesh, sized for one capacity.
pub struct HiddenIds {
    pub capacity: usize,
    pub buffer: wgpu::Buffer,
    pub bind: wgpu::BindGroup,
}

/// Everything needed to draw one tile mesh.
pub struct GpuMesh {
    pub ubo: wgpu::Buffer,
    pub bind: wgpu::BindGroup,
    pub position: VertexSource,
    pub normal: VertexSource,
    /// Only set for meshes drawn with a filtered pipeline.
    pub feature_ids: Option<VertexSource>,
    pub hidden: Option<HiddenIds>,
    pub index: Option<(wgpu::Buffer, u32)>,
    pub vertex_count: u32,
}

impl GpuMesh {
    /// `None` when the mesh has no usable `vec3` position attribute.
    pub fn new(
        device: &wgpu::Device,
        mesh_layout: &wgpu::BindGroupLayout,
        pool: &mut VertexBufferPool,
        mesh: &TileMesh,
    ) -> Option<Self> {
        let geometry = &mesh.geometry;
        let position = geometry.attribute(POSITION).filter(|a| a.item_size() == 3)?;
        let vertex_count = position.count();
        let label = mesh.name.as_str();

        let position = VertexSource::Pooled(pool.upload(device, label, position));
        let normal = match geometry.attribute(NORMAL).filter(|a| a.item_size() == 3 && a.count() >= vertex_count) {
            Some(n) => VertexSource::Pooled(pool.upload(device, label, n)),
            None => VertexSource::Owned(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Flat Normals"),
                contents: bytemuck::cast_slice(&vec![[0.0f32, 0.0, 1.0]; vertex_count.max(1)]),
                usage: wgpu::BufferUsages::VERTEX,
            })),
        };

        let ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh UBO"),
            size: std::mem::size_of::<MeshUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout: mesh_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        });

        let index = geometry.index().filter(|i| !i.is_empty()).map(|i| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(i),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, i.len() as u32)
        });

        Some(Self {
            ubo,
            bind,
            position,
            normal,
            feature_ids: None,
            hidden: None,
            index,
            vertex_count: vertex_count as u32,
        })
    }

    /// Attaches the feature id stream. Meshes without the attribute get a
    /// buffer of `sentinel`, which the filter never hides.
    pub fn ensure_feature_ids(
        &mut self,
        device: &wgpu::Device,
        pool: &mut VertexBufferPool,
        mesh: &TileMesh,
        sentinel: f32,
    ) {
        if self.feature_ids.is_some() {
            return;
        }

        let attr = mesh
            .features
            .as_ref()
            .and_then(|f| f.primary())
            .and_then(|set| mesh.geometry.feature_ids(set.attribute))
            .filter(|a| a.item_size() == 1 && a.count() >= self.vertex_count as usize);

        self.feature_ids = Some(match attr {
            Some(a) => VertexSource::Pooled(pool.upload(device, &mesh.name, a)),
            None => VertexSource::Owned(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sentinel Feature Ids"),
                contents: bytemuck::cast_slice(&vec![sentinel; (self.vertex_count as usize).max(1)]),
                usage: wgpu::BufferUsages::VERTEX,
            })),
        });
    }

    pub fn write_uniform(&self, queue: &wgpu::Queue, uniform: &MeshUniform) {
        queue.write_buffer(&self.ubo, 0, bytemuck::bytes_of(uniform));
    }

    /// Uploads this frame's hidden ids, reallocating when the length changed.
    pub fn write_hidden_ids(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        values: &[f32],
    ) {
        let stale = self
            .hidden
            .as_ref()
            .map_or(true, |h| h.capacity != values.len());

        if stale {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Hidden Feature Ids"),
                size: (values.len() * std::mem::size_of::<f32>()) as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Hidden Feature Ids Bind Group"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.hidden = Some(HiddenIds {
                capacity: values.len(),
                buffer,
                bind,
            });
        }

        if let Some(h) = &self.hidden {
            queue.write_buffer(&h.buffer, 0, bytemuck::cast_slice(values));
        }
    }

    /// Pool keys this mesh draws from.
    pub fn pooled_keys(&self) -> impl Iterator<Item = usize> + '_ {
        [Some(&self.position), Some(&self.normal), self.feature_ids.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(VertexSource::pooled_key)
    }
}
