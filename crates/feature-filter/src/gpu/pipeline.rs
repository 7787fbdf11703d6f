//! Render pipelines per material, rebuilt whenever the material is flagged
//! for recompile (for filtered materials, when the hidden-id capacity moves).

use crate::gpu::types::MeshUniform;
use crate::material::{Material, MaterialId};
use crate::shader::FEATURE_ID_LOCATION;
use anyhow::Result;
use log::debug;
use std::collections::{HashMap, HashSet};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VEC3_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;
const F32_STRIDE: u64 = std::mem::size_of::<f32>() as u64;

pub struct CachedPipeline {
    pub pipeline: wgpu::RenderPipeline,
    /// Built from a filtered material: binds group 1 and the feature id buffer.
    pub filtered: bool,
    /// Hidden-id array length the shader was compiled with.
    pub capacity: usize,
}

pub struct PipelineCache {
    pub mesh_layout: wgpu::BindGroupLayout,
    pub hidden_layout: wgpu::BindGroupLayout,
    plain_layout: wgpu::PipelineLayout,
    filtered_layout: wgpu::PipelineLayout,
    pipelines: HashMap<MaterialId, CachedPipeline>,
    builds: usize,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device) -> Self {
        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh UBO Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<MeshUniform>() as u64),
                },
                count: None,
            }],
        });

        // Array length varies with capacity, so no minimum size here.
        let hidden_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hidden Feature Ids Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let plain_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Mesh PipelineLayout"),
            bind_group_layouts: &[&mesh_layout],
            push_constant_ranges: &[],
        });
        let filtered_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Filtered Tile Mesh PipelineLayout"),
            bind_group_layouts: &[&mesh_layout, &hidden_layout],
            push_constant_ranges: &[],
        });

        Self {
            mesh_layout,
            hidden_layout,
            plain_layout,
            filtered_layout,
            pipelines: HashMap::new(),
            builds: 0,
        }
    }

    /// Builds the material's pipeline if it is missing or the material needs
    /// an update, then marks the material compiled.
    pub fn prepare(&mut self, device: &wgpu::Device, material: &mut Material) -> Result<()> {
        if !material.needs_update() && self.pipelines.contains_key(&material.id()) {
            return Ok(());
        }

        let source = material.compile()?;
        let pipeline = self.build(device, material, &source);
        debug!(
            "built pipeline for {} '{}' (capacity {})",
            material.id(),
            material.label,
            pipeline.capacity
        );
        self.pipelines.insert(material.id(), pipeline);
        self.builds += 1;
        material.mark_compiled();
        Ok(())
    }

    pub fn get(&self, material: MaterialId) -> Option<&CachedPipeline> {
        self.pipelines.get(&material)
    }

    /// Drops pipelines of materials no longer in use.
    pub fn retain(&mut self, live: &HashSet<MaterialId>) {
        self.pipelines.retain(|id, _| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Pipelines built since creation, rebuilds included.
    pub fn builds(&self) -> usize {
        self.builds
    }

    fn build(&self, device: &wgpu::Device, material: &Material, source: &str) -> CachedPipeline {
        let filtered = material.is_filtered();
        let capacity = material
            .filter_binding()
            .map_or(0, |b| b.compiled_capacity);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(material.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let position = [wgpu::VertexAttribute {
            shader_location: 0,
            offset: 0,
            format: wgpu::VertexFormat::Float32x3,
        }];
        let normal = [wgpu::VertexAttribute {
            shader_location: 1,
            offset: 0,
            format: wgpu::VertexFormat::Float32x3,
        }];
        let feature_id = [wgpu::VertexAttribute {
            shader_location: FEATURE_ID_LOCATION,
            offset: 0,
            format: wgpu::VertexFormat::Float32,
        }];

        let mut vbuf_layouts = vec![
            wgpu::VertexBufferLayout {
                array_stride: VEC3_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &position,
            },
            wgpu::VertexBufferLayout {
                array_stride: VEC3_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &normal,
            },
        ];
        if filtered {
            vbuf_layouts.push(wgpu::VertexBufferLayout {
                array_stride: F32_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &feature_id,
            });
        }

        let layout = if filtered {
            &self.filtered_layout
        } else {
            &self.plain_layout
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(material.label.as_str()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: material.side.cull_mode(),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        CachedPipeline {
            pipeline,
            filtered,
            capacity,
        }
    }
}
