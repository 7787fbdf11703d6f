//! GPU-side data layouts.

use glam::Mat4;

/// Per-mesh uniform at group 0, binding 0.
/// Must match `MeshUniform` in `shaders/tile_mesh.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct MeshUniform {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

impl MeshUniform {
    pub fn new(view_proj: Mat4, model: Mat4, base_color: [f32; 4]) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            base_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_wgsl() {
        // mat4x4 + mat4x4 + vec4, no padding.
        assert_eq!(std::mem::size_of::<MeshUniform>(), 144);
        assert_eq!(std::mem::size_of::<MeshUniform>() % 16, 0);
    }

    #[test]
    fn matrices_are_column_major() {
        let t = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let u = MeshUniform::new(Mat4::IDENTITY, t, [1.0; 4]);
        assert_eq!(u.model[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
