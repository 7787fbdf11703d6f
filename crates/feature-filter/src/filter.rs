//! Per-material visibility filter and the per-draw uniform values it consumes.

use crate::capacity::{compute_capacity_with, normalize_baseline};
use crate::config::FilterConfig;
use crate::error::Result;
use crate::material::{FilterBinding, Material, ShaderHook, Side};
use crate::resolver::OidResolver;
use crate::scene::MeshId;
use crate::shader::{
    inject_feature_filter, ShaderDefine, FEATURE_ID_COUNT, FEATURE_ID_TOLERANCE,
    FEATURE_ID_VEC4_COUNT,
};
use log::debug;
use tilemesh::Oid;

/// Defines owned by the filter on a configured material.
pub const FILTER_DEFINES: [&str; 3] = [FEATURE_ID_COUNT, FEATURE_ID_VEC4_COUNT, FEATURE_ID_TOLERANCE];

/// Compile hook splicing the filter into a material's shader.
pub const FILTER_HOOK: ShaderHook = ShaderHook {
    name: "feature_filter",
    apply: inject_feature_filter,
};

#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    capacity: usize,
    uniform_limit: usize,
    min_capacity: usize,
    tolerance: f32,
    sentinel: f32,
}

impl VisibilityFilter {
    pub fn new(config: &FilterConfig, uniform_limit: usize) -> Self {
        let min_capacity = normalize_baseline(config.min_capacity);
        Self {
            capacity: min_capacity,
            uniform_limit,
            min_capacity,
            tolerance: config.tolerance,
            sentinel: config.sentinel,
        }
    }

    /// Current compiled array length.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sentinel(&self) -> f32 {
        self.sentinel
    }

    /// Capacity needed for `hidden` ids, without applying it.
    pub fn compute_capacity(&self, hidden: usize) -> Result<usize> {
        compute_capacity_with(hidden, self.uniform_limit, self.min_capacity)
    }

    /// Returns true if the capacity changed.
    pub fn set_capacity(&mut self, capacity: usize) -> bool {
        if capacity == self.capacity {
            return false;
        }
        debug!("feature id capacity {} -> {}", self.capacity, capacity);
        self.capacity = capacity;
        true
    }

    /// Configures a material for filtering. Returns false if it already was.
    pub fn setup_material(&self, material: &mut Material) -> bool {
        if material.is_filtered() {
            return false;
        }

        // Hidden faces must not reveal back faces of neighbouring features.
        material.side = Side::Double;
        self.write_defines(material);
        material.set_define(FEATURE_ID_TOLERANCE, ShaderDefine::F32(self.tolerance));
        if !material.has_hook(FILTER_HOOK.name) {
            material.add_hook(FILTER_HOOK);
        }
        material.set_filter_binding(FilterBinding {
            compiled_capacity: self.capacity,
        });
        material.mark_needs_update();
        true
    }

    /// Brings a configured material's array length in line with the current
    /// capacity. Returns true when the material was flagged for recompile.
    pub fn sync_material(&self, material: &mut Material) -> bool {
        let Some(binding) = material.filter_binding() else {
            return false;
        };
        if binding.compiled_capacity == self.capacity {
            return false;
        }

        self.write_defines(material);
        material.set_filter_binding(FilterBinding {
            compiled_capacity: self.capacity,
        });
        material.mark_needs_update();
        true
    }

    fn write_defines(&self, material: &mut Material) {
        material.set_define(FEATURE_ID_COUNT, ShaderDefine::U32(self.capacity as u32));
        material.set_define(
            FEATURE_ID_VEC4_COUNT,
            ShaderDefine::U32((self.capacity / 4) as u32),
        );
    }

    /// Uniform contents for one mesh: slot `i` holds the mesh-local feature id
    /// of `hidden[i]`, every other slot the sentinel.
    pub fn hidden_feature_values(&self, mesh: MeshId, hidden: &[Oid], resolver: &OidResolver) -> Vec<f32> {
        let mut values = vec![self.sentinel; self.capacity];
        for (slot, oid) in values.iter_mut().zip(hidden) {
            if let Some(fid) = resolver.feature_id(mesh, *oid) {
                *slot = fid as f32;
            }
        }
        values
    }

    /// CPU mirror of the shader's `should_hide_feature`.
    pub fn should_hide(&self, feature_id: f32, values: &[f32]) -> bool {
        values.iter().any(|v| (v - feature_id).abs() < self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TileId;
    use crate::test_support::feature_mesh;

    fn filter() -> VisibilityFilter {
        VisibilityFilter::new(&FilterConfig::default(), 1024)
    }

    #[test]
    fn setup_is_idempotent() {
        let f = filter();
        let mut m = Material::new("tile");

        assert!(f.setup_material(&mut m));
        assert!(!f.setup_material(&mut m));

        assert_eq!(m.side, Side::Double);
        assert_eq!(m.define(FEATURE_ID_COUNT), Some(ShaderDefine::U32(32)));
        assert_eq!(m.define(FEATURE_ID_VEC4_COUNT), Some(ShaderDefine::U32(8)));
        let src = m.compile().unwrap();
        assert_eq!(src.matches("fn should_hide_feature(").count(), 1);
    }

    #[test]
    fn sync_flags_only_on_capacity_change() {
        let mut f = filter();
        let mut m = Material::new("tile");
        f.setup_material(&mut m);
        m.mark_compiled();

        assert!(!f.sync_material(&mut m));
        assert!(!m.needs_update());

        assert!(f.set_capacity(64));
        assert!(f.sync_material(&mut m));
        assert!(m.needs_update());
        assert_eq!(m.filter_binding().unwrap().compiled_capacity, 64);
        assert_eq!(m.define(FEATURE_ID_VEC4_COUNT), Some(ShaderDefine::U32(16)));

        m.mark_compiled();
        assert!(!f.sync_material(&mut m));
    }

    #[test]
    fn unconfigured_materials_are_left_alone() {
        let f = filter();
        let mut m = Material::new("tile");
        m.mark_compiled();
        assert!(!f.sync_material(&mut m));
        assert!(!m.needs_update());
    }

    #[test]
    fn sentinel_never_matches_feature_zero() {
        let f = filter();
        let mesh = feature_mesh(TileId(1), &[0, 0, 0, 1, 1, 1], &[Some(10), Some(11)]);
        let mut resolver = OidResolver::default();
        resolver.index_mesh(&mesh);

        // Nothing hidden: feature 0 stays visible.
        let none = f.hidden_feature_values(mesh.id, &[], &resolver);
        assert_eq!(none.len(), 32);
        assert!(none.iter().all(|&v| v == -1.0));
        assert!(!f.should_hide(0.0, &none));

        // Oid 10 maps to feature 0.
        let values = f.hidden_feature_values(mesh.id, &[Oid(10)], &resolver);
        assert_eq!(values[0], 0.0);
        assert!(values[1..].iter().all(|&v| v == -1.0));
        assert!(f.should_hide(0.0, &values));
        assert!(f.should_hide(0.0004, &values));
        assert!(!f.should_hide(1.0, &values));
    }

    #[test]
    fn unknown_oids_keep_their_slot_as_sentinel() {
        let f = filter();
        let mesh = feature_mesh(TileId(1), &[0, 0, 0, 1, 1, 1], &[Some(10), Some(11)]);
        let mut resolver = OidResolver::default();
        resolver.index_mesh(&mesh);

        let values = f.hidden_feature_values(mesh.id, &[Oid(99), Oid(11)], &resolver);
        assert_eq!(&values[..3], &[-1.0, 1.0, -1.0]);
    }
}
