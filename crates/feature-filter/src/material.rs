//! Materials: a WGSL template plus the state the filter attaches to it.

use crate::error::Result;
use crate::shader::{ShaderDefine, DEFAULT_TEMPLATE};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    fn next() -> Self {
        MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

/// Materials are shared between the meshes of a tile and mutated in place by
/// the filter; everything runs on the render thread.
pub type SharedMaterial = Rc<RefCell<Material>>;

/// Which faces are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

impl Side {
    pub fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }
}

/// Source rewrite run on every compile, in registration order.
#[derive(Clone, Copy)]
pub struct ShaderHook {
    pub name: &'static str,
    pub apply: fn(&mut String) -> Result<bool>,
}

impl fmt::Debug for ShaderHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShaderHook").field(&self.name).finish()
    }
}

/// Marker left on a material by the visibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterBinding {
    /// Array length the material was last compiled (or flagged) for.
    pub compiled_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Material {
    id: MaterialId,
    pub label: String,
    pub side: Side,
    pub base_color: [f32; 4],
    template: Arc<str>,
    defines: BTreeMap<String, ShaderDefine>,
    hooks: Vec<ShaderHook>,
    filter: Option<FilterBinding>,
    needs_update: bool,
}

impl Material {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_template(label, DEFAULT_TEMPLATE)
    }

    pub fn with_template(label: impl Into<String>, template: impl Into<Arc<str>>) -> Self {
        Self {
            id: MaterialId::next(),
            label: label.into(),
            side: Side::Front,
            base_color: [0.8, 0.8, 0.8, 1.0],
            template: template.into(),
            defines: BTreeMap::new(),
            hooks: Vec::new(),
            filter: None,
            needs_update: true,
        }
    }

    pub fn into_shared(self) -> SharedMaterial {
        Rc::new(RefCell::new(self))
    }

    #[inline]
    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn define(&self, name: &str) -> Option<ShaderDefine> {
        self.defines.get(name).copied()
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: ShaderDefine) {
        let name = name.into();
        if self.defines.get(&name) != Some(&value) {
            self.defines.insert(name, value);
            self.needs_update = true;
        }
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.iter().any(|h| h.name == name)
    }

    pub fn add_hook(&mut self, hook: ShaderHook) {
        self.hooks.push(hook);
        self.needs_update = true;
    }

    pub fn filter_binding(&self) -> Option<FilterBinding> {
        self.filter
    }

    pub(crate) fn set_filter_binding(&mut self, binding: FilterBinding) {
        self.filter = Some(binding);
    }

    #[inline]
    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// The material must be rebuilt before its next draw.
    #[inline]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }

    pub fn mark_compiled(&mut self) {
        self.needs_update = false;
    }

    /// Final WGSL: define constants followed by the hooked template.
    pub fn compile(&self) -> Result<String> {
        let mut body = self.template.to_string();
        for hook in &self.hooks {
            (hook.apply)(&mut body)?;
        }

        let mut source = String::with_capacity(body.len() + 128);
        for (name, value) in &self.defines {
            source.push_str(&value.declare(name));
            source.push('\n');
        }
        source.push_str(&body);

        Ok(source)
    }

    /// A copy under a new id without compile hooks or filter state, for meshes
    /// carved out of a filtered tile.
    pub fn clone_unconfigured(&self) -> Material {
        let mut defines = self.defines.clone();
        if self.filter.is_some() {
            defines.retain(|name, _| !crate::filter::FILTER_DEFINES.contains(&name.as_str()));
        }

        Material {
            id: MaterialId::next(),
            label: self.label.clone(),
            side: self.side,
            base_color: self.base_color,
            template: Arc::clone(&self.template),
            defines,
            hooks: Vec::new(),
            filter: None,
            needs_update: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FILTER_HOOK;

    #[test]
    fn defines_are_emitted_before_the_body() {
        let mut m = Material::new("tile");
        m.set_define("FOO", ShaderDefine::U32(3));
        let src = m.compile().unwrap();
        assert!(src.starts_with("const FOO: u32 = 3u;\n"));
        assert!(src.contains("fn fs_main"));
    }

    #[test]
    fn redefining_the_same_value_does_not_dirty() {
        let mut m = Material::new("tile");
        m.set_define("FOO", ShaderDefine::U32(3));
        m.mark_compiled();
        m.set_define("FOO", ShaderDefine::U32(3));
        assert!(!m.needs_update());
        m.set_define("FOO", ShaderDefine::U32(4));
        assert!(m.needs_update());
    }

    #[test]
    fn hooks_run_at_compile_time_only() {
        let mut m = Material::new("tile");
        m.add_hook(FILTER_HOOK);
        assert!(!crate::shader::is_injected(m.template()));
        assert!(crate::shader::is_injected(&m.compile().unwrap()));
    }

    #[test]
    fn unconfigured_clone_gets_a_fresh_id() {
        let mut m = Material::new("tile");
        m.add_hook(FILTER_HOOK);
        m.side = Side::Double;

        let c = m.clone_unconfigured();
        assert_ne!(c.id(), m.id());
        assert!(!c.is_filtered());
        assert!(!crate::shader::is_injected(&c.compile().unwrap()));
        assert_eq!(c.side, Side::Double);
    }
}
