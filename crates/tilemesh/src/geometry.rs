//! Vertex attributes and indexed triangle geometry.
//!
//! Attribute storage is reference counted: cloning a [`VertexAttribute`] or a
//! [`Geometry`] never copies vertex data, it only bumps the `Arc`. Derived
//! geometries (see [`crate::split`]) rely on this to share buffers with the
//! tile mesh they were carved out of.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the position attribute.
pub const POSITION: &str = "position";
/// Name of the normal attribute.
pub const NORMAL: &str = "normal";

/// Name of the per-vertex feature id attribute for feature-id set `n`.
#[inline]
pub fn feature_id_attribute_name(n: u32) -> String {
    format!("_feature_id_{n}")
}

/// A flat `f32` vertex attribute with `item_size` components per vertex.
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    data: Arc<[f32]>,
    item_size: usize,
}

impl VertexAttribute {
    pub fn new(data: impl Into<Arc<[f32]>>, item_size: usize) -> Self {
        Self {
            data: data.into(),
            item_size: item_size.max(1),
        }
    }

    /// One component per vertex, as used for feature ids.
    pub fn scalar(data: impl Into<Arc<[f32]>>) -> Self {
        Self::new(data, 1)
    }

    /// Number of complete vertices stored in this attribute.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len() / self.item_size
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// First component of vertex `i`.
    #[inline]
    pub fn get_x(&self, i: usize) -> Option<f32> {
        if i < self.count() {
            Some(self.data[i * self.item_size])
        } else {
            None
        }
    }

    /// First component of every vertex, in vertex order.
    pub fn iter_x(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.chunks_exact(self.item_size).map(|c| c[0])
    }

    /// True when both attributes point at the same backing allocation.
    #[inline]
    pub fn shares_buffer_with(&self, other: &VertexAttribute) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Address of the backing allocation; equal for attributes that share it.
    #[inline]
    pub fn buffer_key(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

/// Named vertex attributes plus an optional triangle-list index buffer.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    attributes: BTreeMap<String, VertexAttribute>,
    index: Option<Arc<[u32]>>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: VertexAttribute) -> Self {
        self.set_attribute(name, attribute);
        self
    }

    pub fn with_index(mut self, index: impl Into<Arc<[u32]>>) -> Self {
        self.set_index(index);
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: VertexAttribute) {
        self.attributes.insert(name.into(), attribute);
    }

    pub fn set_index(&mut self, index: impl Into<Arc<[u32]>>) {
        self.index = Some(index.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &VertexAttribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The feature id attribute for feature-id set `n`, if the tile carries one.
    pub fn feature_ids(&self, n: u32) -> Option<&VertexAttribute> {
        self.attributes.get(&feature_id_attribute_name(n))
    }

    pub fn index(&self) -> Option<&[u32]> {
        self.index.as_deref()
    }

    /// Vertex count taken from `position`, falling back to the longest attribute.
    pub fn vertex_count(&self) -> usize {
        match self.attributes.get(POSITION) {
            Some(p) => p.count(),
            None => self
                .attributes
                .values()
                .map(VertexAttribute::count)
                .max()
                .unwrap_or(0),
        }
    }

    /// Number of whole triangles, indexed or not. A trailing partial triangle is ignored.
    pub fn triangle_count(&self) -> usize {
        match &self.index {
            Some(index) => index.len() / 3,
            None => self.vertex_count() / 3,
        }
    }

    /// Vertex indices of triangle `t`.
    pub fn triangle(&self, t: usize) -> Option<[u32; 3]> {
        if t >= self.triangle_count() {
            return None;
        }

        match &self.index {
            Some(index) => {
                let i = t * 3;
                Some([index[i], index[i + 1], index[i + 2]])
            }
            None => {
                let a = (t * 3) as u32;
                Some([a, a + 1, a + 2])
            }
        }
    }

    /// Iterates every whole triangle as vertex indices.
    pub fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        match &self.index {
            Some(index) => Box::new(index.chunks_exact(3).map(|t| [t[0], t[1], t[2]])),
            None => {
                let n = self.triangle_count() as u32;
                Box::new((0..n).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]))
            }
        }
    }

    /// True when every attribute of `self` shares its buffer with the same-named
    /// attribute of `other`.
    pub fn shares_vertex_buffers_with(&self, other: &Geometry) -> bool {
        self.attributes.iter().all(|(name, attr)| {
            other
                .attributes
                .get(name)
                .is_some_and(|o| attr.shares_buffer_with(o))
        })
    }
}
