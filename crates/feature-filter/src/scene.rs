//! Host-side scene: loaded tile contents and the meshes they carry.
//!
//! The tiling runtime owns streaming; this module only models what it hands
//! over once a tile's content is resident.

use crate::material::{Material, SharedMaterial};
use glam::Mat4;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tilemesh::{Geometry, MeshFeatures, Oid, Properties, StructuralMetadata};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique mesh identity. A reloaded tile gets new ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

/// Provenance of a mesh carved out of a tile mesh.
#[derive(Debug, Clone)]
pub struct SplitOrigin {
    pub source: MeshId,
    pub feature_id: u32,
    pub oid: Oid,
    pub properties: Properties,
}

/// Cloning yields a distinct mesh: the copy gets a fresh [`MeshId`] and shares
/// geometry buffers and material with the original.
#[derive(Debug)]
pub struct TileMesh {
    pub id: MeshId,
    pub tile: TileId,
    pub name: String,
    pub geometry: Geometry,
    pub material: SharedMaterial,
    /// World transform.
    pub transform: Mat4,
    pub features: Option<MeshFeatures>,
    pub metadata: Option<Arc<StructuralMetadata>>,
    /// Set on split meshes only.
    pub split: Option<SplitOrigin>,
}

impl Clone for TileMesh {
    fn clone(&self) -> Self {
        Self {
            id: MeshId::next(),
            tile: self.tile,
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            material: Rc::clone(&self.material),
            transform: self.transform,
            features: self.features.clone(),
            metadata: self.metadata.clone(),
            split: self.split.clone(),
        }
    }
}

impl TileMesh {
    pub fn new(
        tile: TileId,
        name: impl Into<String>,
        geometry: Geometry,
        material: SharedMaterial,
    ) -> Self {
        Self {
            id: MeshId::next(),
            tile,
            name: name.into(),
            geometry,
            material,
            transform: Mat4::IDENTITY,
            features: None,
            metadata: None,
            split: None,
        }
    }

    pub fn with_features(mut self, features: MeshFeatures, metadata: Arc<StructuralMetadata>) -> Self {
        self.features = Some(features);
        self.metadata = Some(metadata);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    #[inline]
    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    /// Renderable single-feature mesh sharing this mesh's vertex buffers.
    pub(crate) fn split_from(
        source: &TileMesh,
        geometry: Geometry,
        feature_id: u32,
        oid: Oid,
        properties: Properties,
    ) -> Self {
        let material: Material = source.material.borrow().clone_unconfigured();

        Self {
            id: MeshId::next(),
            tile: source.tile,
            name: format!("feature_{feature_id}_{oid}"),
            geometry,
            material: material.into_shared(),
            transform: source.transform,
            features: source.features.clone(),
            metadata: source.metadata.clone(),
            split: Some(SplitOrigin {
                source: source.id,
                feature_id,
                oid,
                properties,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileContent {
    pub meshes: Vec<Rc<TileMesh>>,
}

/// Resident tile contents, keyed by tile.
#[derive(Debug, Default)]
pub struct TileScene {
    tiles: BTreeMap<TileId, TileContent>,
}

impl TileScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) a tile's content and returns what it replaced.
    pub fn insert_tile(&mut self, tile: TileId, meshes: Vec<TileMesh>) -> Option<TileContent> {
        let content = TileContent {
            meshes: meshes.into_iter().map(Rc::new).collect(),
        };
        self.tiles.insert(tile, content)
    }

    pub fn remove_tile(&mut self, tile: TileId) -> Option<TileContent> {
        self.tiles.remove(&tile)
    }

    pub fn tile(&self, tile: TileId) -> Option<&TileContent> {
        self.tiles.get(&tile)
    }

    pub fn tile_ids(&self) -> Vec<TileId> {
        self.tiles.keys().copied().collect()
    }

    /// Every resident mesh, tile by tile.
    pub fn meshes(&self) -> impl Iterator<Item = &Rc<TileMesh>> {
        self.tiles.values().flat_map(|t| t.meshes.iter())
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Rc<TileMesh>> {
        self.meshes().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
