//! JSON scene description: tiles, meshes and their feature metadata.

use anyhow::{bail, Context, Result};
use feature_filter::{FilterConfig, Material, SharedMaterial, Side, TileId, TileMesh, TileScene};
use glam::Mat4;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tilemesh::{
    feature_id_attribute_name, FeatureIdSet, Geometry, MeshFeatures, StructuralMetadata,
    VertexAttribute, NORMAL, POSITION,
};

#[derive(Debug, Deserialize)]
pub struct SceneFile {
    /// Filter tunables; CLI flags override them.
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Materials shared by name between meshes.
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialDesc>,
    pub tiles: Vec<TileDesc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaterialDesc {
    #[serde(default = "default_color")]
    pub base_color: [f32; 4],
    #[serde(default)]
    pub double_sided: bool,
}

fn default_color() -> [f32; 4] {
    [0.8, 0.8, 0.8, 1.0]
}

#[derive(Debug, Deserialize)]
pub struct TileDesc {
    pub id: u64,
    /// Metadata shared by every mesh of the tile unless a mesh has its own.
    #[serde(default)]
    pub metadata: Option<StructuralMetadata>,
    pub meshes: Vec<MeshDesc>,
}

#[derive(Debug, Deserialize)]
pub struct MeshDesc {
    pub name: String,
    /// Flat `xyz` triples.
    pub positions: Vec<f32>,
    #[serde(default)]
    pub normals: Option<Vec<f32>>,
    /// One feature id per vertex, stored as `_feature_id_0`.
    #[serde(default)]
    pub feature_ids: Option<Vec<f32>>,
    #[serde(default)]
    pub indices: Option<Vec<u32>>,
    /// Column-major world transform.
    #[serde(default)]
    pub transform: Option<[f32; 16]>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub metadata: Option<StructuralMetadata>,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing scene {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds every tile into a fresh scene. Named materials are shared.
    pub fn build(&self) -> Result<(TileScene, MaterialLibrary)> {
        let mut materials = MaterialLibrary::new(&self.materials);
        let mut scene = TileScene::new();
        for tile in &self.tiles {
            let meshes = self.build_tile_with(tile, &mut materials)?;
            scene.insert_tile(TileId(tile.id), meshes);
        }
        Ok((scene, materials))
    }

    /// Fresh meshes for one tile, as a tile reload would produce.
    pub fn build_tile(&self, id: TileId, materials: &mut MaterialLibrary) -> Result<Vec<TileMesh>> {
        let Some(tile) = self.tiles.iter().find(|t| t.id == id.0) else {
            bail!("{id} is not in the scene file");
        };
        self.build_tile_with(tile, materials)
    }

    fn build_tile_with(&self, tile: &TileDesc, materials: &mut MaterialLibrary) -> Result<Vec<TileMesh>> {
        let shared = tile.metadata.clone().map(Arc::new);
        tile.meshes
            .iter()
            .map(|m| {
                build_mesh(TileId(tile.id), m, shared.as_ref(), materials)
                    .with_context(|| format!("tile {} mesh '{}'", tile.id, m.name))
            })
            .collect()
    }
}

fn build_mesh(
    tile: TileId,
    desc: &MeshDesc,
    tile_metadata: Option<&Arc<StructuralMetadata>>,
    materials: &mut MaterialLibrary,
) -> Result<TileMesh> {
    if desc.positions.len() % 3 != 0 {
        bail!("{} position floats is not a multiple of 3", desc.positions.len());
    }
    let vertex_count = desc.positions.len() / 3;

    let mut geometry = Geometry::new().with_attribute(POSITION, VertexAttribute::new(desc.positions.clone(), 3));

    if let Some(normals) = &desc.normals {
        if normals.len() != desc.positions.len() {
            bail!("{} normal floats for {} vertices", normals.len(), vertex_count);
        }
        geometry.set_attribute(NORMAL, VertexAttribute::new(normals.clone(), 3));
    }

    if let Some(ids) = &desc.feature_ids {
        if ids.len() != vertex_count {
            bail!("{} feature ids for {} vertices", ids.len(), vertex_count);
        }
        geometry.set_attribute(feature_id_attribute_name(0), VertexAttribute::scalar(ids.clone()));
    }

    if let Some(indices) = &desc.indices {
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            bail!("index {} out of range for {} vertices", bad, vertex_count);
        }
        geometry.set_index(indices.clone());
    }

    let material = materials.resolve(desc.material.as_deref(), &desc.name)?;
    let mut mesh = TileMesh::new(tile, desc.name.clone(), geometry, material);

    if let Some(cols) = &desc.transform {
        mesh = mesh.with_transform(Mat4::from_cols_array(cols));
    }

    let metadata = desc.metadata.clone().map(Arc::new).or_else(|| tile_metadata.cloned());
    if let (Some(metadata), true) = (metadata, desc.feature_ids.is_some()) {
        mesh = mesh.with_features(
            MeshFeatures {
                feature_ids: vec![FeatureIdSet {
                    attribute: 0,
                    property_table: 0,
                }],
            },
            metadata,
        );
    }

    Ok(mesh)
}

/// Named materials, created once and shared across tile reloads.
#[derive(Debug)]
pub struct MaterialLibrary {
    descs: BTreeMap<String, MaterialDesc>,
    shared: BTreeMap<String, SharedMaterial>,
}

impl MaterialLibrary {
    fn new(descs: &BTreeMap<String, MaterialDesc>) -> Self {
        Self {
            descs: descs.clone(),
            shared: BTreeMap::new(),
        }
    }

    fn resolve(&mut self, name: Option<&str>, mesh: &str) -> Result<SharedMaterial> {
        let Some(name) = name else {
            return Ok(Material::new(mesh).into_shared());
        };
        if let Some(m) = self.shared.get(name) {
            return Ok(m.clone());
        }
        let Some(desc) = self.descs.get(name) else {
            bail!("unknown material '{name}'");
        };

        let mut material = Material::new(name);
        material.base_color = desc.base_color;
        if desc.double_sided {
            material.side = Side::Double;
        }
        let material = material.into_shared();
        self.shared.insert(name.to_string(), material.clone());
        Ok(material)
    }

    /// Every material handed out so far.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedMaterial)> {
        self.shared.iter().map(|(k, v)| (k.as_str(), v))
    }
}
