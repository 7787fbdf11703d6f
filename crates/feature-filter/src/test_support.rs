//! Fixtures shared by the unit tests.

use crate::material::{Material, SharedMaterial};
use crate::scene::{TileId, TileMesh};
use serde_json::json;
use std::sync::Arc;
use tilemesh::{
    feature_id_attribute_name, FeatureIdSet, Geometry, MeshFeatures, Properties, PropertyTable,
    StructuralMetadata, VertexAttribute, POSITION,
};

/// One property table row per entry; `None` rows carry no `_oid`.
pub fn metadata_with_oids(oids: &[Option<u64>]) -> Arc<StructuralMetadata> {
    let rows = oids
        .iter()
        .map(|oid| {
            let mut row = Properties::new();
            if let Some(oid) = oid {
                row.insert("_oid".into(), json!(oid));
            }
            row
        })
        .collect();

    Arc::new(StructuralMetadata {
        property_tables: vec![PropertyTable {
            name: "features".into(),
            rows,
        }],
    })
}

/// Non-indexed geometry from per-vertex feature ids, turned into an explicit
/// index of consecutive triangles.
pub fn feature_geometry(fids: &[u32]) -> Geometry {
    let n = fids.len();
    let ids: Vec<f32> = fids.iter().map(|&f| f as f32).collect();
    let index: Vec<u32> = (0..(n / 3 * 3) as u32).collect();

    Geometry::new()
        .with_attribute(POSITION, VertexAttribute::new(vec![0.0; n * 3], 3))
        .with_attribute(feature_id_attribute_name(0), VertexAttribute::scalar(ids))
        .with_index(index)
}

pub fn feature_mesh_with(
    tile: TileId,
    fids: &[u32],
    oids: &[Option<u64>],
    material: SharedMaterial,
) -> TileMesh {
    TileMesh::new(tile, format!("tile_{}", tile.0), feature_geometry(fids), material).with_features(
        MeshFeatures {
            feature_ids: vec![FeatureIdSet {
                attribute: 0,
                property_table: 0,
            }],
        },
        metadata_with_oids(oids),
    )
}

pub fn feature_mesh(tile: TileId, fids: &[u32], oids: &[Option<u64>]) -> TileMesh {
    feature_mesh_with(tile, fids, oids, Material::new("tile").into_shared())
}
