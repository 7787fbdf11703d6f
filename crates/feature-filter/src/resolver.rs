//! OID → feature id lookup per tile mesh.
//!
//! Id maps live in a side-table keyed by [`MeshId`] rather than on the meshes
//! themselves, and are rebuilt whenever a tile's content loads.

use crate::config::DuplicateOidPolicy;
use crate::scene::{MeshId, TileContent, TileId, TileMesh};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use tilemesh::{feature_id_from_f32, Oid};

/// OID → feature id for one tile mesh.
pub type IdMap = HashMap<Oid, u32>;

#[derive(Debug)]
struct Entry {
    tile: TileId,
    ids: IdMap,
}

#[derive(Debug, Default)]
pub struct OidResolver {
    policy: DuplicateOidPolicy,
    maps: HashMap<MeshId, Entry>,
}

impl OidResolver {
    pub fn new(policy: DuplicateOidPolicy) -> Self {
        Self {
            policy,
            maps: HashMap::new(),
        }
    }

    /// Tile meshes that carry feature data and are not themselves split meshes.
    pub fn is_indexable(mesh: &TileMesh) -> bool {
        mesh.features.is_some() && mesh.metadata.is_some() && !mesh.is_split()
    }

    /// Builds the id map for every eligible mesh of a tile; returns how many were indexed.
    pub fn index_tile(&mut self, content: &TileContent) -> usize {
        content
            .meshes
            .iter()
            .filter(|m| self.index_mesh(m).is_some())
            .count()
    }

    /// Builds (or rebuilds) one mesh's id map and returns its entry count.
    pub fn index_mesh(&mut self, mesh: &TileMesh) -> Option<usize> {
        if !Self::is_indexable(mesh) {
            return None;
        }

        let (features, metadata) = (mesh.features.as_ref()?, mesh.metadata.as_ref()?);
        let Some(set) = features.primary() else {
            warn!("{} '{}': no feature id set", mesh.id, mesh.name);
            return None;
        };
        let Some(attr) = mesh.geometry.feature_ids(set.attribute) else {
            warn!(
                "{} '{}': missing feature id attribute _feature_id_{}",
                mesh.id, mesh.name, set.attribute
            );
            return None;
        };

        // Ascending order makes first-seen-wins deterministic.
        let feature_ids: BTreeSet<u32> = attr.iter_x().filter_map(feature_id_from_f32).collect();

        let mut ids = IdMap::new();
        let mut duplicates = HashSet::new();

        for fid in feature_ids {
            let oid = match metadata.oid_of(set.property_table, fid) {
                Ok(Some(oid)) => oid,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{} '{}': feature {}: {}", mesh.id, mesh.name, fid, e);
                    continue;
                }
            };

            if let Some(&first) = ids.get(&oid) {
                debug!(
                    "{} '{}': oid {} on features {} and {}",
                    mesh.id, mesh.name, oid, first, fid
                );
                duplicates.insert(oid);
                continue;
            }
            ids.insert(oid, fid);
        }

        if self.policy == DuplicateOidPolicy::Reject && !duplicates.is_empty() {
            warn!(
                "{} '{}': dropping {} ambiguous oids",
                mesh.id,
                mesh.name,
                duplicates.len()
            );
            ids.retain(|oid, _| !duplicates.contains(oid));
        }

        let len = ids.len();
        self.maps.insert(mesh.id, Entry { tile: mesh.tile, ids });
        Some(len)
    }

    /// Drops every id map built for a tile's meshes.
    pub fn forget_tile(&mut self, tile: TileId) {
        self.maps.retain(|_, e| e.tile != tile);
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }

    pub fn id_map(&self, mesh: MeshId) -> Option<&IdMap> {
        self.maps.get(&mesh).map(|e| &e.ids)
    }

    /// Feature id 0 is a match like any other; meshes without a map never match.
    #[inline]
    pub fn contains_oid(&self, mesh: MeshId, oid: Oid) -> bool {
        self.feature_id(mesh, oid).is_some()
    }

    #[inline]
    pub fn feature_id(&self, mesh: MeshId, oid: Oid) -> Option<u32> {
        self.maps.get(&mesh).and_then(|e| e.ids.get(&oid).copied())
    }

    /// Number of meshes with an id map.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::test_support::{feature_mesh, metadata_with_oids};
    use tilemesh::{feature_id_attribute_name, Geometry, VertexAttribute, POSITION};

    #[test]
    fn maps_oids_to_feature_ids() {
        let mesh = feature_mesh(TileId(1), &[0, 0, 0, 1, 1, 1], &[Some(10), Some(11)]);
        let mut resolver = OidResolver::default();

        assert_eq!(resolver.index_mesh(&mesh), Some(2));
        // Feature id 0 is a valid match.
        assert_eq!(resolver.feature_id(mesh.id, Oid(10)), Some(0));
        assert!(resolver.contains_oid(mesh.id, Oid(10)));
        assert!(resolver.contains_oid(mesh.id, Oid(11)));
        assert!(!resolver.contains_oid(mesh.id, Oid(12)));
    }

    #[test]
    fn first_seen_wins_by_default() {
        let mesh = feature_mesh(TileId(1), &[2, 2, 2, 1, 1, 1], &[None, Some(7), Some(7)]);
        let mut resolver = OidResolver::default();
        resolver.index_mesh(&mesh);
        assert_eq!(resolver.feature_id(mesh.id, Oid(7)), Some(1));
    }

    #[test]
    fn reject_policy_drops_ambiguous_oids() {
        let mesh = feature_mesh(
            TileId(1),
            &[0, 0, 0, 1, 1, 1, 2, 2, 2],
            &[Some(7), Some(7), Some(8)],
        );
        let mut resolver = OidResolver::new(DuplicateOidPolicy::Reject);
        assert_eq!(resolver.index_mesh(&mesh), Some(1));
        assert!(!resolver.contains_oid(mesh.id, Oid(7)));
        assert!(resolver.contains_oid(mesh.id, Oid(8)));
    }

    #[test]
    fn lookup_failures_skip_only_that_feature() {
        // Feature 5 has no row in the table.
        let mesh = feature_mesh(TileId(1), &[0, 0, 0, 5, 5, 5], &[Some(3)]);
        let mut resolver = OidResolver::default();
        assert_eq!(resolver.index_mesh(&mesh), Some(1));
        assert!(resolver.contains_oid(mesh.id, Oid(3)));
    }

    #[test]
    fn meshes_without_map_never_match() {
        let plain = TileMesh::new(
            TileId(1),
            "plain",
            Geometry::new().with_attribute(POSITION, VertexAttribute::new(vec![0.0; 9], 3)),
            Material::new("m").into_shared(),
        );
        let mut resolver = OidResolver::default();
        assert_eq!(resolver.index_mesh(&plain), None);
        assert!(!resolver.contains_oid(plain.id, Oid(0)));
    }

    #[test]
    fn missing_attribute_is_skipped() {
        let geometry = Geometry::new().with_attribute(POSITION, VertexAttribute::new(vec![0.0; 9], 3));
        let mesh = TileMesh::new(TileId(1), "bare", geometry, Material::new("m").into_shared())
            .with_features(
                tilemesh::MeshFeatures {
                    feature_ids: vec![tilemesh::FeatureIdSet { attribute: 0, property_table: 0 }],
                },
                metadata_with_oids(&[Some(1)]),
            );
        assert!(mesh.geometry.attribute(&feature_id_attribute_name(0)).is_none());

        let mut resolver = OidResolver::default();
        assert_eq!(resolver.index_mesh(&mesh), None);
    }

    #[test]
    fn forget_tile_drops_only_that_tile() {
        let a = feature_mesh(TileId(1), &[0, 0, 0], &[Some(1)]);
        let b = feature_mesh(TileId(2), &[0, 0, 0], &[Some(1)]);
        let mut resolver = OidResolver::default();
        resolver.index_mesh(&a);
        resolver.index_mesh(&b);

        resolver.forget_tile(TileId(1));
        assert!(!resolver.contains_oid(a.id, Oid(1)));
        assert!(resolver.contains_oid(b.id, Oid(1)));
        assert_eq!(resolver.len(), 1);
    }
}
