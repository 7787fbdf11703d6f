//! Turns the per-feature geometries of a tile mesh into renderable meshes.

use crate::scene::TileMesh;
use log::warn;
use std::rc::Rc;
use tilemesh::{row_oid, split_geometry, FeatureIndex, Oid};

/// Splits out every feature of `mesh` whose `_oid` equals `oid`.
///
/// The feature index is built once per call. Property lookups that fail are
/// logged and skipped without affecting sibling features. A mesh lacking its
/// feature id attribute yields no split meshes.
pub fn split_mesh_by_oid(mesh: &TileMesh, oid: Oid) -> Vec<Rc<TileMesh>> {
    let (Some(features), Some(metadata)) = (mesh.features.as_ref(), mesh.metadata.as_ref()) else {
        return Vec::new();
    };
    let Some(set) = features.primary() else {
        return Vec::new();
    };
    let Some(attr) = mesh.geometry.feature_ids(set.attribute) else {
        warn!(
            "{} '{}': no feature id attribute _feature_id_{}",
            mesh.id, mesh.name, set.attribute
        );
        return Vec::new();
    };

    let index = FeatureIndex::build(attr);
    let mut meshes = Vec::new();

    for fid in index.sorted_feature_ids() {
        let properties = match metadata.property_table_data(set.property_table, fid) {
            Ok(p) => p,
            Err(e) => {
                warn!("{} '{}': feature {}: {}", mesh.id, mesh.name, fid, e);
                continue;
            }
        };

        match row_oid(properties, fid) {
            Ok(Some(found)) if found == oid => {}
            Ok(_) => continue,
            Err(e) => {
                warn!("{} '{}': feature {}: {}", mesh.id, mesh.name, fid, e);
                continue;
            }
        }

        let Some(geometry) = split_geometry(&mesh.geometry, &index, fid) else {
            continue;
        };
        if geometry.vertex_count() == 0 {
            continue;
        }

        meshes.push(Rc::new(TileMesh::split_from(
            mesh,
            geometry,
            fid,
            oid,
            properties.clone(),
        )));
    }

    meshes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Side;
    use crate::scene::TileId;
    use crate::test_support::feature_mesh;
    use glam::Mat4;

    #[test]
    fn splits_every_feature_with_the_oid() {
        // Features 0 and 2 both belong to oid 40.
        let mesh = feature_mesh(
            TileId(3),
            &[0, 0, 0, 1, 1, 1, 2, 2, 2, 2, 2, 2],
            &[Some(40), Some(41), Some(40)],
        )
        .with_transform(Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)));

        let split = split_mesh_by_oid(&mesh, Oid(40));
        assert_eq!(split.len(), 2);

        let first = &split[0];
        let origin = first.split.as_ref().unwrap();
        assert_eq!(origin.feature_id, 0);
        assert_eq!(origin.source, mesh.id);
        assert_eq!(origin.oid, Oid(40));
        assert_eq!(first.name, "feature_0_40");
        assert_eq!(first.transform, mesh.transform);
        assert!(first.geometry.shares_vertex_buffers_with(&mesh.geometry));

        assert_eq!(split[1].geometry.index().unwrap(), &[6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn split_meshes_get_their_own_material() {
        let mesh = feature_mesh(TileId(3), &[0, 0, 0], &[Some(1)]);
        mesh.material.borrow_mut().side = Side::Double;

        let split = split_mesh_by_oid(&mesh, Oid(1));
        let m = split[0].material.borrow();
        assert_ne!(m.id(), mesh.material.borrow().id());
        assert!(!m.is_filtered());
        assert_eq!(m.side, Side::Double);
    }

    #[test]
    fn bad_rows_do_not_abort_siblings() {
        // Feature 1 is out of the table's range; feature 2 still splits.
        let mesh = feature_mesh(TileId(3), &[0, 0, 0, 9, 9, 9, 2, 2, 2], &[Some(5), Some(6), Some(5)]);
        let split = split_mesh_by_oid(&mesh, Oid(5));
        let fids: Vec<u32> = split.iter().map(|m| m.split.as_ref().unwrap().feature_id).collect();
        assert_eq!(fids, vec![0, 2]);
    }

    #[test]
    fn unknown_oid_yields_nothing() {
        let mesh = feature_mesh(TileId(3), &[0, 0, 0], &[Some(1)]);
        assert!(split_mesh_by_oid(&mesh, Oid(2)).is_empty());
    }
}
