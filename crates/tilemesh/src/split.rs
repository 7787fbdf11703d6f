//! Carving single-feature geometries out of a shared tile geometry.

use crate::feature_index::FeatureIndex;
use crate::geometry::Geometry;
use std::collections::HashSet;

/// Builds a geometry containing only the triangles of `target`.
///
/// The result references every vertex attribute of `original` and owns a new
/// index buffer. A triangle is kept only when all three of its vertices carry
/// the target feature id, so no triangle straddles a feature boundary.
/// Returns `None` when the feature is absent or contributes no whole triangle.
pub fn split_geometry(original: &Geometry, index: &FeatureIndex, target: u32) -> Option<Geometry> {
    let members = index.get(target).filter(|m| !m.is_empty())?;

    let kept = filter_triangles(original, members);
    if kept.is_empty() {
        return None;
    }

    let mut geometry = Geometry::new();
    for (name, attribute) in original.attributes() {
        geometry.set_attribute(name, attribute.clone());
    }
    geometry.set_index(kept);

    Some(geometry)
}

fn filter_triangles(original: &Geometry, members: &HashSet<u32>) -> Vec<u32> {
    let mut kept = Vec::new();

    for [a, b, c] in original.triangles() {
        if members.contains(&a) && members.contains(&b) && members.contains(&c) {
            kept.extend_from_slice(&[a, b, c]);
        }
    }

    kept
}
