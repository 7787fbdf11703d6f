//! Feature id → vertex index buckets.

use crate::geometry::VertexAttribute;
use std::collections::{HashMap, HashSet};

/// Vertex indices grouped by the feature id they carry.
///
/// Every vertex of the source attribute lands in exactly one place: either the
/// bucket of its feature id, or [`FeatureIndex::invalid_vertices`] when the
/// value cannot be a feature id (negative or non-finite).
#[derive(Debug, Clone, Default)]
pub struct FeatureIndex {
    buckets: HashMap<u32, HashSet<u32>>,
    invalid: Vec<u32>,
    vertex_count: usize,
}

/// Feature ids travel as floats; round to the nearest id.
#[inline]
pub fn feature_id_from_f32(v: f32) -> Option<u32> {
    let r = v.round();
    if r.is_finite() && r >= 0.0 && r <= u32::MAX as f32 {
        Some(r as u32)
    } else {
        None
    }
}

impl FeatureIndex {
    pub fn build(attribute: &VertexAttribute) -> Self {
        Self::from_values(attribute.iter_x())
    }

    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Self {
        let mut index = FeatureIndex::default();

        for (vertex, value) in values.into_iter().enumerate() {
            let vertex = vertex as u32;
            match feature_id_from_f32(value) {
                Some(fid) => {
                    index.buckets.entry(fid).or_default().insert(vertex);
                }
                None => index.invalid.push(vertex),
            }
            index.vertex_count += 1;
        }

        index
    }

    pub fn get(&self, feature_id: u32) -> Option<&HashSet<u32>> {
        self.buckets.get(&feature_id)
    }

    #[inline]
    pub fn contains(&self, feature_id: u32, vertex: u32) -> bool {
        self.buckets
            .get(&feature_id)
            .is_some_and(|b| b.contains(&vertex))
    }

    /// Distinct feature ids, in no particular order.
    pub fn feature_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.buckets.keys().copied()
    }

    pub fn sorted_feature_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.buckets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of distinct feature ids.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of vertices the index was built from.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn invalid_vertices(&self) -> &[u32] {
        &self.invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_partition_all_vertices() {
        let ids = vec![0.0, 0.0, 1.0, 2.0, 1.0, 0.0, f32::NAN, 7.0, -3.0, 2.0];
        let index = FeatureIndex::from_values(ids.iter().copied());

        let mut seen = vec![0usize; ids.len()];
        for fid in index.feature_ids() {
            for &v in index.get(fid).unwrap() {
                seen[v as usize] += 1;
            }
        }
        for &v in index.invalid_vertices() {
            seen[v as usize] += 1;
        }

        assert!(seen.iter().all(|&n| n == 1), "every vertex in exactly one bucket: {seen:?}");
        assert_eq!(index.vertex_count(), ids.len());
        assert_eq!(index.sorted_feature_ids(), vec![0, 1, 2, 7]);
        assert_eq!(index.invalid_vertices(), &[6, 8]);
    }

    #[test]
    fn float_ids_round_to_nearest() {
        let index = FeatureIndex::from_values([2.9999, 3.0001, 0.4]);
        assert_eq!(index.get(3).map(|b| b.len()), Some(2));
        assert!(index.contains(0, 2));
    }

    #[test]
    fn empty_attribute_yields_empty_index() {
        let index = FeatureIndex::build(&VertexAttribute::scalar(Vec::<f32>::new()));
        assert!(index.is_empty());
        assert_eq!(index.vertex_count(), 0);
    }
}
