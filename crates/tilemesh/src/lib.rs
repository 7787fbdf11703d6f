//! Tile mesh data model for feature-level operations on streamed 3D tiles.
//!
//! - [`Geometry`]: named `f32` vertex attributes held in `Arc<[f32]>` plus an
//!   optional `u32` triangle-list index buffer. Clones share vertex data.
//! - [`StructuralMetadata`]: property tables, one row per feature id. The
//!   `_oid` column links a feature to its application object.
//! - [`FeatureIndex`]: feature id → vertex indices, built in one pass over the
//!   `_feature_id_{n}` attribute.
//! - [`split_geometry`]: a single-feature geometry sharing the source vertex
//!   buffers and owning a filtered index buffer.

pub mod feature_index;
pub mod geometry;
pub mod metadata;
pub mod split;

pub use feature_index::{feature_id_from_f32, FeatureIndex};
pub use geometry::{feature_id_attribute_name, Geometry, VertexAttribute, NORMAL, POSITION};
pub use metadata::{
    FeatureIdSet, MeshFeatures, MetadataError, Oid, Properties, PropertyTable, StructuralMetadata,
    row_oid, OID_PROPERTY,
};
pub use split::split_geometry;
