//! Per-OID hiding and splitting of streamed tile meshes.
//!
//! Hidden features stay in their vertex buffers; a fragment-shader filter
//! discards them against a per-mesh uniform array. Features can also be carved
//! out of their tile as standalone meshes sharing the original buffers.

pub mod cache;
pub mod capacity;
pub mod collector;
pub mod config;
pub mod error;
pub mod filter;
pub mod gpu;
pub mod material;
pub mod plugin;
pub mod resolver;
pub mod scene;
pub mod shader;
pub mod splitter;

#[cfg(test)]
mod test_support;

pub use cache::SplitMeshCache;
pub use capacity::{compute_capacity, MIN_CAPACITY};
pub use collector::{CollectorId, CollectorRegistry};
pub use config::{DuplicateOidPolicy, FilterConfig, DEFAULT_UNIFORM_LIMIT};
pub use error::{FilterError, Result};
pub use filter::VisibilityFilter;
pub use material::{Material, MaterialId, SharedMaterial, Side};
pub use plugin::{FeatureInfo, TilesFilterPlugin};
pub use resolver::{IdMap, OidResolver};
pub use scene::{MeshId, SplitOrigin, TileContent, TileId, TileMesh, TileScene};
pub use splitter::split_mesh_by_oid;
pub use tilemesh::Oid;
