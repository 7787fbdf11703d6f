//! JSON summary printed at the end of a run.

use crate::config::PickTarget;
use feature_filter::FeatureInfo;
use serde::Serialize;
use tilemesh::Properties;

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub hidden: Vec<u64>,
    pub feature_id_count: usize,
    pub recompiled_materials: usize,
    /// Tile meshes with at least one hidden feature.
    pub meshes: Vec<MeshHidden>,
    pub queries: Vec<QueryReport>,
    pub picks: Vec<PickReport>,
    pub collectors: Vec<CollectorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuReport>,
}

#[derive(Debug, Serialize)]
pub struct MeshHidden {
    pub tile: u64,
    pub mesh: String,
    pub hidden_feature_ids: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub oid: u64,
    pub tile_meshes: usize,
    pub splits: Vec<SplitReport>,
}

#[derive(Debug, Serialize)]
pub struct SplitReport {
    pub name: String,
    pub tile: u64,
    pub feature_id: u32,
    pub triangles: usize,
    pub properties: Properties,
}

#[derive(Debug, Serialize)]
pub struct PickReport {
    pub target: String,
    pub feature_id: Option<u32>,
    pub oid: Option<u64>,
    pub hidden: bool,
    pub properties: Option<Properties>,
}

impl PickReport {
    pub fn new(target: PickTarget, info: Option<FeatureInfo>) -> Self {
        let target = format!("{}/{}/{}", target.tile, target.mesh, target.triangle);
        match info {
            Some(info) => Self {
                target,
                feature_id: Some(info.feature_id),
                oid: info.oid.map(|o| o.0),
                hidden: info.hidden,
                properties: Some(info.properties),
            },
            None => Self {
                target,
                feature_id: None,
                oid: None,
                hidden: false,
                properties: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CollectorReport {
    pub oid: u64,
    pub meshes: usize,
    /// Notifications received after creation.
    pub changes: usize,
}

#[derive(Debug, Serialize)]
pub struct GpuReport {
    pub adapter: String,
    pub uniform_vector_limit: usize,
    pub pipelines: usize,
    pub pipeline_builds: usize,
    pub vertex_buffers: usize,
    pub covered_pixels: usize,
    pub covered_pixels_filtered: usize,
}
