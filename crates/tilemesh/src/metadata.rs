//! Feature metadata attached to tile meshes: feature-id sets and the property
//! tables they point into.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Column holding the application object id in a property table row.
pub const OID_PROPERTY: &str = "_oid";

/// Arbitrary per-feature attributes, one row of a property table.
pub type Properties = serde_json::Map<String, Value>;

/// Application-level object identifier. Several features, possibly spread over
/// many tiles, may belong to the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(pub u64);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Oid {
    fn from(v: u64) -> Self {
        Oid(v)
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("property table {0} does not exist")]
    UnknownTable(usize),

    #[error("feature {feature_id} is out of range for property table '{table}' ({rows} rows)")]
    FeatureOutOfRange {
        table: String,
        feature_id: u32,
        rows: usize,
    },

    #[error("feature {feature_id} has no property '{name}'")]
    MissingProperty { feature_id: u32, name: String },

    #[error("feature {feature_id} has an oid that is not a non-negative integer: {value}")]
    InvalidOid { feature_id: u32, value: String },
}

/// Links a feature id vertex attribute to the property table describing its features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureIdSet {
    /// Attribute number; the vertex attribute is `_feature_id_{attribute}`.
    pub attribute: u32,
    /// Index into [`StructuralMetadata::property_tables`].
    pub property_table: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshFeatures {
    pub feature_ids: Vec<FeatureIdSet>,
}

impl MeshFeatures {
    /// Only the first feature-id set takes part in hiding and splitting.
    pub fn primary(&self) -> Option<&FeatureIdSet> {
        self.feature_ids.first()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyTable {
    pub name: String,
    /// Row `i` describes feature id `i`.
    pub rows: Vec<Properties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralMetadata {
    pub property_tables: Vec<PropertyTable>,
}

impl StructuralMetadata {
    pub fn property_table_data(
        &self,
        table: usize,
        feature_id: u32,
    ) -> Result<&Properties, MetadataError> {
        let t = self
            .property_tables
            .get(table)
            .ok_or(MetadataError::UnknownTable(table))?;

        t.rows
            .get(feature_id as usize)
            .ok_or_else(|| MetadataError::FeatureOutOfRange {
                table: t.name.clone(),
                feature_id,
                rows: t.rows.len(),
            })
    }

    /// A single named property of a feature.
    pub fn property(&self, table: usize, feature_id: u32, name: &str) -> Result<&Value, MetadataError> {
        self.property_table_data(table, feature_id)?
            .get(name)
            .ok_or_else(|| MetadataError::MissingProperty {
                feature_id,
                name: name.to_string(),
            })
    }

    /// Object id of a feature. `Ok(None)` when the row has no `_oid` column.
    pub fn oid_of(&self, table: usize, feature_id: u32) -> Result<Option<Oid>, MetadataError> {
        row_oid(self.property_table_data(table, feature_id)?, feature_id)
    }
}

/// Reads `_oid` from a row already fetched for `feature_id`.
pub fn row_oid(row: &Properties, feature_id: u32) -> Result<Option<Oid>, MetadataError> {
    match row.get(OID_PROPERTY) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => oid_from_value(v)
            .map(Some)
            .ok_or_else(|| MetadataError::InvalidOid {
                feature_id,
                value: v.to_string(),
            }),
    }
}

/// Integers and integral floats are accepted; property tables commonly store
/// ids as doubles.
fn oid_from_value(v: &Value) -> Option<Oid> {
    let Value::Number(n) = v else {
        return None;
    };
    if let Some(u) = n.as_u64() {
        return Some(Oid(u));
    }

    let f = n.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(Oid(f as u64))
    } else {
        None
    }
}
