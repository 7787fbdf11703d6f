use crate::capacity::MIN_CAPACITY;
use crate::error::{FilterError, Result};
use serde::{Deserialize, Serialize};

/// Uniform-vector budget assumed until the device reports its own.
pub const DEFAULT_UNIFORM_LIMIT: usize = 1024;

/// What to do when several features of one tile mesh carry the same oid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateOidPolicy {
    /// Lowest feature id wins.
    #[default]
    FirstSeenWins,
    /// The oid is left out of the mesh's id map and logged.
    Reject,
}

/// Tunables for the feature filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Baseline length of the compiled hidden-feature array.
    pub min_capacity: usize,
    /// Absolute tolerance when comparing interpolated feature ids.
    pub tolerance: f32,
    /// Value written into unused uniform slots. Must never match a real feature id.
    pub sentinel: f32,
    pub duplicate_oids: DuplicateOidPolicy,
    /// Overrides the uniform-vector budget reported by the device.
    pub uniform_limit: Option<usize>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_capacity: MIN_CAPACITY,
            tolerance: 0.001,
            sentinel: -1.0,
            duplicate_oids: DuplicateOidPolicy::FirstSeenWins,
            uniform_limit: None,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance < 0.5) {
            return Err(FilterError::InvalidConfig(format!(
                "tolerance must be in (0, 0.5), got {}",
                self.tolerance
            )));
        }

        // Feature ids are >= 0; the sentinel has to stay out of their tolerance band.
        if !(self.sentinel.is_finite() && self.sentinel <= -self.tolerance * 2.0) {
            return Err(FilterError::InvalidConfig(format!(
                "sentinel {} collides with valid feature ids",
                self.sentinel
            )));
        }

        if self.min_capacity == 0 {
            return Err(FilterError::InvalidConfig("min_capacity must be > 0".into()));
        }

        Ok(())
    }

    /// Budget to size against: the override if set, otherwise what the device reports.
    pub fn effective_uniform_limit(&self, device_limit: usize) -> usize {
        self.uniform_limit.unwrap_or(device_limit)
    }
}
