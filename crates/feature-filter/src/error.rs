use crate::collector::CollectorId;
use thiserror::Error;

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("cannot hide {requested} oids: the device allows at most {limit} hidden-feature uniforms")]
    CapacityOverflow { requested: usize, limit: usize },

    #[error("unknown mesh collector {0}")]
    UnknownCollector(CollectorId),

    #[error("material shader has no `{marker}` injection point")]
    ShaderInjection { marker: &'static str },

    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),
}
