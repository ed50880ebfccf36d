//! Domain error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid status '{0}': expected PASS, WARN or FAIL")]
    InvalidStatus(String),

    #[error("unknown skill(s): {unknown}. Available: {available}")]
    UnknownSkills { unknown: String, available: String },

    #[error("skill timed out after {0:?}")]
    SkillTimeout(Duration),

    #[error("skill panicked: {0}")]
    SkillPanicked(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("store I/O error at {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("incident {0} not found")]
    IncidentNotFound(u64),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
