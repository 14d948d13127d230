//! Domain error types.
//!
//! Mirrors the split used throughout the reference codebase: callers that
//! must branch on a specific failure get a `thiserror` enum; orchestration
//! and binary-layer glue that only ever logs or surfaces a message uses
//! `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("invalid CIDR `{0}`")]
    InvalidCidr(String),

    #[error("subnet `{0}` is larger than the maximum supported /16")]
    SubnetTooLarge(String),

    #[error("invalid diagnostic target `{0}`")]
    InvalidTarget(String),

    #[error("too many concurrent diagnostics operations")]
    TooManyConcurrent,

    #[error("scan `{0}` not found")]
    ScanNotFound(String),

    #[error("device `{0}` not found")]
    DeviceNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;
