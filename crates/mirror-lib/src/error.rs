//! Error types for the cluster mirror

use crate::models::EntityKind;
use thiserror::Error;

/// Result type alias for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// A Kubernetes quantity string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix in quantity {0:?}")]
    UnknownSuffix(String),

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Failure converting a raw API object into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("{0} has no name")]
    MissingName(EntityKind),

    #[error("{kind} {name}: {source}")]
    Quantity {
        kind: EntityKind,
        name: String,
        #[source]
        source: QuantityError,
    },
}

/// Errors that can occur in the mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
