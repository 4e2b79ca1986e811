use std::io;

use thiserror::Error;

use crate::services::ServiceError;
use crate::store::StoreError;

/// Errors surfaced to the operator by provisioning, ACL sync and the runner.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("found {count} {kind}s named {name:?}; disambiguate manually")]
    AmbiguousTarget {
        kind: &'static str,
        name: String,
        count: usize,
    },
    #[error("invalid desired ACL rule: {0}")]
    Validation(#[from] ValidationError),
    #[error("external service error: {0}")]
    Service(#[from] ServiceError),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourierError {
    pub fn config<T: Into<String>>(message: T) -> Self {
        CourierError::Config(message.into())
    }
}

/// Rejections for malformed desired ACL rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("scope_type must be a non-empty string")]
    EmptyScopeType,
    #[error("unknown role {0:?}; expected reader, writer or owner")]
    UnknownRole(String),
    #[error("scope_value must be a string, got {0}")]
    NonStringScopeValue(String),
}
