//! Caller-facing error taxonomy.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::control::CommandError;
use crate::net::allocator::AllocError;
use crate::nginx::ProxyError;
use crate::store::StoreError;
use crate::wireguard::MeshError;

/// A user-correctable problem with one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const GENERIC_FAILURE: &str = "Operation failed, see server logs for details";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("mesh operation failed: {0}")]
    Mesh(#[source] MeshError),

    #[error("proxy operation failed: {0}")]
    Proxy(#[from] ProxyError),

    #[error("store operation failed: {0}")]
    Store(#[source] StoreError),

    #[error("command failed: {0}")]
    Command(#[from] CommandError),
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ControlError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ControlError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ControlError::Validation(_))
    }

    /// Text safe to hand to an API caller. Infrastructure detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ControlError::Validation(errors) => join(errors),
            ControlError::NotFound(entity) => format!("{} not found", entity),
            _ => GENERIC_FAILURE.to_string(),
        }
    }

    /// Per-field detail for validation failures, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ControlError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl From<StoreError> for ControlError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { field, message } => {
                ControlError::Validation(vec![FieldError { field, message }])
            }
            StoreError::NotFound { entity, .. } => ControlError::NotFound(entity),
            other => ControlError::Store(other),
        }
    }
}

impl From<AllocError> for ControlError {
    fn from(e: AllocError) -> Self {
        let field = match e {
            AllocError::NoAddressAvailable(_) => "address",
            _ => "port",
        };
        ControlError::validation(field, e.to_string())
    }
}

impl From<MeshError> for ControlError {
    fn from(e: MeshError) -> Self {
        match e {
            MeshError::Store(e) => e.into(),
            MeshError::Alloc(e) => e.into(),
            other => ControlError::Mesh(other),
        }
    }
}
