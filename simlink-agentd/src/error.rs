use crate::domain::world::InventoryError;
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Failure surfaced by any core operation.
///
/// Every variant carries a human-readable description and maps onto exactly
/// one wire status code in the gRPC adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse failure taxonomy used for logging, metrics and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Validation,
    Auth,
    Capacity,
    EngineUnavailable,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Auth => "auth",
            ErrorClass::Capacity => "capacity",
            ErrorClass::EngineUnavailable => "engine_unavailable",
            ErrorClass::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl CoreError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidArgument(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        CoreError::Unavailable(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        CoreError::Internal(reason.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::InvalidArgument(_)
            | CoreError::AlreadyExists(_)
            | CoreError::NotFound(_)
            | CoreError::Unimplemented(_) => ErrorClass::Validation,
            CoreError::PermissionDenied(_) | CoreError::Unauthenticated(_) => ErrorClass::Auth,
            CoreError::ResourceExhausted(_) | CoreError::RateLimitExceeded(_) => {
                ErrorClass::Capacity
            }
            CoreError::Unavailable(_) => ErrorClass::EngineUnavailable,
            CoreError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Capacity and availability failures clear up on their own; a caller
    /// may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Capacity | ErrorClass::EngineUnavailable
        )
    }

    /// Builds an `Internal` error from a payload captured by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "operation panicked".to_string()
        };
        CoreError::Internal(format!("engine operation faulted: {message}"))
    }
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::EmptySlot(_) => CoreError::NotFound(err.to_string()),
            InventoryError::NoRoom(_) => CoreError::ResourceExhausted(err.to_string()),
            InventoryError::InvalidSlot(_)
            | InventoryError::SameSlot
            | InventoryError::TargetFull(_)
            | InventoryError::MissingIngredient(_) => CoreError::InvalidArgument(err.to_string()),
        }
    }
}
