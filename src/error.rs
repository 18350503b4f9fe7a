//! Error taxonomy shared by every subsystem.

use crate::store::StoreError;
use crate::umf::route::RouteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HydraError {
    /// Malformed or incomplete configuration. Fatal to initialization.
    #[error("config error: {0}")]
    Config(String),

    /// The `to` address could not be routed.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Envelope is missing `from`, `to` or `body`.
    #[error("invalid message")]
    InvalidMessage,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("service {0} is already registered")]
    AlreadyRegistered(String),

    #[error("service {0} is not registered")]
    NotRegistered(String),

    /// No live instance of the target service was found.
    #[error("unavailable {0} instances")]
    ServiceUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HydraError>;
