//! Client registry errors.

use thiserror::Error;

/// Specialized result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by the client registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// `tags` and `explicitServer` were both supplied on registration.
    #[error("explicitServer and tags are mutually exclusive")]
    MutuallyExclusiveSelectors,

    /// `heartbeat`/`unregister` named a client that was never registered.
    #[error("unknown client: {0}")]
    UnknownClient(String),
}
