//! Catalog loader/provider errors.

use thiserror::Error;

/// Specialized result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised loading or reloading the catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The file could not be read.
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file's YAML could not be parsed.
    #[error("failed to parse catalog file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// An unknown top-level field was present; unlike unknown per-spec
    /// fields, unknown top-level fields reject the whole file.
    #[error("unknown top-level field in catalog file: {0}")]
    UnknownTopLevelField(String),

    /// A structural invariant from [`mcpv_types::CatalogState::validate`]
    /// was violated.
    #[error("catalog validation failed: {0}")]
    Invalid(String),
}
