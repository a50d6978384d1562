//! Error types for the SWC ingestion and export pipeline.
//!
//! One enum per layer:
//!
//! - [`DecodeError`] - reading an SWC byte stream
//! - [`TopologyError`] - tracing-level checks over a parsed row set
//! - [`StorageError`] - SQLite persistence
//! - [`RemoteError`] - the remote transform service
//! - [`PipelineError`] - top-level ingestion/export orchestration
//! - [`ServerError`] - HTTP surface
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Malformed data lines are not errors: the parser drops them and records
//! the reason in [`crate::parser::ParseResult::skipped`].

use thiserror::Error;

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors while reading an SWC stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to read from the underlying stream.
    #[error("Failed to read SWC stream: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to receive the next chunk of an upload.
    #[error("Failed to receive upload chunk: {0}")]
    Upload(String),
}

// =============================================================================
// Topology Errors
// =============================================================================

/// Tracing-level invariants checked before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// No data rows survived parsing.
    #[error("Tracing contains no identifiable node rows")]
    EmptyTracing,

    /// No row has parent number -1.
    #[error("Tracing has no root (soma) node")]
    NoRoot,

    /// More than one row has parent number -1.
    #[error("Tracing has {0} root (soma) nodes, expected exactly one")]
    MultipleRoots(usize),
}

impl TopologyError {
    /// Stable name used in API error payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EmptyTracing => "EmptyTracingError",
            Self::NoRoot => "NoRootError",
            Self::MultipleRoots(_) => "MultipleRootsError",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors from the SQLite store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite failure; the enclosing transaction has been rolled back.
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// IO error while preparing the database location.
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Invalid input rejected before reaching SQLite.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Database connection is poisoned")]
    Poisoned,

    /// A blocking storage task failed to complete.
    #[error("Storage task failed: {0}")]
    Task(String),
}

// =============================================================================
// Remote Transform Service Errors
// =============================================================================

/// Errors from the remote transform (registration) service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Notifications are turned off by configuration.
    #[error("Transform service notifications are disabled")]
    Disabled,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Response was not a valid GraphQL envelope.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Service answered with GraphQL errors.
    #[error("Transform service error: {0}")]
    ServiceError(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level ingestion and export errors.
///
/// Every mutation entry point of [`crate::ingest::Ingestor`] returns either
/// the created/updated entity or one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the upload failed.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The parsed tracing violates a topology invariant.
    #[error("{0}")]
    Topology(#[from] TopologyError),

    /// A node carries a structure code with no catalog entry.
    #[error("Sample {sample_number} has unknown structure code {code}")]
    StructureResolution { sample_number: i32, code: i32 },

    /// A stored node references a structure identifier missing from the registry.
    #[error("Unknown structure identifier: {0}")]
    UnknownStructureIdentifier(String),

    /// Transaction failure; nothing was written.
    #[error("Persistence error: {0}")]
    Persistence(StorageError),

    /// Update/delete/replace against a nonexistent tracing.
    #[error("Tracing not found: {0}")]
    NotFound(String),

    /// Request metadata failed schema validation.
    #[error("Invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    /// Writing the SWC text failed.
    #[error("Encoding error: {0}")]
    Encode(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id, .. } => PipelineError::NotFound(id),
            StorageError::InvalidInput(message) => PipelineError::InvalidRequest(vec![message]),
            other => PipelineError::Persistence(other),
        }
    }
}

impl PipelineError {
    /// Stable name used in API error payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DecodeError",
            Self::Topology(e) => e.name(),
            Self::StructureResolution { .. } => "StructureResolutionError",
            Self::UnknownStructureIdentifier(_) => "StructureResolutionError",
            Self::Persistence(_) => "PersistenceError",
            Self::NotFound(_) => "NotFoundError",
            Self::InvalidRequest(_) => "InvalidRequestError",
            Self::Encode(_) => "EncodeError",
        }
    }

    /// True for failures caused by the submitted content rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::Topology(_)
                | Self::StructureResolution { .. }
                | Self::NotFound(_)
                | Self::InvalidRequest(_)
        )
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for stream decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for remote transform service calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // TopologyError -> PipelineError
        let pipeline_err: PipelineError = TopologyError::NoRoot.into();
        assert_eq!(pipeline_err.name(), "NoRootError");
        assert!(pipeline_err.to_string().contains("no root"));

        // StorageError::NotFound -> PipelineError::NotFound
        let storage_err = StorageError::NotFound {
            entity: "tracing",
            id: "abc".into(),
        };
        let pipeline_err: PipelineError = storage_err.into();
        assert!(matches!(pipeline_err, PipelineError::NotFound(ref id) if id == "abc"));
    }

    #[test]
    fn test_sql_errors_become_persistence() {
        let storage_err = StorageError::Sql(rusqlite::Error::QueryReturnedNoRows);
        let pipeline_err: PipelineError = storage_err.into();
        assert_eq!(pipeline_err.name(), "PersistenceError");
        assert!(!pipeline_err.is_client_error());
    }

    #[test]
    fn test_structure_resolution_format() {
        let err = PipelineError::StructureResolution {
            sample_number: 12,
            code: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("42"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_multiple_roots_format() {
        let err = TopologyError::MultipleRoots(3);
        assert!(err.to_string().contains('3'));
        assert_eq!(err.name(), "MultipleRootsError");
    }
}
