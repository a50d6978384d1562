//! # swcload - SWC neuron tracing ingestion, storage and export
//!
//! swcload decodes SWC morphology files, validates their topology, stores
//! tracings and their nodes atomically in SQLite, and re-exports stored
//! tracings as canonical SWC text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ SWC file │──▶│   Parser   │──▶│ Validation │──▶│  Ingestor  │──▶│ SQLite store │
//! │ (chunks) │   │ (auto-enc) │   │ (topology) │   │ (registry) │   │ (1 tx/write) │
//! └──────────┘   └────────────┘   └────────────┘   └─────┬──────┘   └──────┬───────┘
//!                                                        │ post-commit     │
//!                                                        ▼                 ▼
//!                                                 transform service   Export (base64)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swcload::{Ingestor, SwcStore, TransformClient, UploadMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SwcStore::open(".swcload/swc.db")?;
//!     store.seed_if_required()?;
//!     let ingestor = Ingestor::new(Arc::new(store), TransformClient::disabled());
//!
//!     let metadata = UploadMetadata { annotator: "jdoe".into(), ..Default::default() };
//!     let outcome = ingestor.create_from_bytes(metadata, "cell.swc", b"1 1 0 0 0 1 -1\n").await?;
//!     println!("Stored {} nodes", outcome.node_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`models`] - Domain models (Tracing, TracingNode, StructureIdentifier)
//! - [`parser`] - SWC line decoding and row parsing
//! - [`validation`] - Topology checks and metadata schemas
//! - [`cache`] - Structure code registry
//! - [`store`] - SQLite persistence
//! - [`remote`] - Transform service client
//! - [`ingest`] - Ingestion orchestration
//! - [`export`] - SWC export encoding
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Caching
pub mod cache;

// Persistence
pub mod store;

// Remote transform service
pub mod remote;

// Pipeline
pub mod export;
pub mod ingest;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    DecodeError, PipelineError, PipelineResult, RemoteError, ServerError, StorageError,
    TopologyError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    StandardStructure, StructureIdentifier, Tracing, TracingNode, TracingPage, TracingQuery,
    TracingStructure, TracingUpdate, UploadMetadata,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    detect_encoding, parse_bytes, parse_file, parse_reader, ParseResult, ParsedRow, SwcStreamParser,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_topology, validate_tracing_update, validate_upload_metadata};

// =============================================================================
// Re-exports - Storage, registry, remote
// =============================================================================

pub use cache::StructureRegistry;
pub use config::{ServiceConfig, TransformServiceConfig};
pub use remote::TransformClient;
pub use store::SwcStore;

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use export::{encode_swc, SwcExport};
pub use ingest::{DeleteOutcome, IngestOutcome, Ingestor, TransformSubmission, TransformedCount};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
