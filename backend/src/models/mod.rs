//! Domain models for SWC tracing storage.
//!
//! - [`StandardStructure`] - the fixed SWC structure codes (0-6)
//! - [`StructureIdentifier`] - catalog entry mapping a code to a storage key
//! - [`TracingStructure`] - axon/dendrite classification of a whole tracing
//! - [`Tracing`] - tracing header record
//! - [`TracingNode`] - one persisted skeleton node
//!
//! API-facing types serialize in camelCase.

use serde::{Deserialize, Serialize};

/// Parent number marking a root (soma) node.
pub const ROOT_PARENT_NUMBER: i32 = -1;

// =============================================================================
// Structure Codes
// =============================================================================

/// The seeded, immutable SWC structure codes.
///
/// Catalogs may hold additional mutable codes; those have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardStructure {
    /// 0 - undefined / path
    Path,
    /// 1 - soma
    Soma,
    /// 2 - axon
    Axon,
    /// 3 - (basal) dendrite
    BasalDendrite,
    /// 4 - apical dendrite
    ApicalDendrite,
    /// 5 - fork (branch) point
    ForkPoint,
    /// 6 - end point
    EndPoint,
}

impl StandardStructure {
    pub const ALL: [StandardStructure; 7] = [
        Self::Path,
        Self::Soma,
        Self::Axon,
        Self::BasalDendrite,
        Self::ApicalDendrite,
        Self::ForkPoint,
        Self::EndPoint,
    ];

    /// Parse from an integer SWC code.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Path),
            1 => Some(Self::Soma),
            2 => Some(Self::Axon),
            3 => Some(Self::BasalDendrite),
            4 => Some(Self::ApicalDendrite),
            5 => Some(Self::ForkPoint),
            6 => Some(Self::EndPoint),
            _ => None,
        }
    }

    /// Integer SWC code.
    pub fn value(&self) -> i32 {
        match self {
            Self::Path => 0,
            Self::Soma => 1,
            Self::Axon => 2,
            Self::BasalDendrite => 3,
            Self::ApicalDendrite => 4,
            Self::ForkPoint => 5,
            Self::EndPoint => 6,
        }
    }

    /// Catalog display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Soma => "soma",
            Self::Axon => "axon",
            Self::BasalDendrite => "(basal) dendrite",
            Self::ApicalDendrite => "apical dendrite",
            Self::ForkPoint => "branch point",
            Self::EndPoint => "end point",
        }
    }

    /// Name used by the SWC format itself.
    pub fn swc_name(&self) -> &'static str {
        match self {
            Self::Path => "undefined",
            Self::ForkPoint => "fork point",
            other => other.name(),
        }
    }

    /// Fixed catalog key of the seeded entry.
    pub fn seed_id(&self) -> &'static str {
        match self {
            Self::Path => "9b2cf056-1fba-468f-a877-04169dd9f708",
            Self::Soma => "6afcafa5-ec7f-4899-8941-3e1f812682ce",
            Self::Axon => "a1df739e-f4a8-4b88-9a25-2cd6b9a7563c",
            Self::BasalDendrite => "d8eb210f-65fe-4983-bdcb-e34de5ca2e13",
            Self::ApicalDendrite => "a3dec6a1-7484-45a7-bc05-cf3d6014c44d",
            Self::ForkPoint => "2a8efa78-1067-4ce8-8e4f-cfcf9cf7d315",
            Self::EndPoint => "c37953e1-a1e9-4b9a-847e-08d9566ced65",
        }
    }
}

/// Code every root node is coerced to.
pub const SOMA_STRUCTURE_CODE: i32 = 1;

// =============================================================================
// Catalog Entries
// =============================================================================

/// Catalog entry translating an SWC structure code to a storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureIdentifier {
    pub id: String,
    pub name: String,
    pub swc_name: String,
    pub value: i32,
    pub mutable: bool,
}

impl From<StandardStructure> for StructureIdentifier {
    fn from(structure: StandardStructure) -> Self {
        Self {
            id: structure.seed_id().to_string(),
            name: structure.name().to_string(),
            swc_name: structure.swc_name().to_string(),
            value: structure.value(),
            mutable: false,
        }
    }
}

/// Immutable entries written when the catalog is empty.
pub fn seed_structure_identifiers() -> Vec<StructureIdentifier> {
    StandardStructure::ALL.iter().copied().map(Into::into).collect()
}

/// Whole-tracing classification (axon vs. dendrite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingStructure {
    pub id: String,
    pub name: String,
    pub value: i32,
}

/// Tracing structures written when the catalog is empty.
pub fn seed_tracing_structures() -> Vec<TracingStructure> {
    vec![
        TracingStructure {
            id: "68e76074-1777-42b6-bbf9-93a6a5f02fa4".to_string(),
            name: "axon".to_string(),
            value: 1,
        },
        TracingStructure {
            id: "aef2ba31-8f9b-4a47-9de0-58dab1cc06a8".to_string(),
            name: "dendrite".to_string(),
            value: 2,
        },
    ]
}

// =============================================================================
// Tracings
// =============================================================================

/// Tracing header record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracing {
    pub id: String,
    /// Opaque reference into the external neuron catalog.
    pub neuron_id: Option<String>,
    pub filename: String,
    pub annotator: String,
    /// Comment lines of the source file, plus root coercion notes.
    pub file_comments: String,
    pub offset_x: f64,
    pub offset_y: f64,
    pub offset_z: f64,
    pub tracing_structure_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for a tracing header.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTracing {
    pub neuron_id: Option<String>,
    pub filename: String,
    pub annotator: String,
    pub file_comments: String,
    pub offset: (f64, f64, f64),
    pub tracing_structure_id: Option<String>,
}

/// Request-level metadata accompanying an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub annotator: String,
    #[serde(default)]
    pub neuron_id: Option<String>,
    #[serde(default)]
    pub tracing_structure_id: Option<String>,
}

/// Metadata-only update of a tracing header. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingUpdate {
    pub id: String,
    #[serde(default)]
    pub annotator: Option<String>,
    #[serde(default)]
    pub neuron_id: Option<String>,
    #[serde(default)]
    pub tracing_structure_id: Option<String>,
}

impl TracingUpdate {
    pub fn is_empty(&self) -> bool {
        self.annotator.is_none() && self.neuron_id.is_none() && self.tracing_structure_id.is_none()
    }
}

/// Persisted skeleton node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingNode {
    pub id: String,
    pub tracing_id: String,
    pub sample_number: i32,
    pub parent_number: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub structure_identifier_id: String,
}

/// Insert payload for a node; the owning tracing id is supplied by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub sample_number: i32,
    pub parent_number: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub structure_identifier_id: String,
}

// =============================================================================
// Queries
// =============================================================================

/// Filter and window for tracing listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingQuery {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub neuron_ids: Option<Vec<String>>,
    #[serde(default)]
    pub tracing_structure_id: Option<String>,
}

/// One window of a tracing listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingPage {
    pub offset: usize,
    pub limit: Option<usize>,
    /// All tracings in the store.
    pub total_count: usize,
    /// Tracings matching the filter, before windowing.
    pub match_count: usize,
    pub tracings: Vec<Tracing>,
}
