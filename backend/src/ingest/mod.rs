//! Ingestion orchestrator.
//!
//! ```text
//! bytes ─▶ parse ─▶ validate topology ─▶ resolve codes ─▶ transaction ─▶ notify
//!                                                       (tracing+nodes)   (best-effort)
//! ```
//!
//! Every check runs before the first write. Database work runs on the
//! blocking pool, so a dropped request future cannot cut a transaction
//! short. The transform notification happens after commit and its failure
//! is reported in the outcome, never rolled back.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::api::logs::{log_error, log_info, log_success, log_success_indent, log_warning};
use crate::cache::StructureRegistry;
use crate::error::{PipelineError, PipelineResult, StorageError};
use crate::export::{export_text, export_tracing, SwcExport};
use crate::models::{
    NewNode, NewTracing, StructureIdentifier, Tracing, TracingNode, TracingPage, TracingQuery,
    TracingStructure, TracingUpdate, UploadMetadata,
};
use crate::parser::{parse_bytes, parse_file, ParseResult, SkippedLine};
use crate::remote::TransformClient;
use crate::store::{StoreTx, SwcStore};
use crate::validation::{validate_topology, validate_tracing_update, validate_upload_metadata};

/// Result of the post-commit transform notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSubmission {
    pub submitted: bool,
    pub error: Option<String>,
}

impl TransformSubmission {
    fn ok() -> Self {
        Self {
            submitted: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            submitted: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a successful create or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub tracing: Tracing,
    pub node_count: usize,
    pub soma_count: usize,
    pub forced_soma_count: usize,
    pub skipped: Vec<SkippedLine>,
    pub encoding: String,
    pub transform_submission: TransformSubmission,
}

/// Outcome of one tracing deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub id: String,
    pub deleted: bool,
    pub node_count: usize,
    pub error: Option<String>,
    pub transform_submission: Option<TransformSubmission>,
}

/// Transformed tracings known to the transform service for one SWC tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedCount {
    pub count: usize,
    pub error: Option<String>,
}

/// Parsed content ready for a transaction.
struct PreparedTracing {
    parsed: ParseResult,
    nodes: Vec<NewNode>,
}

/// Resolve every row's structure code to a catalog key.
fn resolve_nodes(parsed: &ParseResult, registry: &StructureRegistry) -> PipelineResult<Vec<NewNode>> {
    parsed
        .rows
        .iter()
        .map(|row| {
            let id = registry.id_for_value(row.structure_code).ok_or(
                PipelineError::StructureResolution {
                    sample_number: row.sample_number,
                    code: row.structure_code,
                },
            )?;
            Ok(NewNode {
                sample_number: row.sample_number,
                parent_number: row.parent_number,
                x: row.x,
                y: row.y,
                z: row.z,
                radius: row.radius,
                structure_identifier_id: id.to_string(),
            })
        })
        .collect()
}

fn check_tracing_structure(tx: &StoreTx<'_>, id: Option<&String>) -> PipelineResult<()> {
    if let Some(id) = id {
        if !tx.tracing_structures()?.iter().any(|s| &s.id == id) {
            return Err(StorageError::InvalidInput(format!("unknown tracing structure: {}", id)).into());
        }
    }
    Ok(())
}

/// Owns the store, the structure registry and the transform client.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: Arc<SwcStore>,
    registry: Arc<StructureRegistry>,
    remote: TransformClient,
}

impl Ingestor {
    pub fn new(store: Arc<SwcStore>, remote: TransformClient) -> Self {
        Self {
            store,
            registry: Arc::new(StructureRegistry::new()),
            remote,
        }
    }

    pub fn store(&self) -> &Arc<SwcStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<StructureRegistry> {
        &self.registry
    }

    pub fn remote(&self) -> &TransformClient {
        &self.remote
    }

    /// Run `f` against the store on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> PipelineResult<T>
    where
        F: FnOnce(&SwcStore, &StructureRegistry) -> PipelineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || f(&store, &registry))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Validate topology and resolve structure codes. No writes.
    fn prepare(parsed: ParseResult, registry: &StructureRegistry, store: &SwcStore) -> PipelineResult<PreparedTracing> {
        validate_topology(&parsed)?;
        registry.load_from(store)?;
        let nodes = resolve_nodes(&parsed, registry)?;
        Ok(PreparedTracing { parsed, nodes })
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Ingest a tracing from an in-memory upload.
    pub async fn create_from_bytes(
        &self,
        metadata: UploadMetadata,
        filename: &str,
        bytes: &[u8],
    ) -> PipelineResult<IngestOutcome> {
        self.create_tracing(metadata, filename, parse_bytes(bytes)).await
    }

    /// Ingest a tracing from a file on disk.
    pub async fn create_from_file(
        &self,
        metadata: UploadMetadata,
        path: &Path,
    ) -> PipelineResult<IngestOutcome> {
        let parsed = parse_file(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.create_tracing(metadata, &filename, parsed).await
    }

    /// Persist an already parsed tracing, then notify the transform service.
    pub async fn create_tracing(
        &self,
        metadata: UploadMetadata,
        filename: &str,
        parsed: ParseResult,
    ) -> PipelineResult<IngestOutcome> {
        log_info(format!("📄 Ingesting {}", filename));
        log_parse_summary(&parsed);

        validate_upload_metadata(&metadata).map_err(PipelineError::InvalidRequest)?;

        let filename = filename.to_string();
        let (tracing, prepared) = self
            .blocking(move |store, registry| {
                let prepared = Self::prepare(parsed, registry, store)?;
                let header = NewTracing {
                    neuron_id: metadata.neuron_id.clone(),
                    filename,
                    annotator: metadata.annotator.clone(),
                    file_comments: prepared.parsed.comments.clone(),
                    offset: prepared.parsed.janelia_offset.into(),
                    tracing_structure_id: metadata.tracing_structure_id.clone(),
                };
                let tracing = store.transaction(|tx| -> PipelineResult<Tracing> {
                    check_tracing_structure(tx, header.tracing_structure_id.as_ref())?;
                    let tracing = tx.create_tracing(&header)?;
                    tx.bulk_create_nodes(&tracing.id, &prepared.nodes)?;
                    Ok(tracing)
                })?;
                Ok((tracing, prepared))
            })
            .await
            .inspect_err(|e| log_error(format!("Ingestion failed: {}", e)))?;

        log_success(format!(
            "Stored tracing {} with {} nodes",
            tracing.id,
            prepared.nodes.len()
        ));

        let transform_submission = self.submit_transform(&tracing.id).await;
        Ok(outcome(tracing, prepared, transform_submission))
    }

    // -------------------------------------------------------------------------
    // Replace
    // -------------------------------------------------------------------------

    /// Replace the node set of an existing tracing from an in-memory upload.
    pub async fn replace_from_bytes(
        &self,
        tracing_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> PipelineResult<IngestOutcome> {
        self.replace_nodes(tracing_id, filename, parse_bytes(bytes)).await
    }

    /// Replace the node set and file-derived header fields of a tracing.
    ///
    /// Old nodes are deleted and new nodes inserted in one transaction.
    pub async fn replace_nodes(
        &self,
        tracing_id: &str,
        filename: &str,
        parsed: ParseResult,
    ) -> PipelineResult<IngestOutcome> {
        log_info(format!("🔁 Replacing nodes of {} from {}", tracing_id, filename));
        log_parse_summary(&parsed);

        let id = tracing_id.to_string();
        let filename = filename.to_string();
        let (tracing, prepared) = self
            .blocking(move |store, registry| {
                let prepared = Self::prepare(parsed, registry, store)?;
                let offset: (f64, f64, f64) = prepared.parsed.janelia_offset.into();
                let tracing = store.transaction(|tx| -> PipelineResult<Tracing> {
                    tx.require_tracing(&id)?;
                    let removed = tx.delete_nodes(&id)?;
                    let tracing =
                        tx.update_tracing_contents(&id, &filename, &prepared.parsed.comments, offset)?;
                    tx.bulk_create_nodes(&id, &prepared.nodes)?;
                    log_success_indent(format!("Removed {} previous nodes", removed), 1);
                    Ok(tracing)
                })?;
                Ok((tracing, prepared))
            })
            .await
            .inspect_err(|e| log_error(format!("Replacement failed: {}", e)))?;

        log_success(format!(
            "Replaced nodes of {} with {} nodes",
            tracing.id,
            prepared.nodes.len()
        ));

        let transform_submission = self.submit_transform(&tracing.id).await;
        Ok(outcome(tracing, prepared, transform_submission))
    }

    async fn submit_transform(&self, id: &str) -> TransformSubmission {
        if !self.remote.is_enabled() {
            log_info("Transform notification disabled");
            return TransformSubmission::failed("transform notifications are disabled");
        }
        match self.remote.apply_transform(id).await {
            Ok(_) => {
                log_success(format!("Transform requested for {}", id));
                TransformSubmission::ok()
            }
            Err(e) => {
                log_warning(format!("Transform request for {} failed: {}", id, e));
                TransformSubmission::failed(e.to_string())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Metadata update
    // -------------------------------------------------------------------------

    /// Update annotator, neuron id and/or tracing structure of a tracing.
    pub async fn update_tracing(&self, update: TracingUpdate) -> PipelineResult<Tracing> {
        validate_tracing_update(&update).map_err(PipelineError::InvalidRequest)?;

        self.blocking(move |store, _| {
            store.transaction(|tx| -> PipelineResult<Tracing> {
                if update.is_empty() {
                    return Ok(tx.require_tracing(&update.id)?);
                }
                check_tracing_structure(tx, update.tracing_structure_id.as_ref())?;
                Ok(tx.update_tracing_metadata(&update)?)
            })
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Delete one tracing and its nodes, then ask the transform service to
    /// drop derived tracings.
    pub async fn delete_tracing(&self, id: &str) -> PipelineResult<DeleteOutcome> {
        let tracing_id = id.to_string();
        let node_count = self
            .blocking(move |store, _| Ok(store.transaction(|tx| tx.delete_tracing(&tracing_id))?))
            .await?;

        log_success(format!("Deleted tracing {} ({} nodes)", id, node_count));

        let submission = if self.remote.is_enabled() {
            match self.remote.delete_tracings_for_swc(&[id.to_string()]).await {
                Ok(()) => TransformSubmission::ok(),
                Err(e) => {
                    log_warning(format!("Remote delete for {} failed: {}", id, e));
                    TransformSubmission::failed(e.to_string())
                }
            }
        } else {
            TransformSubmission::failed("transform notifications are disabled")
        };

        Ok(DeleteOutcome {
            id: id.to_string(),
            deleted: true,
            node_count,
            error: None,
            transform_submission: Some(submission),
        })
    }

    /// Delete several tracings independently; each gets its own outcome.
    pub async fn delete_tracings(&self, ids: &[String]) -> Vec<DeleteOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.delete_tracing(id).await {
                Ok(outcome) => outcome,
                Err(e) => DeleteOutcome {
                    id: id.clone(),
                    deleted: false,
                    node_count: 0,
                    error: Some(e.to_string()),
                    transform_submission: None,
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Delete every tracing attached to any of the given neurons.
    pub async fn delete_tracings_for_neurons(
        &self,
        neuron_ids: &[String],
    ) -> PipelineResult<Vec<DeleteOutcome>> {
        let neuron_ids = neuron_ids.to_vec();
        let ids = self
            .blocking(move |store, _| Ok(store.tracing_ids_for_neurons(&neuron_ids)?))
            .await?;
        Ok(self.delete_tracings(&ids).await)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub async fn tracings(&self, query: TracingQuery) -> PipelineResult<TracingPage> {
        self.blocking(move |store, _| Ok(store.list_tracings(&query)?))
            .await
    }

    pub async fn tracing(&self, id: &str) -> PipelineResult<Tracing> {
        let id = id.to_string();
        self.blocking(move |store, _| {
            store
                .find_tracing(&id)?
                .ok_or(PipelineError::NotFound(id))
        })
        .await
    }

    /// Nodes of a tracing in ascending sample order.
    pub async fn tracing_nodes(&self, id: &str) -> PipelineResult<Vec<TracingNode>> {
        let id = id.to_string();
        self.blocking(move |store, _| {
            Ok(store.transaction(|tx| -> PipelineResult<_> {
                tx.require_tracing(&id)?;
                Ok(tx.find_nodes_ordered(&id)?)
            })?)
        })
        .await
    }

    pub async fn node_count(&self, id: &str) -> PipelineResult<usize> {
        let id = id.to_string();
        self.blocking(move |store, _| Ok(store.node_count(&id)?))
            .await
    }

    pub async fn structure_identifiers(&self) -> PipelineResult<Vec<StructureIdentifier>> {
        self.blocking(|store, _| Ok(store.structure_identifiers()?))
            .await
    }

    pub async fn tracing_structures(&self) -> PipelineResult<Vec<TracingStructure>> {
        self.blocking(|store, _| Ok(store.tracing_structures()?))
            .await
    }

    /// How many registered tracings the transform service holds for a tracing.
    pub async fn transformed_count(&self, id: &str) -> TransformedCount {
        match self.remote.transformed_count(id).await {
            Ok(count) => TransformedCount { count, error: None },
            Err(e) => TransformedCount {
                count: 0,
                error: Some(e.to_string()),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Base64 SWC envelope for a tracing, `None` if it has no nodes.
    pub async fn export(&self, id: &str) -> PipelineResult<Option<SwcExport>> {
        let id = id.to_string();
        self.blocking(move |store, registry| export_tracing(store, registry, &id))
            .await
    }

    /// Plain SWC text for a tracing, `None` if it has no nodes.
    pub async fn export_text(&self, id: &str) -> PipelineResult<Option<String>> {
        let id = id.to_string();
        self.blocking(move |store, registry| export_text(store, registry, &id))
            .await
    }
}

fn outcome(tracing: Tracing, prepared: PreparedTracing, transform_submission: TransformSubmission) -> IngestOutcome {
    IngestOutcome {
        tracing,
        node_count: prepared.nodes.len(),
        soma_count: prepared.parsed.soma_count,
        forced_soma_count: prepared.parsed.forced_soma_count,
        skipped: prepared.parsed.skipped,
        encoding: prepared.parsed.encoding,
        transform_submission,
    }
}

fn log_parse_summary(parsed: &ParseResult) {
    log_success_indent(format!("Encoding: {}", parsed.encoding), 1);
    log_success_indent(format!("Rows: {}", parsed.rows.len()), 1);
    if parsed.forced_soma_count > 0 {
        log_warning(format!(
            "{} root sample(s) converted to soma",
            parsed.forced_soma_count
        ));
    }
    if !parsed.skipped.is_empty() {
        log_warning(format!("{} line(s) skipped", parsed.skipped.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StandardStructure;

    const AXON_STRUCTURE: &str = "68e76074-1777-42b6-bbf9-93a6a5f02fa4";

    fn ingestor() -> Ingestor {
        let store = SwcStore::open_in_memory().unwrap();
        store.seed_if_required().unwrap();
        Ingestor::new(Arc::new(store), TransformClient::disabled())
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            annotator: "jdoe".to_string(),
            neuron_id: Some("neuron-1".to_string()),
            tracing_structure_id: Some(AXON_STRUCTURE.to_string()),
        }
    }

    const CELL: &[u8] = b"# OFFSET 10 20 30\n1 1 0 0 0 1 -1\n2 3 1 0 0 1 1\n3 3 2 0 0 1 2\n";

    #[tokio::test]
    async fn test_create_persists_tracing_and_nodes() {
        let ingestor = ingestor();
        let outcome = ingestor
            .create_from_bytes(metadata(), "cell.swc", CELL)
            .await
            .unwrap();

        assert_eq!(outcome.node_count, 3);
        assert_eq!(outcome.soma_count, 1);
        assert_eq!(outcome.tracing.offset_x, 10.0);
        assert_eq!(outcome.tracing.file_comments, "# OFFSET 10 20 30\n");
        assert!(!outcome.transform_submission.submitted);

        let nodes = ingestor.tracing_nodes(&outcome.tracing.id).await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[1].structure_identifier_id,
            StandardStructure::BasalDendrite.seed_id()
        );
    }

    #[tokio::test]
    async fn test_forced_soma_is_recorded() {
        let ingestor = ingestor();
        let outcome = ingestor
            .create_from_bytes(metadata(), "cell.swc", b"1 2 0 0 0 1 -1\n2 2 1 0 0 1 1\n")
            .await
            .unwrap();
        assert_eq!(outcome.forced_soma_count, 1);
        assert!(outcome
            .tracing
            .file_comments
            .contains("# Un-parented (root) sample 1 converted from 2 to soma (1)"));

        let nodes = ingestor.tracing_nodes(&outcome.tracing.id).await.unwrap();
        assert_eq!(nodes[0].structure_identifier_id, StandardStructure::Soma.seed_id());
    }

    #[tokio::test]
    async fn test_topology_errors_write_nothing() {
        let ingestor = ingestor();

        let two_roots = ingestor
            .create_from_bytes(metadata(), "bad.swc", b"1 1 0 0 0 1 -1\n2 1 0 0 0 1 -1\n")
            .await;
        assert!(matches!(two_roots, Err(PipelineError::Topology(_))));

        let no_root = ingestor
            .create_from_bytes(metadata(), "bad.swc", b"1 1 0 0 0 1 2\n")
            .await;
        assert!(matches!(no_root, Err(PipelineError::Topology(_))));

        let empty = ingestor
            .create_from_bytes(metadata(), "bad.swc", b"# nothing\n")
            .await;
        assert!(matches!(empty, Err(PipelineError::Topology(_))));

        let page = ingestor.tracings(TracingQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_code_fails_resolution() {
        let ingestor = ingestor();
        let result = ingestor
            .create_from_bytes(metadata(), "odd.swc", b"1 1 0 0 0 1 -1\n2 42 0 0 0 1 1\n")
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::StructureResolution { sample_number: 2, code: 42 })
        ));
        let page = ingestor.tracings(TracingQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_metadata_rejected() {
        let ingestor = ingestor();
        let mut meta = metadata();
        meta.annotator.clear();
        let result = ingestor.create_from_bytes(meta, "cell.swc", CELL).await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));

        let mut meta = metadata();
        meta.tracing_structure_id = Some("not-a-structure".to_string());
        let result = ingestor.create_from_bytes(meta, "cell.swc", CELL).await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_replace_swaps_nodes_in_place() {
        let ingestor = ingestor();
        let created = ingestor
            .create_from_bytes(metadata(), "cell.swc", CELL)
            .await
            .unwrap();
        let id = created.tracing.id.clone();

        let replaced = ingestor
            .replace_from_bytes(&id, "fixed.swc", b"1 1 5 5 5 2 -1\n2 2 6 5 5 1 1\n")
            .await
            .unwrap();

        assert_eq!(replaced.tracing.id, id);
        assert_eq!(replaced.tracing.filename, "fixed.swc");
        assert_eq!(replaced.tracing.offset_x, 0.0);
        assert_eq!(replaced.tracing.annotator, "jdoe");
        assert_eq!(ingestor.node_count(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_old_nodes() {
        let ingestor = ingestor();
        let created = ingestor
            .create_from_bytes(metadata(), "cell.swc", CELL)
            .await
            .unwrap();
        let id = created.tracing.id.clone();

        let result = ingestor
            .replace_from_bytes(&id, "bad.swc", b"1 1 0 0 0 1 -1\n2 99 0 0 0 1 1\n")
            .await;
        assert!(result.is_err());
        assert_eq!(ingestor.node_count(&id).await.unwrap(), 3);
        assert_eq!(ingestor.tracing(&id).await.unwrap().filename, "cell.swc");
    }

    #[tokio::test]
    async fn test_replace_unknown_tracing() {
        let ingestor = ingestor();
        let result = ingestor
            .replace_from_bytes("missing", "cell.swc", CELL)
            .await;
        assert!(matches!(result, Err(PipelineError::NotFound(ref id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let ingestor = ingestor();
        let created = ingestor
            .create_from_bytes(metadata(), "cell.swc", CELL)
            .await
            .unwrap();
        let id = created.tracing.id.clone();

        let updated = ingestor
            .update_tracing(TracingUpdate {
                id: id.clone(),
                annotator: Some("asmith".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.annotator, "asmith");

        let missing = ingestor
            .update_tracing(TracingUpdate {
                id: "missing".to_string(),
                annotator: Some("x".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(missing, Err(PipelineError::NotFound(_))));

        let outcomes = ingestor
            .delete_tracings(&[id.clone(), "missing".to_string()])
            .await;
        assert!(outcomes[0].deleted);
        assert_eq!(outcomes[0].node_count, 3);
        assert!(!outcomes[1].deleted);
        assert!(outcomes[1].error.is_some());

        assert!(matches!(ingestor.tracing(&id).await, Err(PipelineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_for_neurons() {
        let ingestor = ingestor();
        ingestor.create_from_bytes(metadata(), "a.swc", CELL).await.unwrap();
        ingestor.create_from_bytes(metadata(), "b.swc", CELL).await.unwrap();
        let mut other = metadata();
        other.neuron_id = Some("neuron-2".to_string());
        ingestor.create_from_bytes(other, "c.swc", CELL).await.unwrap();

        let outcomes = ingestor
            .delete_tracings_for_neurons(&["neuron-1".to_string()])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.deleted));

        let page = ingestor.tracings(TracingQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let ingestor = ingestor();
        let created = ingestor
            .create_from_bytes(metadata(), "cell.swc", b"1 1 0.1 0.2 0.3 1.25 -1\n2 3 1 2 3 0.5 1\n")
            .await
            .unwrap();

        let text = ingestor
            .export_text(&created.tracing.id)
            .await
            .unwrap()
            .unwrap();
        let reparsed = parse_bytes(text.as_bytes());
        assert_eq!(reparsed.rows.len(), 2);
        assert_eq!(reparsed.rows[0].x, 0.1);
        assert_eq!(reparsed.rows[0].radius, 1.25);
        assert_eq!(reparsed.rows[1].structure_code, 3);

        let envelope = ingestor.export(&created.tracing.id).await.unwrap().unwrap();
        assert_eq!(envelope.decode().unwrap().lines().count(), 7);
        assert!(ingestor.export("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transformed_count_reports_disabled() {
        let ingestor = ingestor();
        let count = ingestor.transformed_count("anything").await;
        assert_eq!(count.count, 0);
        assert!(count.error.is_some());
    }
}
