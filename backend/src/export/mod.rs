//! SWC export: stored header + ordered nodes back to SWC text.
//!
//! Output layout:
//!
//! ```text
//! # Generated from <tool> <timestamp>.
//! # Internal tracing id <id>
//! # Annotator <annotator>
//! # Original filename <filename>
//! # OFFSET <x> <y> <z>
//! <sample>\t<code>\t<x>\t<y>\t<z>\t<radius>\t<parent>
//! ...
//! ```
//!
//! Coordinates and radius carry exactly six decimals. The text travels
//! base64-encoded inside an [`SwcExport`] envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::cache::StructureRegistry;
use crate::config::EXPORT_TOOL_NAME;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Tracing, TracingNode};
use crate::store::SwcStore;

/// Transport envelope for an exported tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwcExport {
    pub id: String,
    /// Base64 of the SWC text.
    pub contents: String,
}

impl SwcExport {
    pub fn new(id: impl Into<String>, text: &str) -> Self {
        Self {
            id: id.into(),
            contents: STANDARD.encode(text.as_bytes()),
        }
    }

    /// Decode the SWC text back out of the envelope.
    pub fn decode(&self) -> Result<String, String> {
        let bytes = STANDARD
            .decode(self.contents.as_bytes())
            .map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }
}

/// Local time in the header's human-readable form.
pub fn export_timestamp() -> String {
    chrono::Local::now()
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}

/// The five header lines.
pub fn encode_header(tracing: &Tracing, timestamp: &str) -> String {
    format!(
        "# Generated from {} {}.\n# Internal tracing id {}\n# Annotator {}\n# Original filename {}\n# OFFSET {} {} {}\n",
        EXPORT_TOOL_NAME,
        timestamp,
        tracing.id,
        tracing.annotator,
        tracing.filename,
        tracing.offset_x,
        tracing.offset_y,
        tracing.offset_z
    )
}

fn fixed6(value: f64) -> String {
    // no "-0.000000"
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.6}", value)
}

/// One tab-separated line per node, in the order given.
pub fn encode_nodes(nodes: &[TracingNode], registry: &StructureRegistry) -> PipelineResult<String> {
    let mut out = String::with_capacity(nodes.len() * 64);
    for node in nodes {
        let code = registry
            .value_for_id(&node.structure_identifier_id)
            .ok_or_else(|| {
                PipelineError::UnknownStructureIdentifier(node.structure_identifier_id.clone())
            })?;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            node.sample_number,
            code,
            fixed6(node.x),
            fixed6(node.y),
            fixed6(node.z),
            fixed6(node.radius),
            node.parent_number
        )
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    }
    Ok(out)
}

/// Header followed by the node lines.
pub fn encode_swc(
    tracing: &Tracing,
    nodes: &[TracingNode],
    registry: &StructureRegistry,
    timestamp: &str,
) -> PipelineResult<String> {
    let mut text = encode_header(tracing, timestamp);
    text.push_str(&encode_nodes(nodes, registry)?);
    Ok(text)
}

/// Read a tracing and its ordered nodes in one transaction and encode them.
///
/// Returns `None` for an unknown id or a tracing without nodes.
pub fn export_text(
    store: &SwcStore,
    registry: &StructureRegistry,
    id: &str,
) -> PipelineResult<Option<String>> {
    registry.load_from(store)?;

    let (tracing, nodes) = store.transaction(|tx| -> PipelineResult<_> {
        let tracing = tx.find_tracing(id)?;
        let nodes = match tracing {
            Some(_) => tx.find_nodes_ordered(id)?,
            None => Vec::new(),
        };
        Ok((tracing, nodes))
    })?;

    match tracing {
        Some(tracing) if !nodes.is_empty() => {
            encode_swc(&tracing, &nodes, registry, &export_timestamp()).map(Some)
        }
        _ => Ok(None),
    }
}

/// [`export_text`] wrapped in a base64 envelope.
pub fn export_tracing(
    store: &SwcStore,
    registry: &StructureRegistry,
    id: &str,
) -> PipelineResult<Option<SwcExport>> {
    Ok(export_text(store, registry, id)?.map(|text| SwcExport::new(id, &text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageResult;
    use crate::models::{NewNode, NewTracing, StandardStructure};

    fn tracing() -> Tracing {
        Tracing {
            id: "t-1".to_string(),
            neuron_id: None,
            filename: "cell.swc".to_string(),
            annotator: "jdoe".to_string(),
            file_comments: String::new(),
            offset_x: 1.5,
            offset_y: 0.0,
            offset_z: -2.0,
            tracing_structure_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn node(sample: i32, structure: StandardStructure, parent: i32) -> TracingNode {
        TracingNode {
            id: format!("n-{}", sample),
            tracing_id: "t-1".to_string(),
            sample_number: sample,
            parent_number: parent,
            x: 1.0,
            y: 2.5,
            z: -0.0,
            radius: 1.0 / 3.0,
            structure_identifier_id: structure.seed_id().to_string(),
        }
    }

    fn registry() -> StructureRegistry {
        StructureRegistry::from_entries(crate::models::seed_structure_identifiers())
    }

    #[test]
    fn test_header_lines() {
        let header = encode_header(&tracing(), "1/2/2024, 3:04:05 PM");
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "# Generated from MouseLight internal SWC manager 1/2/2024, 3:04:05 PM."
        );
        assert_eq!(lines[1], "# Internal tracing id t-1");
        assert_eq!(lines[2], "# Annotator jdoe");
        assert_eq!(lines[3], "# Original filename cell.swc");
        assert_eq!(lines[4], "# OFFSET 1.5 0 -2");
    }

    #[test]
    fn test_node_lines() {
        let nodes = vec![
            node(1, StandardStructure::Soma, -1),
            node(2, StandardStructure::Axon, 1),
        ];
        let text = encode_nodes(&nodes, &registry()).unwrap();
        assert_eq!(
            text,
            "1\t1\t1.000000\t2.500000\t0.000000\t0.333333\t-1\n2\t2\t1.000000\t2.500000\t0.000000\t0.333333\t1\n"
        );
    }

    #[test]
    fn test_unknown_structure_identifier() {
        let mut n = node(1, StandardStructure::Soma, -1);
        n.structure_identifier_id = "gone".to_string();
        let result = encode_nodes(&[n], &registry());
        assert!(matches!(result, Err(PipelineError::UnknownStructureIdentifier(ref id)) if id == "gone"));
    }

    #[test]
    fn test_envelope_is_base64() {
        let export = SwcExport::new("t-1", "# hi\n");
        assert_eq!(export.contents, "IyBoaQo=");
        assert_eq!(export.decode().unwrap(), "# hi\n");
    }

    #[test]
    fn test_export_from_store_in_sample_order() {
        let store = SwcStore::open_in_memory().unwrap();
        store.seed_if_required().unwrap();
        let registry = StructureRegistry::new();

        let axon = StandardStructure::Axon.seed_id().to_string();
        let soma = StandardStructure::Soma.seed_id().to_string();
        let id = store
            .transaction(|tx| -> StorageResult<String> {
                let t = tx.create_tracing(&NewTracing {
                    neuron_id: None,
                    filename: "a.swc".to_string(),
                    annotator: "jdoe".to_string(),
                    file_comments: String::new(),
                    offset: (0.0, 0.0, 0.0),
                    tracing_structure_id: None,
                })?;
                let mk = |sample: i32, parent: i32, sid: &str| NewNode {
                    sample_number: sample,
                    parent_number: parent,
                    x: sample as f64,
                    y: 0.0,
                    z: 0.0,
                    radius: 1.0,
                    structure_identifier_id: sid.to_string(),
                };
                tx.bulk_create_nodes(&t.id, &[mk(3, 2, &axon), mk(1, -1, &soma), mk(2, 1, &axon)])?;
                Ok(t.id)
            })
            .unwrap();

        let export = export_tracing(&store, &registry, &id).unwrap().unwrap();
        assert_eq!(export.id, id);
        let text = export.decode().unwrap();
        let rows: Vec<&str> = text.lines().skip(5).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("1\t1\t"));
        assert!(rows[1].starts_with("2\t2\t"));
        assert!(rows[2].starts_with("3\t2\t"));
        assert!(text.lines().nth(4).unwrap().starts_with("# OFFSET 0 0 0"));
    }

    #[test]
    fn test_missing_or_empty_tracing_is_absent() {
        let store = SwcStore::open_in_memory().unwrap();
        store.seed_if_required().unwrap();
        let registry = StructureRegistry::new();

        assert!(export_tracing(&store, &registry, "nope").unwrap().is_none());

        let id = store
            .transaction(|tx| {
                tx.create_tracing(&NewTracing {
                    neuron_id: None,
                    filename: "empty.swc".to_string(),
                    annotator: "jdoe".to_string(),
                    file_comments: String::new(),
                    offset: (0.0, 0.0, 0.0),
                    tracing_structure_id: None,
                })
            })
            .unwrap()
            .id;
        assert!(export_tracing(&store, &registry, &id).unwrap().is_none());
    }
}
