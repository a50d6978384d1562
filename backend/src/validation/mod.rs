//! Validation before any write.
//!
//! Two independent checks run ahead of persistence:
//!
//! - **Topology** - a parsed tracing must have rows and exactly one root.
//! - **Metadata** - request metadata (upload fields, header updates) is
//!   checked against JSON Schema Draft 7 documents embedded from `schemas/`:
//!   - `upload-metadata.json`
//!   - `tracing-update.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use swcload::parser::parse_bytes;
//! use swcload::validation::validate_topology;
//!
//! let parsed = parse_bytes(b"1 1 0 0 0 1 -1\n2 3 1 0 0 1 1\n");
//! assert!(validate_topology(&parsed).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::TopologyError;
use crate::models::{TracingUpdate, UploadMetadata};
use crate::parser::ParseResult;

static UPLOAD_METADATA_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/upload-metadata.json"))
        .expect("Invalid embedded schema")
});

static TRACING_UPDATE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/tracing-update.json"))
        .expect("Invalid embedded schema")
});

/// Check tracing-level invariants on a finalized parse.
pub fn validate_topology(parsed: &ParseResult) -> Result<(), TopologyError> {
    if parsed.rows.is_empty() {
        return Err(TopologyError::EmptyTracing);
    }
    match parsed.soma_count {
        0 => Err(TopologyError::NoRoot),
        1 => Ok(()),
        n => Err(TopologyError::MultipleRoots(n)),
    }
}

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Boolean form of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate the metadata fields of an upload.
pub fn validate_upload_metadata(metadata: &UploadMetadata) -> Result<(), Vec<String>> {
    let data = serde_json::to_value(metadata).map_err(|e| vec![e.to_string()])?;
    validate(&UPLOAD_METADATA_SCHEMA, &data)
}

/// Validate a metadata-only tracing update.
pub fn validate_tracing_update(update: &TracingUpdate) -> Result<(), Vec<String>> {
    let data = serde_json::to_value(update).map_err(|e| vec![e.to_string()])?;
    validate(&TRACING_UPDATE_SCHEMA, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_bytes;
    use serde_json::json;

    #[test]
    fn test_single_root_is_valid() {
        let parsed = parse_bytes(b"1 1 0 0 0 1 -1\n2 3 1 0 0 1 1\n");
        assert!(validate_topology(&parsed).is_ok());
    }

    #[test]
    fn test_no_rows() {
        let parsed = parse_bytes(b"# only a comment\n1 2 3\n");
        assert_eq!(validate_topology(&parsed), Err(TopologyError::EmptyTracing));
    }

    #[test]
    fn test_no_root() {
        let parsed = parse_bytes(b"1 1 0 0 0 1 2\n2 3 1 0 0 1 1\n");
        assert_eq!(validate_topology(&parsed), Err(TopologyError::NoRoot));
    }

    #[test]
    fn test_two_roots() {
        let parsed = parse_bytes(b"1 1 0 0 0 1 -1\n2 3 1 0 0 1 -1\n");
        assert_eq!(
            validate_topology(&parsed),
            Err(TopologyError::MultipleRoots(2))
        );
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(!is_valid(&schema, &json!({ "age": 42 })));
    }

    #[test]
    fn test_upload_metadata() {
        let ok = UploadMetadata {
            annotator: "jdoe".to_string(),
            neuron_id: Some("n-1".to_string()),
            tracing_structure_id: None,
        };
        assert!(validate_upload_metadata(&ok).is_ok());

        let blank_annotator = UploadMetadata::default();
        let errors = validate_upload_metadata(&blank_annotator).unwrap_err();
        assert_eq!(errors.len(), 1);

        let missing = json!({ "neuronId": "n-1" });
        let errors = validate(&UPLOAD_METADATA_SCHEMA, &missing).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("annotator")));
    }

    #[test]
    fn test_tracing_update() {
        let ok = TracingUpdate {
            id: "t-1".to_string(),
            annotator: Some("someone".to_string()),
            ..Default::default()
        };
        assert!(validate_tracing_update(&ok).is_ok());

        let blank_id = TracingUpdate {
            id: String::new(),
            ..Default::default()
        };
        assert!(validate_tracing_update(&blank_id).is_err());

        let blank_neuron = TracingUpdate {
            id: "t-1".to_string(),
            neuron_id: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_tracing_update(&blank_neuron).is_err());
    }
}
