//! Client for the remote transform (registration) service.
//!
//! The service is reached over GraphQL/HTTP with a fixed contract:
//!
//! - `applyTransform(swcId)` - queue registration of a newly stored tracing
//! - `tracings(queryInput: {swcTracingIds})` - transformed tracings derived from SWC tracings
//! - `deleteTracingsForSwc(swcTracingIds)` - drop derived tracings
//!
//! Calls made after a commit are best-effort: callers log failures and
//! carry on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::logs::log_warning;
use crate::config::TransformServiceConfig;
use crate::error::{RemoteError, RemoteResult};

/// Request timeout for every call.
const REQUEST_TIMEOUT_SECS: u64 = 10;

const APPLY_TRANSFORM_MUTATION: &str = r#"
mutation applyTransform($id: String!) {
    applyTransform(swcId: $id) {
        tracing {
            id
        }
        errors
    }
}"#;

const QUERY_TRACINGS: &str = r#"
query($ids: [String!]) {
    tracings(queryInput: {swcTracingIds: $ids}) {
        tracings {
            id
            nodeCount
            transformedAt
            swcTracing {
                id
            }
        }
    }
}"#;

const DELETE_TRACINGS_MUTATION: &str = r#"
mutation DeleteTracingsForSwc($swcTracingIds: [String!]) {
    deleteTracingsForSwc(swcTracingIds: $swcTracingIds) {
        error {
            name
            message
        }
    }
}"#;

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdOnly {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyTransformData {
    apply_transform: Option<ApplyTransformOutput>,
}

#[derive(Debug, Deserialize)]
struct ApplyTransformOutput {
    tracing: Option<IdOnly>,
    #[serde(default)]
    errors: Option<Value>,
}

/// Registered tracing returned by `applyTransform`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformAck {
    pub tracing_id: Option<String>,
}

/// A registered tracing derived from an SWC tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedTracing {
    pub id: String,
    #[serde(default)]
    pub node_count: Option<i64>,
    #[serde(default)]
    pub transformed_at: Option<Value>,
    #[serde(default)]
    pub swc_tracing: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct TracingsData {
    tracings: Option<TracingsPage>,
}

#[derive(Debug, Deserialize)]
struct TracingsPage {
    #[serde(default)]
    tracings: Vec<TransformedTracing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteTracingsData {
    #[serde(default)]
    delete_tracings_for_swc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NamedError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// GraphQL client for the transform service.
#[derive(Debug, Clone)]
pub struct TransformClient {
    config: TransformServiceConfig,
    http: reqwest::Client,
}

impl TransformClient {
    pub fn new(config: TransformServiceConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                log_warning(format!(
                    "Transform client built without request timeout: {}",
                    e
                ));
                reqwest::Client::new()
            });
        Self { config, http }
    }

    /// A client that never contacts the network.
    pub fn disabled() -> Self {
        Self::new(TransformServiceConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    /// Ask the service to register a stored tracing.
    pub async fn apply_transform(&self, swc_id: &str) -> RemoteResult<TransformAck> {
        let data: ApplyTransformData = self
            .execute(APPLY_TRANSFORM_MUTATION, json!({ "id": swc_id }))
            .await?;

        let output = data
            .apply_transform
            .ok_or_else(|| RemoteError::InvalidResponse("missing applyTransform".to_string()))?;

        if let Some(errors) = output.errors.filter(has_errors) {
            return Err(RemoteError::ServiceError(errors.to_string()));
        }

        Ok(TransformAck {
            tracing_id: output.tracing.map(|t| t.id),
        })
    }

    /// Registered tracings derived from the given SWC tracings.
    pub async fn query_tracings(&self, swc_ids: &[String]) -> RemoteResult<Vec<TransformedTracing>> {
        let data: TracingsData = self.execute(QUERY_TRACINGS, json!({ "ids": swc_ids })).await?;
        Ok(data.tracings.map(|page| page.tracings).unwrap_or_default())
    }

    /// Number of registered tracings derived from one SWC tracing.
    pub async fn transformed_count(&self, swc_id: &str) -> RemoteResult<usize> {
        let tracings = self.query_tracings(&[swc_id.to_string()]).await?;
        Ok(tracings.len())
    }

    /// Ask the service to drop registered tracings derived from these SWC tracings.
    pub async fn delete_tracings_for_swc(&self, swc_ids: &[String]) -> RemoteResult<()> {
        let data: DeleteTracingsData = self
            .execute(DELETE_TRACINGS_MUTATION, json!({ "swcTracingIds": swc_ids }))
            .await?;

        // one output object, or a list of them
        let outputs = match data.delete_tracings_for_swc {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };

        let messages: Vec<String> = outputs
            .into_iter()
            .filter_map(|output| output.get("error").cloned())
            .filter(|error| !error.is_null())
            .filter_map(|error| serde_json::from_value::<NamedError>(error).ok())
            .map(|e| match (e.name, e.message) {
                (Some(name), Some(message)) => format!("{}: {}", name, message),
                (_, Some(message)) => message,
                (Some(name), None) => name,
                (None, None) => "unknown error".to_string(),
            })
            .collect();

        if messages.is_empty() {
            Ok(())
        } else {
            Err(RemoteError::ServiceError(messages.join("; ")))
        }
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> RemoteResult<T> {
        if !self.config.enabled {
            return Err(RemoteError::Disabled);
        }

        let response = self
            .http
            .post(self.config.url())
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        let envelope: GraphqlResponse<T> =
            serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        if !envelope.errors.is_empty() {
            let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(RemoteError::ServiceError(messages.join("; ")));
        }

        envelope
            .data
            .ok_or_else(|| RemoteError::InvalidResponse("missing data".to_string()))
    }
}

fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
