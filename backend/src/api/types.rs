//! REST request and response types.
//!
//! Bodies are JSON in camelCase. Errors share one shape:
//!
//! ```json
//! { "error": { "name": "NoRootError", "message": "...", "details": [] } }
//! ```

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{PipelineError, ServerError};
use crate::models::TracingQuery;

/// Body of `POST /swc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of `POST /api/tracings/delete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteTracingsRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Body of `POST /api/neurons/tracings/delete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNeuronTracingsRequest {
    #[serde(default)]
    pub neuron_ids: Vec<String>,
}

/// Body of `PATCH /api/tracings/{id}`; the id comes from the path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTracingRequest {
    #[serde(default)]
    pub annotator: Option<String>,
    #[serde(default)]
    pub neuron_id: Option<String>,
    #[serde(default)]
    pub tracing_structure_id: Option<String>,
}

/// System message payload for `GET`/`PUT /api/system-message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message: String,
}

/// Query string of `GET /api/tracings`.
///
/// `neuronIds` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingListParams {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub neuron_ids: Option<String>,
    #[serde(default)]
    pub tracing_structure_id: Option<String>,
}

impl From<TracingListParams> for TracingQuery {
    fn from(params: TracingListParams) -> Self {
        let neuron_ids = params.neuron_ids.map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        });
        TracingQuery {
            offset: params.offset,
            limit: params.limit,
            neuron_ids,
            tracing_structure_id: params.tracing_structure_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Error reply: status plus JSON body.
pub type ApiError = (StatusCode, Json<Value>);

/// HTTP status for a pipeline failure.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
        PipelineError::Topology(_)
        | PipelineError::StructureResolution { .. }
        | PipelineError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::UnknownStructureIdentifier(_)
        | PipelineError::Persistence(_)
        | PipelineError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Create an error body
pub fn error_response(name: &str, message: &str, details: &[String]) -> Value {
    json!({
        "error": {
            "name": name,
            "message": message,
            "details": details,
        }
    })
}

impl From<PipelineError> for ApiErrorReply {
    fn from(err: PipelineError) -> Self {
        let details = match &err {
            PipelineError::InvalidRequest(errors) => errors.clone(),
            _ => Vec::new(),
        };
        ApiErrorReply(
            status_for(&err),
            error_response(err.name(), &err.to_string(), &details),
        )
    }
}

impl From<ServerError> for ApiErrorReply {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Pipeline(e) => e.into(),
            ServerError::BadRequest(message) => ApiErrorReply(
                StatusCode::BAD_REQUEST,
                error_response("BadRequestError", &message, &[]),
            ),
            ServerError::Internal(message) => ApiErrorReply(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_response("InternalError", &message, &[]),
            ),
        }
    }
}

/// Status and body of a failed request.
#[derive(Debug)]
pub struct ApiErrorReply(pub StatusCode, pub Value);

impl From<ApiErrorReply> for ApiError {
    fn from(reply: ApiErrorReply) -> Self {
        (reply.0, Json(reply.1))
    }
}

/// Convert any pipeline/server error into an axum error reply.
pub fn api_error(err: impl Into<ApiErrorReply>) -> ApiError {
    let reply: ApiErrorReply = err.into();
    reply.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, TopologyError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TopologyError::MultipleRoots(2).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PipelineError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StorageError::Poisoned.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_shape() {
        let (status, Json(body)) =
            api_error(PipelineError::InvalidRequest(vec!["annotator too short".into()]));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "InvalidRequestError");
        assert_eq!(body["error"]["details"][0], "annotator too short");

        let (status, Json(body)) = api_error(ServerError::BadRequest("No file provided".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "No file provided");
    }

    #[test]
    fn test_list_params_split_neuron_ids() {
        let query: TracingQuery = TracingListParams {
            neuron_ids: Some("a, b,,c".to_string()),
            tracing_structure_id: Some(String::new()),
            ..Default::default()
        }
        .into();
        assert_eq!(
            query.neuron_ids,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(query.tracing_structure_id.is_none());
    }
}
