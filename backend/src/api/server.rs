//! HTTP server for the SWC tracing API.
//!
//! # API Endpoints
//!
//! | Method | Path                              | Description                          |
//! |--------|-----------------------------------|--------------------------------------|
//! | GET    | `/health`                         | Health check                         |
//! | POST   | `/api/upload`                     | Upload an SWC file as a new tracing  |
//! | GET    | `/api/tracings`                   | List tracings                        |
//! | GET    | `/api/tracings/{id}`              | One tracing header                   |
//! | PATCH  | `/api/tracings/{id}`              | Update tracing metadata              |
//! | DELETE | `/api/tracings/{id}`              | Delete a tracing and its nodes       |
//! | GET    | `/api/tracings/{id}/nodes`        | Nodes in sample order                |
//! | PUT    | `/api/tracings/{id}/nodes`        | Replace nodes from an SWC upload     |
//! | GET    | `/api/tracings/{id}/transformed`  | Registered tracing count             |
//! | POST   | `/api/tracings/delete`            | Delete tracings by id                |
//! | POST   | `/api/neurons/tracings/delete`    | Delete tracings of neurons           |
//! | GET    | `/api/structures`                 | Structure identifier catalog         |
//! | GET    | `/api/tracing-structures`         | Tracing structure catalog            |
//! | POST   | `/swc`                            | Export a tracing as base64 SWC       |
//! | GET    | `/api/system-message`             | Current system message               |
//! | PUT    | `/api/system-message`             | Set the system message               |
//! | DELETE | `/api/system-message`             | Clear the system message             |
//! | GET    | `/api/logs`                       | SSE stream for real-time logs        |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, log_success, LOG_BROADCASTER};
use super::types::{
    api_error, ApiError, DeleteNeuronTracingsRequest, DeleteTracingsRequest, ExportRequest,
    SystemMessage, TracingListParams, UpdateTracingRequest,
};
use crate::config::{ServiceConfig, MAX_UPLOAD_SIZE};
use crate::error::{DecodeError, PipelineError, ServerError};
use crate::export::SwcExport;
use crate::ingest::{DeleteOutcome, IngestOutcome, Ingestor, TransformedCount};
use crate::models::{
    StructureIdentifier, Tracing, TracingNode, TracingPage, TracingStructure, TracingUpdate,
    UploadMetadata,
};
use crate::parser::{ParseResult, SwcStreamParser};
use crate::remote::TransformClient;
use crate::store::SwcStore;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub system_message: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(ingestor: Ingestor) -> Self {
        Self {
            ingestor,
            system_message: Arc::new(RwLock::new(String::new())),
        }
    }
}

/// Open the store, seed the catalogs and start serving.
pub async fn start_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = SwcStore::open(&config.db_path)?;
    if store.seed_if_required()? {
        log_success("Seeded structure catalogs");
    }

    let ingestor = Ingestor::new(Arc::new(store), TransformClient::new(config.transform.clone()));
    let app = router(AppState::new(ingestor));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 SWC service running on http://localhost:{}", config.port);
    println!("   Database:  {}", config.db_path.display());
    if config.transform.enabled {
        println!("   Transform: {}", config.transform.url());
    } else {
        println!("   Transform: disabled");
    }
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes over the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_tracing))
        .route("/api/tracings", get(list_tracings))
        .route(
            "/api/tracings/{id}",
            get(get_tracing).patch(update_tracing).delete(delete_tracing),
        )
        .route(
            "/api/tracings/{id}/nodes",
            get(tracing_nodes).put(replace_nodes),
        )
        .route("/api/tracings/{id}/transformed", get(transformed_count))
        .route("/api/tracings/delete", post(delete_tracings))
        .route("/api/neurons/tracings/delete", post(delete_neuron_tracings))
        .route("/api/structures", get(structure_identifiers))
        .route("/api/tracing-structures", get(tracing_structures))
        .route("/swc", post(export_swc))
        .route(
            "/api/system-message",
            get(get_system_message)
                .put(set_system_message)
                .delete(clear_system_message),
        )
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "swcload",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// An SWC upload: the streamed parse of the `file` field plus text fields.
struct SwcUpload {
    filename: String,
    parsed: ParseResult,
    annotator: Option<String>,
    neuron_id: Option<String>,
    tracing_structure_id: Option<String>,
}

fn upload_error(e: impl std::fmt::Display) -> ApiError {
    api_error(PipelineError::from(DecodeError::Upload(e.to_string())))
}

/// Drain a multipart body, feeding the file field through the parser chunk by chunk.
async fn read_upload(mut multipart: Multipart) -> Result<SwcUpload, ApiError> {
    let mut parsed: Option<ParseResult> = None;
    let mut filename = String::new();
    let mut annotator = None;
    let mut neuron_id = None;
    let mut tracing_structure_id = None;

    while let Some(mut field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                if parsed.is_some() {
                    return Err(api_error(ServerError::BadRequest(
                        "Only one file per upload".into(),
                    )));
                }
                filename = field.file_name().unwrap_or("").to_string();
                let mut parser = SwcStreamParser::new();
                while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
                    parser.push(&chunk);
                }
                parsed = Some(parser.finish());
            }
            "annotator" | "neuronId" | "tracingStructureId" => {
                let value = field.text().await.map_err(upload_error)?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "annotator" => annotator = value,
                    "neuronId" => neuron_id = value,
                    _ => tracing_structure_id = value,
                }
            }
            _ => {}
        }
    }

    let parsed = parsed.ok_or_else(|| api_error(ServerError::BadRequest("No file provided".into())))?;

    log_info(format!("📤 Upload received: {}", filename));

    Ok(SwcUpload {
        filename,
        parsed,
        annotator,
        neuron_id,
        tracing_structure_id,
    })
}

/// Upload a new tracing
async fn upload_tracing(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let upload = read_upload(multipart).await?;
    let metadata = UploadMetadata {
        annotator: upload.annotator.unwrap_or_default(),
        neuron_id: upload.neuron_id,
        tracing_structure_id: upload.tracing_structure_id,
    };

    let outcome = state
        .ingestor
        .create_tracing(metadata, &upload.filename, upload.parsed)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Replace the nodes of an existing tracing
async fn replace_nodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<IngestOutcome>, ApiError> {
    let upload = read_upload(multipart).await?;
    let outcome = state
        .ingestor
        .replace_nodes(&id, &upload.filename, upload.parsed)
        .await
        .map_err(api_error)?;
    Ok(Json(outcome))
}

async fn list_tracings(
    State(state): State<AppState>,
    Query(params): Query<TracingListParams>,
) -> Result<Json<TracingPage>, ApiError> {
    let page = state
        .ingestor
        .tracings(params.into())
        .await
        .map_err(api_error)?;
    Ok(Json(page))
}

async fn get_tracing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tracing>, ApiError> {
    let tracing = state.ingestor.tracing(&id).await.map_err(api_error)?;
    Ok(Json(tracing))
}

async fn update_tracing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTracingRequest>,
) -> Result<Json<Tracing>, ApiError> {
    let update = TracingUpdate {
        id,
        annotator: body.annotator,
        neuron_id: body.neuron_id,
        tracing_structure_id: body.tracing_structure_id,
    };
    let tracing = state
        .ingestor
        .update_tracing(update)
        .await
        .map_err(api_error)?;
    Ok(Json(tracing))
}

async fn delete_tracing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let outcome = state.ingestor.delete_tracing(&id).await.map_err(api_error)?;
    Ok(Json(outcome))
}

async fn delete_tracings(
    State(state): State<AppState>,
    Json(body): Json<DeleteTracingsRequest>,
) -> Json<Vec<DeleteOutcome>> {
    Json(state.ingestor.delete_tracings(&body.ids).await)
}

async fn delete_neuron_tracings(
    State(state): State<AppState>,
    Json(body): Json<DeleteNeuronTracingsRequest>,
) -> Result<Json<Vec<DeleteOutcome>>, ApiError> {
    let outcomes = state
        .ingestor
        .delete_tracings_for_neurons(&body.neuron_ids)
        .await
        .map_err(api_error)?;
    Ok(Json(outcomes))
}

async fn tracing_nodes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TracingNode>>, ApiError> {
    let nodes = state.ingestor.tracing_nodes(&id).await.map_err(api_error)?;
    Ok(Json(nodes))
}

async fn transformed_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<TransformedCount> {
    Json(state.ingestor.transformed_count(&id).await)
}

async fn structure_identifiers(
    State(state): State<AppState>,
) -> Result<Json<Vec<StructureIdentifier>>, ApiError> {
    let structures = state
        .ingestor
        .structure_identifiers()
        .await
        .map_err(api_error)?;
    Ok(Json(structures))
}

async fn tracing_structures(
    State(state): State<AppState>,
) -> Result<Json<Vec<TracingStructure>>, ApiError> {
    let structures = state
        .ingestor
        .tracing_structures()
        .await
        .map_err(api_error)?;
    Ok(Json(structures))
}

/// Export endpoint: `null` for a missing id, an unknown tracing or one without nodes.
async fn export_swc(
    State(state): State<AppState>,
    Json(body): Json<ExportRequest>,
) -> Result<Json<Option<SwcExport>>, ApiError> {
    let id = match body.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return Ok(Json(None)),
    };
    let export = state.ingestor.export(&id).await.map_err(api_error)?;
    Ok(Json(export))
}

async fn get_system_message(State(state): State<AppState>) -> Json<SystemMessage> {
    let message = state.system_message.read().await.clone();
    Json(SystemMessage { message })
}

async fn set_system_message(
    State(state): State<AppState>,
    Json(body): Json<SystemMessage>,
) -> Json<bool> {
    *state.system_message.write().await = body.message;
    Json(true)
}

async fn clear_system_message(State(state): State<AppState>) -> Json<bool> {
    state.system_message.write().await.clear();
    Json(true)
}
