use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use pdf_rag_core::{
    EmbeddingProvider, ObjectStore, PdfTextExtractor, PipelineError, ProcessedFile, RagPipeline,
    UploadedFile, VectorIndex, DEFAULT_TOP_K,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Concrete pipeline used by the server: backends are picked by
/// configuration at startup and injected as trait objects.
pub type ServicePipeline = RagPipeline<
    PdfTextExtractor,
    Box<dyn EmbeddingProvider>,
    Box<dyn ObjectStore>,
    Box<dyn VectorIndex>,
>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ServicePipeline>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/upload", post(upload))
        .route("/query", post(query))
        .route("/documents/:filename", delete(delete_document))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope mirrored at the HTTP boundary: validation failures map to
/// 400, everything else inside a handler's pipeline becomes a 500 with the
/// message in the body.
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail,
        }
    }

    fn from_pipeline(context: &str, error: PipelineError) -> Self {
        match error {
            PipelineError::Validation(message) => Self {
                status: StatusCode::BAD_REQUEST,
                detail: message,
            },
            other => Self::internal(format!("{context}: {other}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match state.pipeline.check_health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "service": "rag-application" })),
        )
            .into_response(),
        Err(failure) => {
            error!(error = %failure, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Service unhealthy" })),
            )
                .into_response()
        }
    }
}

async fn ready(State(state): State<AppState>) -> Response {
    match state.pipeline.check_ready().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(failure) => {
            error!(error = %failure, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Service not ready" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    files: Vec<ProcessedFile>,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|failure| ApiError::internal(format!("Processing failed: {failure}")))?
    {
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        let content = field
            .bytes()
            .await
            .map_err(|failure| ApiError::internal(format!("Processing failed: {failure}")))?;

        files.push(UploadedFile {
            filename,
            content: content.to_vec(),
        });
    }

    let report = state
        .pipeline
        .ingest(files)
        .await
        .map_err(|failure| ApiError::from_pipeline("Processing failed", failure))?;

    Ok(Json(UploadResponse {
        message: format!("Successfully processed {} files", report.files.len()),
        files: report.files,
    }))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    results: Vec<QueryResult>,
    query: String,
}

#[derive(Debug, Serialize)]
struct QueryResult {
    text: String,
    score: f64,
    metadata: ResultMetadata,
}

#[derive(Debug, Serialize)]
struct ResultMetadata {
    filename: String,
    chunk_id: u32,
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let outcome = state
        .pipeline
        .query(&request.query, request.top_k)
        .await
        .map_err(|failure| ApiError::from_pipeline("Query failed", failure))?;

    Ok(Json(QueryResponse {
        results: outcome
            .results
            .into_iter()
            .map(|hit| QueryResult {
                text: hit.text,
                score: hit.score,
                metadata: ResultMetadata {
                    filename: hit.filename,
                    chunk_id: hit.chunk_id,
                },
            })
            .collect(),
        query: outcome.query,
    }))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    confirm: bool,
}

async fn delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state
        .pipeline
        .delete(&filename, params.confirm)
        .await
        .map_err(|failure| ApiError::from_pipeline("Deletion failed", failure))?;

    Ok(Json(json!({
        "message": format!("Successfully deleted {filename}"),
        "vectors_deleted": removed,
    })))
}
