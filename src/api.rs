//! HTTP surface for docquery.
//!
//! - `GET /initialized` – Readiness probe; answers `true` as soon as the server accepts requests.
//! - `GET /hs_version` – Version of the pipeline framework serving queries.
//! - `POST /query` – Answer a single question; blank answers are filtered out.
//! - `POST /advanced_query` – Answer `{"queries": [...]}` in order, or the preset batch when the
//!   body is empty.
//! - `POST /file-upload` – Multipart upload staged on disk and fed to the indexing pipeline.
//! - `POST /analyze-pdf` – Same as `/file-upload`, then answer the preset analyze question.
//!
//! Failures are returned as `{"detail": "<message>"}`.

use crate::limiter::LimiterError;
use crate::query::{
    AdvancedQueryRequest, AnalyzeError, QueryError, QueryRequest, QueryResponse, SearchApi,
};
use crate::upload::{UploadError, UploadForm, UploadedFile};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest multipart body accepted by the upload endpoints.
pub const UPLOAD_BODY_LIMIT: usize = 256 * 1024 * 1024;

/// Build the HTTP router exposing the query and upload endpoints.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SearchApi + 'static,
{
    Router::new()
        .route("/initialized", get(check_status))
        .route("/hs_version", get(pipeline_version::<S>))
        .route("/query", post(query::<S>))
        .route("/advanced_query", post(advanced_query::<S>))
        .route(
            "/file-upload",
            post(upload_file::<S>).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/analyze-pdf",
            post(analyze_pdf::<S>).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Readiness probe. Call it with a short timeout and treat no reply as "busy".
async fn check_status() -> Json<bool> {
    Json(true)
}

/// Response body for `GET /hs_version`.
#[derive(Serialize)]
struct VersionResponse {
    hs_version: String,
}

async fn pipeline_version<S>(State(service): State<Arc<S>>) -> Json<VersionResponse>
where
    S: SearchApi,
{
    Json(VersionResponse {
        hs_version: service.pipeline_version(),
    })
}

/// Answer a single question, passing any per-stage parameters on to the pipeline.
async fn query<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: SearchApi,
{
    let Json(request) = payload?;
    let response = service.query(request).await?;
    Ok(Json(response))
}

/// Answer a batch of questions. An empty body runs the preset batch.
async fn advanced_query<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<Json<Vec<QueryResponse>>, AppError>
where
    S: SearchApi,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let request: AdvancedQueryRequest = serde_json::from_slice(&body)
            .map_err(|err| AppError::Unprocessable(err.to_string()))?;
        Some(request)
    };
    let responses = service.advanced_query(request).await?;
    Ok(Json(responses))
}

/// Stage uploaded files and run the indexing pipeline.
async fn upload_file<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<StatusCode, AppError>
where
    S: SearchApi,
{
    ensure_indexing(service.as_ref())?;
    let form = read_upload_form(multipart).await?;
    let outcome = service.upload_files(form).await?;
    tracing::info!(files = outcome.file_paths.len(), "File upload completed");
    Ok(StatusCode::NO_CONTENT)
}

/// Stage and index uploaded files, then answer the preset analyze question.
async fn analyze_pdf<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<QueryResponse>, AppError>
where
    S: SearchApi,
{
    ensure_indexing(service.as_ref())?;
    let form = read_upload_form(multipart).await?;
    let response = service.analyze_files(form).await?;
    Ok(Json(response))
}

/// Refuse uploads before the multipart body is read when no indexing pipeline exists.
fn ensure_indexing<S: SearchApi>(service: &S) -> Result<(), UploadError> {
    if service.indexing_configured() {
        Ok(())
    } else {
        Err(UploadError::NotConfigured)
    }
}

/// Drain a multipart body into an [`UploadForm`].
///
/// Parts carrying a filename are uploaded files; every other part is a text form field.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let multipart_error = |err: axum::extract::multipart::MultipartError| UploadError::Form {
        field: "multipart".into(),
        reason: err.body_text(),
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name().map(str::to_string) {
            let content = field.bytes().await.map_err(multipart_error)?;
            form.files.push(UploadedFile {
                filename,
                content: content.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.set_field(&name, value)?;
        }
    }
    Ok(form)
}

/// Error wrapper translating service failures into HTTP responses.
#[derive(Debug)]
enum AppError {
    Query(QueryError),
    Upload(UploadError),
    Unprocessable(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Query(QueryError::Limiter(LimiterError::Busy)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(UploadError::NotConfigured) => StatusCode::NOT_IMPLEMENTED,
            AppError::Upload(
                UploadError::InvalidMeta(_)
                | UploadError::InvalidParams(_)
                | UploadError::Form { .. },
            ) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::NoFiles) | AppError::Unprocessable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Query(error) => error.to_string(),
            AppError::Upload(error) => error.to_string(),
            AppError::Unprocessable(message) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.message();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %detail, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %detail, "Request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}

impl From<UploadError> for AppError {
    fn from(inner: UploadError) -> Self {
        Self::Upload(inner)
    }
}

impl From<AnalyzeError> for AppError {
    fn from(inner: AnalyzeError) -> Self {
        match inner {
            AnalyzeError::Upload(error) => Self::Upload(error),
            AnalyzeError::Query(error) => Self::Query(error),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}
