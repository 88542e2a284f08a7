//! HTTP server for the conversion daemon
//!
//! Exposes the job lifecycle over axum. Every route is served both at the
//! root and under `/api`.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::encode::ConversionOptions;
use crate::service::{ConversionService, ServiceError};
use crate::upload::{stage_upload, StagedUpload, UploadError};

/// Shared handle to the lifecycle service used as router state
pub type SharedService = Arc<ConversionService>;

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Server error in API handler");
        }

        let message = match &self {
            ServiceError::Upload(UploadError::Multipart(e)) => e.body_text(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

/// Handler for GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Handler for POST /convert
///
/// Accepts a multipart form with a `file` field and optional `keepAudio`
/// and `copyMetadata` (or `copyMeta`) fields; only `"0"` turns a flag off.
async fn convert(
    State(service): State<SharedService>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ServiceError> {
    let mut staged: Option<StagedUpload> = None;
    let mut options = ConversionOptions::default();

    if let Err(e) = read_form(&service, &mut multipart, &mut staged, &mut options).await {
        if let Some(upload) = staged {
            upload.discard().await;
        }
        return Err(e);
    }

    let upload = staged.ok_or(ServiceError::NoFileUploaded)?;
    let job_id = service.submit(upload, options).await?;
    Ok(Json(SubmitResponse { job_id }))
}

async fn read_form(
    service: &ConversionService,
    multipart: &mut Multipart,
    staged: &mut Option<StagedUpload>,
    options: &mut ConversionOptions,
) -> Result<(), ServiceError> {
    while let Some(mut field) = multipart.next_field().await.map_err(UploadError::from)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            // Only the first file is converted; later ones are skipped unread.
            // A `file` part without a filename is plain text, not an upload.
            Some("file") if staged.is_none() && field.file_name().is_some() => {
                *staged = Some(stage_upload(service.upload_dir(), &mut field).await?);
            }
            Some("keepAudio") => {
                options.keep_audio = flag_enabled(&field.text().await.map_err(UploadError::from)?);
            }
            Some("copyMetadata") | Some("copyMeta") => {
                options.copy_metadata =
                    flag_enabled(&field.text().await.map_err(UploadError::from)?);
            }
            _ => {}
        }
    }
    Ok(())
}

fn flag_enabled(value: &str) -> bool {
    value.trim() != "0"
}

/// Handler for GET /status/:job_id
async fn status(State(service): State<SharedService>, Path(job_id): Path<String>) -> Response {
    match service.status(&job_id) {
        Ok(view) => Json(view).into_response(),
        Err(ServiceError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "progress": 0, "error": "Not found" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for GET /download/:job_id
///
/// Streams the finished QuickTime file.
async fn download(State(service): State<SharedService>, Path(job_id): Path<String>) -> Response {
    let download = match service.open_download(&job_id).await {
        Ok(download) => download,
        Err(ServiceError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, "Not found").into_response()
        }
        Err(ServiceError::NotReady(_)) => {
            return (StatusCode::BAD_REQUEST, "Not ready").into_response()
        }
        Err(e) => return e.into_response(),
    };

    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    let body = Body::from_stream(ReaderStream::new(download.file));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "video/quicktime".to_string()),
            (header::CONTENT_LENGTH, download.len.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Creates the axum Router with all lifecycle endpoints
///
/// `max_upload_bytes` caps the request body accepted by `/convert`.
pub fn create_router(service: SharedService, max_upload_bytes: u64) -> Router {
    let routes = Router::new()
        .route("/health", get(health))
        .route("/convert", post(convert))
        .route("/status/:job_id", get(status))
        .route("/download/:job_id", get(download));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(
            usize::try_from(max_upload_bytes).unwrap_or(usize::MAX),
        ))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Runs the HTTP server on `host:port` until `shutdown` resolves
pub async fn run_server<F>(
    app: Router,
    host: &str,
    port: u16,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", host, port),
            source,
        })?;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}
