//! Axum surface of the delivery service.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use mime_guess::MimeGuess;
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error};

use crate::catalogue::FormatCatalogue;
use crate::config::ServiceConfig;
use crate::delivery::{DeliveryService, DownloadArtifact};
use crate::error::DeliveryError;
use crate::extractor::YtDlpExtractor;
use crate::media::VideoRequest;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    delivery: Arc<DeliveryService>,
}

impl AppState {
    pub fn new(delivery: DeliveryService) -> Self {
        Self {
            delivery: Arc::new(delivery),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn internal(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind,
            message: message.into(),
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        Self::internal(err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "kind": self.kind,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Wires the production extractor and the optional catalogue from config.
pub fn build_app(config: &ServiceConfig) -> Result<Router> {
    let extractor = Arc::new(YtDlpExtractor::new(config.yt_dlp.clone()));
    let delivery = DeliveryService::new(config.output_dir.clone(), extractor)
        .with_catalogue(config.catalogue_dir.clone().map(FormatCatalogue::new));
    Ok(router(AppState::new(delivery), config.client_origin_header()?))
}

pub fn router(state: AppState, client_origin: HeaderValue) -> Router {
    Router::new()
        .route("/video", get(deliver_video))
        .route("/health", get(health))
        .layer(cors_layer(client_origin))
        .with_state(state)
}

/// Only the configured client may read responses, and it needs to see
/// `Content-Disposition` to learn the attachment name.
fn cors_layer(client_origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(client_origin))
        .allow_methods([Method::GET])
        .expose_headers([header::CONTENT_DISPOSITION])
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn deliver_video(
    State(state): State<AppState>,
    Query(request): Query<VideoRequest>,
) -> ApiResult<Response> {
    debug!(url = %request.url, "delivery requested");
    let artifact = state.delivery.deliver(&request.url).await.map_err(|err| {
        error!("Delivery failed for {}: {err}", request.url);
        ApiError::from(err)
    })?;

    let (file, size) = artifact.open().await?;
    let response = attachment_response(file, size, &artifact)?;
    artifact.spawn_bookkeeping();
    Ok(response)
}

fn attachment_response(file: File, size: u64, artifact: &DownloadArtifact) -> ApiResult<Response> {
    let download_name = artifact.download_name();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{download_name}\""))
        .map_err(|_| ApiError::internal("storage_failure", "could not name the download"))?;
    let content_type = MimeGuess::from_path(&download_name)
        .first()
        .and_then(|mime| HeaderValue::from_str(mime.as_ref()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    Ok(response)
}
