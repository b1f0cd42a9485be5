//! HTTP surface: JSON-over-POST endpoints in front of [`Pipeline`].
//!
//! Input validation happens here, before any provider is contacted. Errors
//! leave as `{ "error": .., "rawOutput"?: .. }` with generic wording; provider
//! detail stays in the logs.

use crate::models::{
    AlternateImageRequest, Config, DescribeResponse, GenerationCopy, GenerationRequest,
    GenerationResponse, ImageUrlResponse,
};
use crate::pipeline::Pipeline;
use crate::{Error, Result};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Capability check supplied by the embedding application.
pub trait AccessPolicy: Send + Sync {
    fn allows(&self, headers: &HeaderMap) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn allows(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AccessPolicy for BearerToken {
    fn allows(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| constant_time_eq(token.as_bytes(), self.token.as_bytes()))
    }
}

/// Byte equality whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    access: Arc<dyn AccessPolicy>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            access: Arc::new(OpenAccess),
        }
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let state = Self::new(Pipeline::from_config(config));
        match &config.access_token {
            Some(token) => {
                info!("ACCESS_TOKEN set; /api requires a bearer token");
                state.with_access_policy(Arc::new(BearerToken::new(token.clone())))
            }
            None => state,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/describe", post(describe))
        .route("/generation", post(generation))
        .route("/generation/full", post(generation_full))
        .route("/render-image", post(render_image))
        .route("/alternate-image", post(alternate_image))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    raw_output: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            raw_output: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Map a pipeline error; `fallback` is the only text shown for transport failures.
    fn from_error(err: Error, fallback: &str) -> Self {
        match err {
            Error::Validation(message) => Self::bad_request(message),
            Error::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            Error::Generation(detail) => {
                warn!("Structured generation failed: {}", detail);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AI response was not valid JSON. Please try again.",
                )
            }
            Error::ImageRender {
                message,
                raw_output,
            } => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
                raw_output: Some(raw_output),
            },
            other => {
                error!("Request failed: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, fallback)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.raw_output {
            Some(raw_output) => json!({ "error": self.message, "rawOutput": raw_output }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn parse_object(body: &Bytes) -> std::result::Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

/// String field value; absent, non-string and blank values all read as `None`.
fn string_field(body: &Map<String, Value>, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn required_field(
    body: &Map<String, Value>,
    field: &str,
) -> std::result::Result<String, ApiError> {
    string_field(body, field)
        .ok_or_else(|| ApiError::bad_request(format!("Missing or invalid {}", field)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn describe(State(state): State<AppState>, body: Bytes) -> ApiResult<DescribeResponse> {
    let body = parse_object(&body)?;
    let request = GenerationRequest {
        data: required_field(&body, "data")?,
        image_query: string_field(&body, "imageQuery"),
    };

    let response = state.pipeline.describe(&request).await.map_err(|e| {
        ApiError::from_error(e, "Failed to get response from text or image provider.")
    })?;
    Ok(Json(response))
}

async fn generation(State(state): State<AppState>, body: Bytes) -> ApiResult<GenerationCopy> {
    let body = parse_object(&body)?;
    let data = required_field(&body, "data")?;

    let copy = state
        .pipeline
        .generate_copy(&data)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to generate insight."))?;
    Ok(Json(copy))
}

async fn generation_full(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<GenerationResponse> {
    let body = parse_object(&body)?;
    let data = required_field(&body, "data")?;

    let response = state
        .pipeline
        .generate(&data)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to generate insight."))?;
    Ok(Json(response))
}

async fn render_image(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ImageUrlResponse> {
    let body = parse_object(&body)?;
    let prompt = required_field(&body, "prompt")?;

    let image_url = state
        .pipeline
        .render_image(&prompt)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to generate image."))?;
    Ok(Json(ImageUrlResponse { image_url }))
}

async fn alternate_image(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ImageUrlResponse> {
    let body = parse_object(&body)?;
    let request = AlternateImageRequest {
        search_term: string_field(&body, "searchTerm"),
        data: string_field(&body, "data"),
        current_image_url: string_field(&body, "currentImageUrl"),
    };

    let image_url = state
        .pipeline
        .change_image(&request)
        .await
        .map_err(|e| ApiError::from_error(e, "Failed to fetch alternate image."))?;
    Ok(Json(ImageUrlResponse { image_url }))
}

async fn require_access(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.access.allows(request.headers()) {
        warn!("Rejected request without valid access token");
        return ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(request).await
}

async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    async move {
        let mut response = next.run(request).await;
        info!("Completed with status {}", response.status());
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}
