use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::CheckKind;
use crate::error::StoreError;
use crate::models::HostStatus;
use crate::store::CheckStore;

type AppState = State<Arc<CheckStore>>;

#[derive(Debug, Deserialize)]
pub struct HostRequest {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub notify_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub url: Option<String>,
}

pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotFound(_) | StoreError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::WrongKind { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn list_hosts(State(store): AppState) -> Json<Vec<HostStatus>> {
    Json(store.snapshot().await)
}

pub async fn get_host(State(store): AppState, Path(name): Path<String>) -> ApiResult<Json<HostStatus>> {
    Ok(Json(store.get_host(&name).await?))
}

pub async fn add_host(State(store): AppState, Json(req): Json<HostRequest>) -> ApiResult<(StatusCode, Json<HostStatus>)> {
    store.add_host(&req.name, &req.address, req.notify_url.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(store.get_host(&req.name).await?)))
}

pub async fn update_host(
    State(store): AppState,
    Path(name): Path<String>,
    Json(req): Json<HostRequest>,
) -> ApiResult<StatusCode> {
    store.update_host(&name, &req.name, &req.address, req.notify_url.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_host(State(store): AppState, Path(name): Path<String>) -> ApiResult<StatusCode> {
    store.delete_host(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_check(
    State(store): AppState,
    Path(name): Path<String>,
    Json(kind): Json<CheckKind>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let index = store.add_check(&name, kind).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "index": index }))))
}

pub async fn update_check(
    State(store): AppState,
    Path((name, index)): Path<(String, usize)>,
    Json(kind): Json<CheckKind>,
) -> ApiResult<StatusCode> {
    store.update_check(&name, index, kind).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_check(State(store): AppState, Path((name, index)): Path<(String, usize)>) -> ApiResult<StatusCode> {
    store.remove_check(&name, index).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_check(
    State(store): AppState,
    Path((name, index)): Path<(String, usize)>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<StatusCode> {
    store.toggle_check(&name, index, req.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_notify_url(
    State(store): AppState,
    Path(name): Path<String>,
    Json(req): Json<NotifyRequest>,
) -> ApiResult<StatusCode> {
    store.set_notify_url(&name, req.url.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_router(store: Arc<CheckStore>) -> Router {
    Router::new()
        .route("/api/hosts", get(list_hosts).post(add_host))
        .route("/api/hosts/{name}", get(get_host).put(update_host).delete(delete_host))
        .route("/api/hosts/{name}/checks", post(add_check))
        .route("/api/hosts/{name}/checks/{index}", put(update_check).delete(remove_check))
        .route("/api/hosts/{name}/checks/{index}/enabled", put(toggle_check))
        .route("/api/hosts/{name}/notify", put(set_notify_url))
        .fallback_service(ServeDir::new("public"))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn start_server(port: u16, store: Arc<CheckStore>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard: http://localhost:{}", addr.port());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
