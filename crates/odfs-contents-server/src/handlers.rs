//! HTTP handlers for the contents API.
//!
//! Implements:
//! - GET /health - Health check endpoint
//! - GET/PUT/POST/PATCH/DELETE /api/contents/{path} - Contents models
//! - GET/POST /api/contents/{path}/checkpoints - List and create checkpoints
//! - GET/POST/DELETE /api/contents/{path}/checkpoints/{id} - Read, restore
//!   and delete a checkpoint

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use odfs_contents_core::{ContentType, SaveModel};
use odfs_contents_manager::ContentsManager;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, Result};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContentsManager>,
}

/// Routes of the contents API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/contents", any(contents_root_handler))
        .route("/api/contents/{*rest}", any(contents_handler))
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
}

/// GET /health - Health check endpoint.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Query parameters of GET on a contents path.
#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub format: Option<String>,
    pub content: Option<String>,
}

/// Body of POST on a contents path.
#[derive(Debug, Default, Deserialize)]
struct CreateRequest {
    copy_from: Option<String>,
    #[serde(rename = "type")]
    content_type: Option<ContentType>,
    ext: Option<String>,
}

/// Body of PATCH on a contents path.
#[derive(Debug, Default, Deserialize)]
struct RenameRequest {
    path: Option<String>,
}

/// What a request path under /api/contents addresses.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    Entry(&'a str),
    Checkpoints(&'a str),
    Checkpoint(&'a str, &'a str),
}

fn parse_target(rest: &str) -> Target<'_> {
    let rest = rest.trim_end_matches('/');
    if let Some(path) = rest.strip_suffix("/checkpoints") {
        return Target::Checkpoints(path);
    }
    if let Some((path, id)) = rest.rsplit_once("/checkpoints/") {
        if !id.is_empty() && !id.contains('/') {
            return Target::Checkpoint(path, id);
        }
    }
    Target::Entry(rest)
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

/// ANY /api/contents - The root directory.
pub async fn contents_root_handler(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<GetParams>,
    body: Bytes,
) -> Result<Response> {
    dispatch(&state, method, "", params, body).await
}

/// ANY /api/contents/{*rest} - A file, document or directory, or its checkpoints.
pub async fn contents_handler(
    State(state): State<AppState>,
    method: Method,
    Path(rest): Path<String>,
    Query(params): Query<GetParams>,
    body: Bytes,
) -> Result<Response> {
    dispatch(&state, method, &rest, params, body).await
}

async fn dispatch(
    state: &AppState,
    method: Method,
    rest: &str,
    params: GetParams,
    body: Bytes,
) -> Result<Response> {
    let manager = &state.manager;
    debug!("{} /api/contents/{}", method, rest);

    match (parse_target(rest), method) {
        (Target::Entry(path), Method::GET) => {
            let content_type = params
                .content_type
                .as_deref()
                .map(|t| t.parse::<ContentType>())
                .transpose()
                .map_err(ApiError::BadRequest)?;
            let include_content = params.content.as_deref() != Some("0");
            let model = manager
                .get(path, include_content, content_type, params.format.as_deref())
                .await?;
            Ok(Json(model).into_response())
        }
        (Target::Entry(path), Method::PUT) => {
            let model: SaveModel = parse_body(&body)?;
            let existed = manager.exists(path).await?;
            let saved = manager.save(model, path).await?;
            let status = if existed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            Ok((status, Json(saved)).into_response())
        }
        (Target::Entry(path), Method::POST) => {
            if manager.file_exists(path).await? {
                return Err(ApiError::BadRequest(
                    "Cannot POST to files, use PUT instead.".to_string(),
                ));
            }
            let request: CreateRequest = parse_body(&body)?;
            let model = match request.copy_from {
                Some(from) => manager.copy(&from, Some(path)).await?,
                None => {
                    manager
                        .new_untitled(
                            path,
                            request.content_type,
                            request.ext.as_deref().unwrap_or(""),
                        )
                        .await?
                }
            };
            Ok((StatusCode::CREATED, Json(model)).into_response())
        }
        (Target::Entry(path), Method::PATCH) => {
            let request: RenameRequest = parse_body(&body)?;
            let new_path = request
                .path
                .ok_or_else(|| ApiError::BadRequest("Missing new path".to_string()))?;
            let model = manager.rename(path, &new_path).await?;
            Ok(Json(model).into_response())
        }
        (Target::Entry(path), Method::DELETE) => {
            manager.delete(path).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        (Target::Checkpoints(path), Method::GET) => {
            let listing = manager.list_checkpoints(path).await?;
            Ok(Json(listing.items).into_response())
        }
        (Target::Checkpoints(path), Method::POST) => {
            let checkpoint = manager.create_checkpoint(path).await?;
            Ok((StatusCode::CREATED, Json(checkpoint)).into_response())
        }
        (Target::Checkpoint(path, id), Method::GET) => {
            let content = manager.get_checkpoint(path, id).await?;
            Ok(Json(content).into_response())
        }
        (Target::Checkpoint(path, id), Method::POST) => {
            manager.restore_checkpoint(path, id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        (Target::Checkpoint(path, id), Method::DELETE) => {
            manager.delete_checkpoint(path, id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}
