//! The entity API: opaque JSON documents in named collections.
//!
//! The board's pages decide what lives here (messages, events, sponsors,
//! zmanim overrides); the backend enforces nothing beyond "payloads are
//! JSON objects". Responses return the stored object with the server id
//! injected as `id`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde_json::{Value, json};

use shulboard_core::{Document, Error, StoreDb, documents::validate_entity_name};

use crate::shell;

/// Shared state for the content handlers.
#[derive(Clone)]
pub struct ContentState {
    pub store: StoreDb,
    pub shell: Arc<String>,
}

/// Error wrapper that renders as a JSON body with a matching status.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Assemble the content router: shell, health, entity API.
pub fn build_router(state: ContentState) -> Router {
    Router::new()
        .route("/", get(shell::shell))
        .route("/healthz", get(healthz))
        .route("/api/{entity}", get(list).post(create))
        .route("/api/{entity}/{id}", get(fetch_one).put(update).delete(remove))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// The stored object with the server id injected.
fn document_json(document: &Document) -> Value {
    let mut body = document.data.clone();
    if let Value::Object(map) = &mut body {
        map.insert("id".to_string(), Value::String(document.id.clone()));
    }
    body
}

/// Reject non-object payloads and drop any client-supplied id.
fn sanitize_payload(mut payload: Value) -> Result<Value, Error> {
    match &mut payload {
        Value::Object(map) => {
            map.remove("id");
            Ok(payload)
        }
        _ => Err(Error::InvalidInput("payload must be a JSON object".to_string())),
    }
}

async fn list(
    State(state): State<ContentState>,
    Path(entity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_entity_name(&entity)?;
    let documents = state.store.list_documents(&entity).await?;
    Ok(Json(Value::Array(documents.iter().map(document_json).collect())))
}

async fn fetch_one(
    State(state): State<ContentState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    validate_entity_name(&entity)?;
    let document = state
        .store
        .get_document(&entity, &id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{entity}/{id}")))?;
    Ok(Json(document_json(&document)))
}

async fn create(
    State(state): State<ContentState>,
    Path(entity): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    validate_entity_name(&entity)?;
    let payload = sanitize_payload(payload)?;
    let document = state.store.create_document(&entity, &payload).await?;
    tracing::info!(entity, id = %document.id, "document created");
    Ok((StatusCode::CREATED, Json(document_json(&document))))
}

async fn update(
    State(state): State<ContentState>,
    Path((entity, id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    validate_entity_name(&entity)?;
    let payload = sanitize_payload(payload)?;
    let document = state
        .store
        .update_document(&entity, &id, &payload)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{entity}/{id}")))?;
    tracing::info!(entity, id = %document.id, "document updated");
    Ok(Json(document_json(&document)))
}

async fn remove(
    State(state): State<ContentState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    validate_entity_name(&entity)?;
    if state.store.delete_document(&entity, &id).await? {
        tracing::info!(entity, id, "document deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound(format!("{entity}/{id}")).into())
    }
}
