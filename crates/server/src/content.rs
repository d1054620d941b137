//! Content-admin CRUD over the ContentStore, behind the shared admin password.
//!
//! JSON API Endpoints (all require the `x-admin-password` header):
//! - `GET    /api/content/{collection}`      — list a collection
//! - `GET    /api/content/{collection}/{id}` — fetch one record
//! - `PUT    /api/content/{collection}/{id}` — create or replace a record
//! - `DELETE /api/content/{collection}/{id}` — delete a record

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::error;

use parley_db::{Collection, ContentRecord, ContentStore, StoreError};

#[derive(Clone)]
pub struct ContentState {
    pub store: Arc<dyn ContentStore>,
    pub admin_password: Option<SecretString>,
}

#[derive(Debug, Serialize)]
pub struct ContentError {
    pub error: String,
}

type ContentFailure = (StatusCode, Json<ContentError>);

pub fn router(store: Arc<dyn ContentStore>, admin_password: Option<SecretString>) -> Router {
    Router::new()
        .route("/api/content/{collection}", get(list_records))
        .route(
            "/api/content/{collection}/{id}",
            get(get_record).put(put_record).delete(delete_record),
        )
        .with_state(ContentState { store, admin_password })
}

fn authorize(headers: &HeaderMap, state: &ContentState) -> Result<(), ContentFailure> {
    let Some(password) = state.admin_password.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ContentError { error: "admin is not configured".to_string() }),
        ));
    };

    let provided = headers.get("x-admin-password").and_then(|value| value.to_str().ok());
    if provided != Some(password.expose_secret()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ContentError { error: "invalid admin password".to_string() }),
        ));
    }
    Ok(())
}

fn parse_collection(raw: &str) -> Result<Collection, ContentFailure> {
    Collection::parse(raw).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ContentError { error: format!("unknown collection `{raw}`") }),
        )
    })
}

fn store_failure(error: StoreError) -> ContentFailure {
    match error {
        StoreError::InvalidId { id } => (
            StatusCode::BAD_REQUEST,
            Json(ContentError { error: format!("invalid content id `{id}`") }),
        ),
        error => {
            error!(%error, "content store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ContentError { error: "content store unavailable".to_string() }),
            )
        }
    }
}

async fn list_records(
    Path(collection): Path<String>,
    State(state): State<ContentState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContentRecord>>, ContentFailure> {
    authorize(&headers, &state)?;
    let collection = parse_collection(&collection)?;
    let records = state.store.list(collection).await.map_err(store_failure)?;
    Ok(Json(records))
}

async fn get_record(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<ContentState>,
    headers: HeaderMap,
) -> Result<Json<ContentRecord>, ContentFailure> {
    authorize(&headers, &state)?;
    let collection = parse_collection(&collection)?;
    match state.store.get(collection, &id).await.map_err(store_failure)? {
        Some(record) => Ok(Json(record)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ContentError { error: format!("no `{id}` in {collection}") }),
        )),
    }
}

async fn put_record(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<ContentState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ContentRecord>, ContentFailure> {
    authorize(&headers, &state)?;
    let collection = parse_collection(&collection)?;
    if !body.is_object() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ContentError { error: "record body must be a JSON object".to_string() }),
        ));
    }

    let now = Utc::now();
    // An update keeps the original creation time.
    let created_at = state
        .store
        .get(collection, &id)
        .await
        .map_err(store_failure)?
        .map(|existing| existing.created_at)
        .unwrap_or(now);

    let record = ContentRecord { collection, id, body, created_at, updated_at: now };
    state.store.put(record.clone()).await.map_err(store_failure)?;
    Ok(Json(record))
}

async fn delete_record(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<ContentState>,
    headers: HeaderMap,
) -> Result<StatusCode, ContentFailure> {
    authorize(&headers, &state)?;
    let collection = parse_collection(&collection)?;
    if state.store.delete(collection, &id).await.map_err(store_failure)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ContentError { error: format!("no `{id}` in {collection}") }),
        ))
    }
}
