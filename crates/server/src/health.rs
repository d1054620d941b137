use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use parley_db::ContentStore;

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn ContentStore>,
    chat_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub chat: HealthCheck,
    pub checked_at: String,
}

pub fn router(store: Arc<dyn ContentStore>, chat_configured: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store, chat_configured })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.store.as_ref()).await;
    // An unconfigured chat is a deliberate deployment mode, not a degradation.
    let chat = if state.chat_configured {
        HealthCheck { status: "ready", detail: "chat relay credentials present".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "chat relay is not configured".to_string() }
    };

    let ready = store.status == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        store,
        chat,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(store: &dyn ContentStore) -> HealthCheck {
    match store.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "content store reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("content store ping failed: {error}") }
        }
    }
}
