//! Lead capture: validate the submission, forward it to the leads channel.
//!
//! JSON API Endpoints:
//! - `POST /api/leads` — validate a `LeadRecord` and notify the leads channel

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use parley_core::domain::ChannelId;
use parley_core::lead::LeadRecord;
use parley_slack::{lead_notification, OutboundNotifier};

#[derive(Clone)]
pub struct LeadsState {
    pub notifier: Arc<dyn OutboundNotifier>,
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(notifier: Arc<dyn OutboundNotifier>, channel_id: Option<ChannelId>) -> Router {
    Router::new()
        .route("/api/leads", post(submit_lead))
        .with_state(LeadsState { notifier, channel_id })
}

async fn submit_lead(
    State(state): State<LeadsState>,
    Json(lead): Json<LeadRecord>,
) -> (StatusCode, Json<LeadResponse>) {
    if let Err(error) = lead.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LeadResponse { success: false, error: Some(error.to_string()) }),
        );
    }

    let Some(channel_id) = state.channel_id.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(LeadResponse {
                success: false,
                error: Some("lead capture is not configured".to_string()),
            }),
        );
    };

    match state.notifier.notify(channel_id, &lead_notification(&lead)).await {
        Ok(()) => {
            info!(source = lead.source.as_deref().unwrap_or("unknown"), "lead forwarded");
            (StatusCode::OK, Json(LeadResponse { success: true, error: None }))
        }
        Err(error) => {
            warn!(%error, "lead notification failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(LeadResponse {
                    success: false,
                    error: Some("we could not record your enquiry; please call us".to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use tokio::sync::Mutex;

    use parley_core::domain::ChannelId;
    use parley_core::lead::LeadRecord;
    use parley_slack::{DirectoryError, MessageTemplate, OutboundNotifier};

    use super::{submit_lead, LeadsState};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(ChannelId, MessageTemplate)>>,
        fail: bool,
    }

    #[async_trait]
    impl OutboundNotifier for RecordingNotifier {
        async fn notify(
            &self,
            channel: &ChannelId,
            message: &MessageTemplate,
        ) -> Result<(), DirectoryError> {
            if self.fail {
                return Err(DirectoryError::Transport("down".to_string()));
            }
            self.sent.lock().await.push((channel.clone(), message.clone()));
            Ok(())
        }
    }

    fn lead() -> LeadRecord {
        LeadRecord {
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            company: None,
            project_type: Some("redesign".to_string()),
            message: "We need a new site.".to_string(),
            source: Some("pricing-page".to_string()),
            region: None,
        }
    }

    #[tokio::test]
    async fn valid_lead_is_forwarded_to_the_channel() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = LeadsState {
            notifier: notifier.clone(),
            channel_id: Some(ChannelId("C0LEADS01".to_string())),
        };

        let (status, Json(body)) = submit_lead(State(state), Json(lead())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "C0LEADS01");
        assert!(sent[0].1.fallback_text.contains("jane@example.com"));
    }

    #[tokio::test]
    async fn invalid_lead_reports_every_field_failure() {
        let state = LeadsState {
            notifier: Arc::new(RecordingNotifier::default()),
            channel_id: Some(ChannelId("C0LEADS01".to_string())),
        };
        let mut bad = lead();
        bad.name = String::new();
        bad.email = "not-an-email".to_string();

        let (status, Json(body)) = submit_lead(State(state), Json(bad)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = body.error.expect("failure detail");
        assert!(error.contains("name"));
        assert!(error.contains("email"));
    }

    #[tokio::test]
    async fn missing_channel_answers_not_configured() {
        let state =
            LeadsState { notifier: Arc::new(RecordingNotifier::default()), channel_id: None };

        let (status, Json(body)) = submit_lead(State(state), Json(lead())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.as_deref(), Some("lead capture is not configured"));
    }

    #[tokio::test]
    async fn notifier_failure_maps_to_bad_gateway() {
        let state = LeadsState {
            notifier: Arc::new(RecordingNotifier { fail: true, ..RecordingNotifier::default() }),
            channel_id: Some(ChannelId("C0LEADS01".to_string())),
        };

        let (status, Json(body)) = submit_lead(State(state), Json(lead())).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body.success);
        assert!(!body.error.unwrap_or_default().contains("down"));
    }
}
