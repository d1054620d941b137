//! The chat relay: visitor messages in, capability tokens out.
//!
//! JSON API Endpoints:
//! - `POST /api/chat/relay` — post a visitor message into its thread, minting
//!   (or re-minting) the signed session token
//! - `GET  /api/chat/poll`  — fetch operator replies strictly after a cursor
//!
//! The service is stateless apart from the signing secret and a small
//! TTL-bounded creation guard that serializes racing first messages for the
//! same session, so one session gets one thread.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lru::LruCache;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use parley_core::cursor::PollCursor;
use parley_core::domain::{AuthorRole, ChannelId, SessionId, ThreadMessage, MESSAGE_MAX_CHARS};
use parley_core::errors::ChatError;
use parley_core::token::{sign, verify, TokenPayload};
use parley_slack::{thread_header, DirectoryError, ThreadDirectory, ThreadHandle};

const GUARD_CAPACITY: usize = 1_024;
const GUARD_TTL: Duration = Duration::from_secs(600);

/// Serializes thread creation per session id.
///
/// Each live session gets a cell holding the binding once created; racing
/// first messages lock the same cell, so the loser reuses the winner's
/// thread. Entries expire after a TTL and under capacity pressure, after
/// which the token itself is the only binding record - a re-race after
/// eviction can still create a second thread, which is accepted.
struct CreationGuard {
    cells: Mutex<LruCache<String, (Instant, BindingCell)>>,
    ttl: Duration,
}

type BindingCell = Arc<tokio::sync::Mutex<Option<ThreadHandle>>>;

impl CreationGuard {
    fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { cells: Mutex::new(LruCache::new(capacity)), ttl }
    }

    fn cell(&self, session_id: &str) -> BindingCell {
        let mut cells = match self.cells.lock() {
            Ok(cells) => cells,
            Err(poisoned) => poisoned.into_inner(),
        };
        match cells.get(session_id) {
            Some((stamped, cell)) if stamped.elapsed() < self.ttl => cell.clone(),
            _ => {
                let cell: BindingCell = Arc::new(tokio::sync::Mutex::new(None));
                cells.put(session_id.to_string(), (Instant::now(), cell.clone()));
                cell
            }
        }
    }
}

pub struct RelayInput {
    pub message: String,
    pub session_id: String,
    pub page_url: Option<String>,
    pub token: Option<String>,
    pub arrived_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayReply {
    pub token: String,
    pub thread_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReply {
    pub messages: Vec<ThreadMessage>,
    pub cursor: PollCursor,
}

pub struct RelayService {
    signing_secret: Option<SecretString>,
    channel_id: Option<ChannelId>,
    directory: Arc<dyn ThreadDirectory>,
    guard: CreationGuard,
    audit: Arc<dyn AuditSink>,
}

impl RelayService {
    pub fn new(
        signing_secret: Option<SecretString>,
        channel_id: Option<ChannelId>,
        directory: Arc<dyn ThreadDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            signing_secret,
            channel_id,
            directory,
            guard: CreationGuard::new(GUARD_CAPACITY, GUARD_TTL),
            audit,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.signing_secret.is_some() && self.channel_id.is_some()
    }

    /// Post a visitor message, lazily binding the session to a thread.
    ///
    /// A supplied token is used only when it verifies *and* its embedded
    /// session id equals the caller's; anything else counts as no token, so
    /// one session can never continue another session's thread.
    pub async fn relay(&self, input: RelayInput) -> Result<RelayReply, ChatError> {
        let correlation_id = Uuid::new_v4().to_string();
        let text = input.message.trim().to_string();
        if text.is_empty() {
            return Err(self.reject(&correlation_id, "message must not be empty"));
        }
        if input.message.chars().count() > MESSAGE_MAX_CHARS {
            let reason = format!("message must be {MESSAGE_MAX_CHARS} characters or fewer");
            return Err(self.reject(&correlation_id, reason));
        }
        if input.session_id.trim().is_empty() {
            return Err(self.reject(&correlation_id, "sessionId must not be empty"));
        }

        let secret = self.signing_secret.as_ref().ok_or(ChatError::NotConfigured)?;
        let channel = self.channel_id.clone().ok_or(ChatError::NotConfigured)?;
        let session = SessionId(input.session_id.clone());

        let supplied = input
            .token
            .as_deref()
            .and_then(|token| verify(token, secret.expose_secret().as_bytes()))
            .filter(|payload| payload.session_id == session);

        let (handle, created) = match supplied {
            Some(payload) => {
                (ThreadHandle { channel: payload.channel_id, thread: payload.thread_id }, false)
            }
            None => {
                let handle = self
                    .bind_thread(&channel, &session, input.page_url.as_deref(), input.arrived_at, &correlation_id)
                    .await?;
                (handle, true)
            }
        };

        let context = audit_context(&session, &handle, &correlation_id);

        self.directory
            .post_visitor_message(&handle, &text, &session)
            .await
            .map_err(relay_directory_error)?;
        self.emit(&context, "relay.message_posted", AuditCategory::Relay, AuditOutcome::Success);

        let payload = TokenPayload {
            session_id: session.clone(),
            channel_id: handle.channel.clone(),
            thread_id: handle.thread.clone(),
        };
        let token = sign(&payload, secret.expose_secret().as_bytes());
        if !created {
            self.emit(&context, "relay.token_reissued", AuditCategory::Relay, AuditOutcome::Success);
        }

        Ok(RelayReply { token, thread_id: handle.thread.0 })
    }

    /// Fetch operator replies strictly after `cursor`, advancing it to the
    /// last delivered position.
    pub async fn poll(&self, token: &str, cursor: &str) -> Result<PollReply, ChatError> {
        let secret = self.signing_secret.as_ref().ok_or(ChatError::NotConfigured)?;
        let payload = verify(token, secret.expose_secret().as_bytes())
            .ok_or(ChatError::Unauthorized)?;
        let handle = ThreadHandle { channel: payload.channel_id, thread: payload.thread_id };

        let mut cursor = PollCursor(cursor.to_string());
        let mut page =
            self.directory.replies_since(&handle, &cursor).await.map_err(poll_directory_error)?;
        page.messages.retain(|message| message.author == AuthorRole::Operator);

        if let Some(last) = page.messages.last() {
            cursor.advance(&last.ts);
            let context =
                audit_context(&payload.session_id, &handle, &Uuid::new_v4().to_string());
            self.emit(&context, "poll.messages_delivered", AuditCategory::Poll, AuditOutcome::Success);
        }

        Ok(PollReply { messages: page.messages, cursor })
    }

    async fn bind_thread(
        &self,
        channel: &ChannelId,
        session: &SessionId,
        page_url: Option<&str>,
        arrived_at: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<ThreadHandle, ChatError> {
        let cell = self.guard.cell(session.as_str());
        let mut slot = cell.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let header = thread_header(session, arrived_at, page_url);
        let handle = self
            .directory
            .create_thread(channel, &header)
            .await
            .map_err(relay_directory_error)?;
        *slot = Some(handle.clone());

        info!(
            session_id = session.as_str(),
            thread_id = handle.thread.as_str(),
            correlation_id,
            "conversation thread bound"
        );
        let context = audit_context(session, &handle, correlation_id);
        self.emit(&context, "relay.thread_created", AuditCategory::Relay, AuditOutcome::Success);
        Ok(handle)
    }

    fn reject(&self, correlation_id: &str, reason: impl Into<String>) -> ChatError {
        self.audit.emit(AuditEvent::new(
            None,
            None,
            correlation_id,
            "relay.message_rejected",
            AuditCategory::Ingress,
            "relay-service",
            AuditOutcome::Rejected,
        ));
        ChatError::invalid_input(reason)
    }

    fn emit(
        &self,
        context: &AuditContext,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) {
        self.audit.emit(AuditEvent::new(
            context.session_id.clone(),
            context.thread_id.clone(),
            context.correlation_id.clone(),
            event_type,
            category,
            context.actor.clone(),
            outcome,
        ));
    }
}

fn audit_context(session: &SessionId, handle: &ThreadHandle, correlation_id: &str) -> AuditContext {
    AuditContext::new(
        Some(session.clone()),
        Some(handle.thread.as_str().to_string()),
        correlation_id,
        "relay-service",
    )
}

fn relay_directory_error(error: DirectoryError) -> ChatError {
    warn!(%error, "thread directory call failed during relay");
    ChatError::DirectoryUnavailable { detail: error.to_string() }
}

fn poll_directory_error(error: DirectoryError) -> ChatError {
    match error {
        DirectoryError::ThreadNotReady => ChatError::ThreadNotReady,
        error => {
            warn!(%error, "thread directory call failed during poll");
            ChatError::DirectoryUnavailable { detail: error.to_string() }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP boundary
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RelayState {
    pub service: Arc<RelayService>,
}

pub fn router(service: Arc<RelayService>) -> Router {
    Router::new()
        .route("/api/chat/relay", post(relay_endpoint))
        .route("/api/chat/poll", get(poll_endpoint))
        .with_state(RelayState { service })
}

#[derive(Debug, Deserialize)]
pub struct RelayRequestBody {
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "pageUrl", default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RelaySuccess {
    success: bool,
    token: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Debug, Serialize)]
struct PollSuccess {
    success: bool,
    messages: Vec<PollMessage>,
    cursor: String,
}

#[derive(Debug, Serialize)]
struct PollMessage {
    id: String,
    text: String,
    ts: String,
}

#[derive(Debug, Serialize)]
pub struct ChatFailure {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry: Option<bool>,
}

fn failure_response(error: &ChatError) -> (StatusCode, Json<ChatFailure>) {
    let status = match error {
        ChatError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
        ChatError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        ChatError::DirectoryUnavailable { .. } => StatusCode::BAD_GATEWAY,
        ChatError::ThreadNotReady => StatusCode::SERVICE_UNAVAILABLE,
    };
    let retry = error.is_transient().then_some(true);
    (status, Json(ChatFailure { success: false, error: error.user_message(), retry }))
}

async fn relay_endpoint(
    State(state): State<RelayState>,
    Json(body): Json<RelayRequestBody>,
) -> Result<Json<RelaySuccess>, (StatusCode, Json<ChatFailure>)> {
    let arrived_at = body
        .timestamp
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let input = RelayInput {
        message: body.message,
        session_id: body.session_id,
        page_url: body.page_url,
        token: body.token,
        arrived_at,
    };

    match state.service.relay(input).await {
        Ok(reply) => {
            Ok(Json(RelaySuccess { success: true, token: reply.token, thread_id: reply.thread_id }))
        }
        Err(error) => Err(failure_response(&error)),
    }
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub token: String,
    #[serde(default)]
    pub cursor: Option<String>,
}

async fn poll_endpoint(
    State(state): State<RelayState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollSuccess>, (StatusCode, Json<ChatFailure>)> {
    match state.service.poll(&query.token, query.cursor.as_deref().unwrap_or_default()).await {
        Ok(reply) => Ok(Json(PollSuccess {
            success: true,
            messages: reply
                .messages
                .into_iter()
                .map(|message| PollMessage { id: message.id, text: message.text, ts: message.ts })
                .collect(),
            cursor: reply.cursor.0,
        })),
        Err(error) => Err(failure_response(&error)),
    }
}
