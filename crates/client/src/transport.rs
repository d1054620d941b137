use async_trait::async_trait;

use parley_core::cursor::PollCursor;
use parley_core::domain::{SessionId, ThreadId, ThreadMessage};
use parley_core::errors::ChatError;

/// Client-local key/value persistence (localStorage in the real widget).
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

/// The relay and poll endpoints as the widget sees them.
///
/// Both operations are bounded request/response calls; implementations own
/// the request timeout, and a timed-out call surfaces as
/// [`ChatError::DirectoryUnavailable`].
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn relay(&self, request: RelayRequest) -> Result<RelayOutcome, ChatError>;

    async fn poll(&self, token: &str, cursor: &PollCursor) -> Result<PollOutcome, ChatError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub message: String,
    pub timestamp: String,
    pub session_id: SessionId,
    pub page_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayOutcome {
    pub token: String,
    pub thread_id: ThreadId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub messages: Vec<ThreadMessage>,
    pub cursor: PollCursor,
}
