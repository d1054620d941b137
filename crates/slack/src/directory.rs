use async_trait::async_trait;
use thiserror::Error;

use parley_core::cursor::PollCursor;
use parley_core::domain::{ChannelId, SessionId, ThreadId, ThreadMessage};

use crate::notify::MessageTemplate;

/// Location of a conversation thread inside its channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadHandle {
    pub channel: ChannelId,
    pub thread: ThreadId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub ts: String,
}

/// One page of thread messages strictly after a cursor position, in append
/// order. `latest_ts` is the position of the last message in the page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub messages: Vec<ThreadMessage>,
    pub latest_ts: Option<String>,
}

/// Tagged failure kinds for directory operations. Backend error strings are
/// mapped into these in exactly one place (`api::map_slack_error`); nothing
/// downstream branches on error text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory credentials were rejected")]
    Auth,
    #[error("destination channel does not exist or the bot is not a member")]
    ChannelNotFound,
    #[error("conversation thread no longer exists")]
    ThreadNotFound,
    #[error("conversation thread is not yet queryable")]
    ThreadNotReady,
    #[error("directory rate limit reached")]
    RateLimited,
    #[error("directory transport failure: {0}")]
    Transport(String),
    #[error("unexpected directory response: {0}")]
    Protocol(String),
}

impl DirectoryError {
    /// True for conditions a caller should back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ThreadNotReady | Self::RateLimited | Self::Transport(_))
    }
}

/// External messaging backend holding the per-visitor conversation threads.
///
/// Threads are append-only and never deleted by this subsystem; operator
/// replies arrive out of band, directly in the backend.
#[async_trait]
pub trait ThreadDirectory: Send + Sync {
    /// Create a new conversation thread rooted at a header message.
    async fn create_thread(
        &self,
        channel: &ChannelId,
        header: &MessageTemplate,
    ) -> Result<ThreadHandle, DirectoryError>;

    /// Append a visitor message to an existing thread, tagged with the visitor
    /// role and session id so polling can filter the echo back out.
    async fn post_visitor_message(
        &self,
        handle: &ThreadHandle,
        text: &str,
        session_id: &SessionId,
    ) -> Result<PostedMessage, DirectoryError>;

    /// Read the thread's messages strictly after `cursor` (from the start of
    /// the thread when the cursor is empty), each classified by author role.
    async fn replies_since(
        &self,
        handle: &ThreadHandle,
        cursor: &PollCursor,
    ) -> Result<ThreadPage, DirectoryError>;
}

/// Inert directory for deployments without chat credentials and for wiring
/// tests. Creates a fixed thread position and never returns replies.
#[derive(Default)]
pub struct NoopThreadDirectory;

#[async_trait]
impl ThreadDirectory for NoopThreadDirectory {
    async fn create_thread(
        &self,
        channel: &ChannelId,
        _header: &MessageTemplate,
    ) -> Result<ThreadHandle, DirectoryError> {
        Ok(ThreadHandle { channel: channel.clone(), thread: ThreadId("0.000000".to_string()) })
    }

    async fn post_visitor_message(
        &self,
        _handle: &ThreadHandle,
        _text: &str,
        _session_id: &SessionId,
    ) -> Result<PostedMessage, DirectoryError> {
        Ok(PostedMessage { ts: "0.000001".to_string() })
    }

    async fn replies_since(
        &self,
        _handle: &ThreadHandle,
        _cursor: &PollCursor,
    ) -> Result<ThreadPage, DirectoryError> {
        Ok(ThreadPage::default())
    }
}
