//! Slack Web API implementation of the Thread Directory.
//!
//! Two endpoints carry the whole protocol: `chat.postMessage` roots a new
//! thread (and appends visitor messages into it), `conversations.replies`
//! reads the thread back from a cursor position. Every Slack `ok: false`
//! error code is mapped into a tagged [`DirectoryError`] kind in exactly one
//! place; nothing outside this module inspects backend error strings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use parley_core::cursor::PollCursor;
use parley_core::domain::{AuthorRole, ChannelId, SessionId, ThreadId, ThreadMessage};

use crate::directory::{DirectoryError, PostedMessage, ThreadDirectory, ThreadHandle, ThreadPage};
use crate::notify::{Block, MessageTemplate, OutboundNotifier};

const SLACK_API_BASE: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const REPLIES_PAGE_LIMIT: u32 = 200;

/// Metadata event type tagged onto every message the relay posts on a
/// visitor's behalf, so polling can tell visitor echoes from operator replies.
pub const VISITOR_EVENT_TYPE: &str = "visitor_message";

pub struct SlackThreadDirectory {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackThreadDirectory {
    pub fn new(bot_token: SecretString) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| DirectoryError::Transport(error.to_string()))?;
        Ok(Self { client, base_url: SLACK_API_BASE.to_string(), bot_token })
    }

    /// Point the client at a different API host (proxy or test double).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_message(&self, request: &PostMessageRequest<'_>) -> Result<String, DirectoryError> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(DirectoryError::RateLimited);
        }
        if !status.is_success() {
            return Err(DirectoryError::Protocol(format!("chat.postMessage answered {status}")));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|error| DirectoryError::Protocol(format!("undecodable postMessage response: {error}")))?;

        if !body.ok {
            let code = body.error.as_deref().unwrap_or("unknown_error");
            warn!(channel = request.channel, code, "chat.postMessage rejected");
            return Err(map_slack_error(code));
        }

        body.ts.ok_or_else(|| {
            DirectoryError::Protocol("chat.postMessage succeeded without a ts".to_string())
        })
    }
}

#[async_trait]
impl ThreadDirectory for SlackThreadDirectory {
    async fn create_thread(
        &self,
        channel: &ChannelId,
        header: &MessageTemplate,
    ) -> Result<ThreadHandle, DirectoryError> {
        let ts = self
            .post_message(&PostMessageRequest {
                channel: channel.as_str(),
                text: &header.fallback_text,
                blocks: Some(&header.blocks),
                thread_ts: None,
                metadata: None,
            })
            .await?;

        debug!(channel = channel.as_str(), thread = %ts, "conversation thread created");
        Ok(ThreadHandle { channel: channel.clone(), thread: ThreadId(ts) })
    }

    async fn post_visitor_message(
        &self,
        handle: &ThreadHandle,
        text: &str,
        session_id: &SessionId,
    ) -> Result<PostedMessage, DirectoryError> {
        let metadata = MessageMetadata {
            event_type: VISITOR_EVENT_TYPE.to_string(),
            event_payload: json!({ "session_id": session_id.as_str() }),
        };
        let ts = self
            .post_message(&PostMessageRequest {
                channel: handle.channel.as_str(),
                text,
                blocks: None,
                thread_ts: Some(handle.thread.as_str()),
                metadata: Some(metadata),
            })
            .await?;

        Ok(PostedMessage { ts })
    }

    async fn replies_since(
        &self,
        handle: &ThreadHandle,
        cursor: &PollCursor,
    ) -> Result<ThreadPage, DirectoryError> {
        let url = format!("{}/conversations.replies", self.base_url);
        let limit = REPLIES_PAGE_LIMIT.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("channel", handle.channel.as_str()),
            ("ts", handle.thread.as_str()),
            ("limit", &limit),
        ];
        if !cursor.is_start() {
            query.push(("oldest", cursor.as_str()));
            query.push(("inclusive", "false"));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(DirectoryError::RateLimited);
        }
        if !status.is_success() {
            return Err(DirectoryError::Protocol(format!("conversations.replies answered {status}")));
        }

        let body: RepliesResponse = response
            .json()
            .await
            .map_err(|error| DirectoryError::Protocol(format!("undecodable replies response: {error}")))?;

        if !body.ok {
            let code = body.error.as_deref().unwrap_or("unknown_error");
            return match map_slack_error(code) {
                // Threads are never deleted by this subsystem, so a missing
                // thread on read is an indexing delay on a fresh root, not a
                // terminal condition.
                DirectoryError::ThreadNotFound => Err(DirectoryError::ThreadNotReady),
                error => Err(error),
            };
        }

        Ok(assemble_page(body.messages, handle.thread.as_str(), cursor))
    }
}

#[async_trait]
impl OutboundNotifier for SlackThreadDirectory {
    async fn notify(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<(), DirectoryError> {
        self.post_message(&PostMessageRequest {
            channel: channel.as_str(),
            text: &message.fallback_text,
            blocks: Some(&message.blocks),
            thread_ts: None,
            metadata: None,
        })
        .await?;
        Ok(())
    }
}

/// Collapse a thread page to the operator-authored messages strictly after
/// `cursor`, in append order.
///
/// Slack always includes the thread root in a replies page regardless of
/// `oldest`; the root is the bot-authored header, so the author filter drops
/// it along with visitor echoes. The cursor probe re-checks ordering so a
/// boundary message the backend re-serves is never delivered twice.
fn assemble_page(replies: Vec<SlackReply>, thread_ts: &str, cursor: &PollCursor) -> ThreadPage {
    let mut probe = cursor.clone();
    let mut messages = Vec::new();

    for reply in replies {
        if !is_operator_reply(&reply, thread_ts) {
            continue;
        }
        if !probe.advance(&reply.ts) {
            continue;
        }
        messages.push(ThreadMessage {
            id: reply.client_msg_id.unwrap_or_else(|| reply.ts.clone()),
            text: reply.text,
            ts: reply.ts,
            author: AuthorRole::Operator,
        });
    }

    let latest_ts = messages.last().map(|message| message.ts.clone());
    ThreadPage { messages, latest_ts }
}

/// A reply counts as operator-authored only when a human wrote it directly in
/// the thread: a `user` id, no `bot_id`, no subtype (joins, edits, etc.), and
/// no visitor metadata from the relay itself.
fn is_operator_reply(reply: &SlackReply, thread_ts: &str) -> bool {
    if reply.ts == thread_ts {
        return false;
    }
    if reply.user.is_none() || reply.bot_id.is_some() || reply.subtype.is_some() {
        return false;
    }
    !matches!(&reply.metadata, Some(metadata) if metadata.event_type == VISITOR_EVENT_TYPE)
}

fn transport_error(error: reqwest::Error) -> DirectoryError {
    if error.is_timeout() {
        DirectoryError::Transport("request timed out".to_string())
    } else {
        DirectoryError::Transport(error.to_string())
    }
}

/// The single Slack-error-code decision point.
fn map_slack_error(code: &str) -> DirectoryError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" | "missing_scope" => DirectoryError::Auth,
        "channel_not_found" | "not_in_channel" | "is_archived" => DirectoryError::ChannelNotFound,
        "thread_not_found" | "message_not_found" => DirectoryError::ThreadNotFound,
        "ratelimited" | "rate_limited" => DirectoryError::RateLimited,
        other => DirectoryError::Protocol(format!("slack error `{other}`")),
    }
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a [Block]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MessageMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageMetadata {
    event_type: String,
    event_payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackReply>,
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ts: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    client_msg_id: Option<String>,
    #[serde(default)]
    metadata: Option<MessageMetadata>,
}

#[cfg(test)]
mod tests {
    use super::{assemble_page, is_operator_reply, map_slack_error, RepliesResponse, SlackReply};
    use crate::directory::DirectoryError;
    use parley_core::cursor::PollCursor;

    const THREAD_TS: &str = "1730000000.000100";

    fn operator_reply(ts: &str, text: &str) -> SlackReply {
        SlackReply {
            ts: ts.to_string(),
            text: text.to_string(),
            user: Some("U0OPERATOR".to_string()),
            bot_id: None,
            subtype: None,
            client_msg_id: None,
            metadata: None,
        }
    }

    #[test]
    fn error_codes_map_to_tagged_kinds() {
        assert_eq!(map_slack_error("invalid_auth"), DirectoryError::Auth);
        assert_eq!(map_slack_error("token_revoked"), DirectoryError::Auth);
        assert_eq!(map_slack_error("channel_not_found"), DirectoryError::ChannelNotFound);
        assert_eq!(map_slack_error("not_in_channel"), DirectoryError::ChannelNotFound);
        assert_eq!(map_slack_error("thread_not_found"), DirectoryError::ThreadNotFound);
        assert_eq!(map_slack_error("ratelimited"), DirectoryError::RateLimited);
        assert!(matches!(map_slack_error("fatal_error"), DirectoryError::Protocol(_)));
    }

    #[test]
    fn thread_root_and_bot_messages_are_not_operator_replies() {
        let root = operator_reply(THREAD_TS, "New website chat");
        assert!(!is_operator_reply(&root, THREAD_TS));

        let mut bot = operator_reply("1730000001.000200", "automated");
        bot.bot_id = Some("B0RELAY".to_string());
        assert!(!is_operator_reply(&bot, THREAD_TS));

        let mut join = operator_reply("1730000002.000300", "joined");
        join.subtype = Some("channel_join".to_string());
        assert!(!is_operator_reply(&join, THREAD_TS));
    }

    #[test]
    fn visitor_echoes_are_filtered_by_metadata() {
        let raw = format!(
            r#"{{
                "ok": true,
                "messages": [
                    {{"ts": "{THREAD_TS}", "text": "New website chat", "bot_id": "B0RELAY"}},
                    {{"ts": "1730000001.000200", "text": "Hello", "bot_id": "B0RELAY",
                      "metadata": {{"event_type": "visitor_message", "event_payload": {{"session_id": "sess-1"}}}}}},
                    {{"ts": "1730000002.000300", "text": "Hi there!", "user": "U0OPERATOR",
                      "client_msg_id": "d2f1"}}
                ]
            }}"#
        );
        let decoded: RepliesResponse = serde_json::from_str(&raw).expect("fixture should decode");

        let page = assemble_page(decoded.messages, THREAD_TS, &PollCursor::start());
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].text, "Hi there!");
        assert_eq!(page.messages[0].id, "d2f1");
        assert_eq!(page.latest_ts.as_deref(), Some("1730000002.000300"));
    }

    #[test]
    fn boundary_messages_at_or_before_the_cursor_are_dropped() {
        let replies = vec![
            operator_reply("1730000002.000300", "already delivered"),
            operator_reply("1730000003.000400", "new"),
        ];

        let cursor = PollCursor("1730000002.000300".to_string());
        let page = assemble_page(replies, THREAD_TS, &cursor);
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].text, "new");
    }

    #[test]
    fn empty_page_leaves_latest_ts_unset() {
        let page = assemble_page(Vec::new(), THREAD_TS, &PollCursor::start());
        assert!(page.messages.is_empty());
        assert_eq!(page.latest_ts, None);
    }

    #[test]
    fn replies_arrive_in_append_order() {
        let replies = vec![
            operator_reply("1730000001.000200", "first"),
            operator_reply("1730000002.000300", "second"),
            operator_reply("1730000003.000400", "third"),
        ];

        let page = assemble_page(replies, THREAD_TS, &PollCursor::start());
        let texts: Vec<&str> = page.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }
}
