//! Slack integration - the Thread Directory backing the chat relay
//!
//! This crate provides the messaging-backend interface for parley:
//! - **Thread Directory** (`directory`) - create/post/read-since-cursor over
//!   per-visitor conversation threads
//! - **Web API client** (`api`) - `chat.postMessage` + `conversations.replies`
//!   over HTTPS with tagged error kinds
//! - **Outbound notifier** (`notify`) - channel notifications (lead capture)
//!   and message formatting
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Grant `chat:write` and `channels:history` bot scopes
//! 3. Set `PARLEY_CHAT_BOT_TOKEN` and `PARLEY_CHAT_CHANNEL_ID`
//!
//! # Key Types
//!
//! - `ThreadDirectory` - capability trait the relay service depends on
//! - `SlackThreadDirectory` - reqwest-backed implementation
//! - `DirectoryError` - tagged error kinds; control flow never inspects
//!   backend error strings outside this crate

pub mod api;
pub mod directory;
pub mod notify;

pub use api::SlackThreadDirectory;
pub use directory::{
    DirectoryError, NoopThreadDirectory, PostedMessage, ThreadDirectory, ThreadHandle, ThreadPage,
};
pub use notify::{lead_notification, thread_header, MessageTemplate, NoopNotifier, OutboundNotifier};
