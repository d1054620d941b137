use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_core::domain::{ChannelId, SessionId};
use parley_core::lead::LeadRecord;

use crate::directory::DirectoryError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// A formatted outbound message: rich blocks plus the plain fallback used by
/// notification previews and accessibility clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section(mut self, block_id: impl Into<String>, text: TextObject) -> Self {
        self.blocks.push(Block::Section { block_id: block_id.into(), text });
        self
    }

    pub fn context(mut self, block_id: impl Into<String>, elements: Vec<TextObject>) -> Self {
        self.blocks.push(Block::Context { block_id: block_id.into(), elements });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

/// Header message seeding a new conversation thread, giving operators the
/// session id and arrival context before the first visitor message lands.
pub fn thread_header(
    session_id: &SessionId,
    arrived_at: DateTime<Utc>,
    page_url: Option<&str>,
) -> MessageTemplate {
    let mut context = vec![
        TextObject::mrkdwn(format!("session `{}`", session_id.as_str())),
        TextObject::mrkdwn(format!("arrived {}", arrived_at.to_rfc3339())),
    ];
    if let Some(page_url) = page_url {
        context.push(TextObject::mrkdwn(format!("from {page_url}")));
    }

    MessageBuilder::new(format!("New website chat - session {}", session_id.as_str()))
        .section("chat_header", TextObject::mrkdwn(":speech_balloon: *New website chat*"))
        .context("chat_header_context", context)
        .build()
}

/// Lead-capture notification posted to the leads channel.
pub fn lead_notification(lead: &LeadRecord) -> MessageTemplate {
    let mut summary = format!("*{}* <{}>", lead.name, lead.email);
    if let Some(company) = lead.company.as_deref() {
        summary.push_str(&format!(" at {company}"));
    }

    let mut context = Vec::new();
    if let Some(project_type) = lead.project_type.as_deref() {
        context.push(TextObject::mrkdwn(format!("project: {project_type}")));
    }
    if let Some(source) = lead.source.as_deref() {
        context.push(TextObject::mrkdwn(format!("source: {source}")));
    }
    if let Some(region) = lead.region.as_deref() {
        context.push(TextObject::mrkdwn(format!("region: {region}")));
    }

    let mut builder =
        MessageBuilder::new(format!("New lead from {} <{}>", lead.name, lead.email))
            .section("lead_summary", TextObject::mrkdwn(format!(":incoming_envelope: {summary}")))
            .section("lead_message", TextObject::plain(lead.message.clone()));
    if !context.is_empty() {
        builder = builder.context("lead_context", context);
    }
    builder.build()
}

/// Outbound channel notifications, independent of any conversation thread.
#[async_trait]
pub trait OutboundNotifier: Send + Sync {
    async fn notify(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<(), DirectoryError>;
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl OutboundNotifier for NoopNotifier {
    async fn notify(
        &self,
        _channel: &ChannelId,
        _message: &MessageTemplate,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }
}
