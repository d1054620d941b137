use serde::{Deserialize, Serialize};

/// Maximum accepted visitor message length, in characters.
pub const MESSAGE_MAX_CHARS: usize = 2000;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Visitor,
    Operator,
}

/// A single message inside a conversation thread, as delivered to polling clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub text: String,
    pub ts: String,
    pub author: AuthorRole,
}

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ThreadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
