//! Core domain for the Parley chat relay: the signed session token, the poll
//! cursor, the visitor conversation flow, and the shared config/error/audit
//! plumbing used by every other crate.

pub mod audit;
pub mod client_state;
pub mod config;
pub mod cursor;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod lead;
pub mod token;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use client_state::{ClientStateRecord, Restored, CLIENT_STATE_KEY, CLIENT_STATE_VERSION};
pub use cursor::PollCursor;
pub use domain::{AuthorRole, ChannelId, SessionId, ThreadId, ThreadMessage, MESSAGE_MAX_CHARS};
pub use errors::ChatError;
pub use flows::{
    ConversationAction, ConversationError, ConversationEvent, ConversationFlow, ConversationState,
};
pub use lead::{LeadRecord, LeadValidationError, LeadValidationFailure};
pub use token::{sign, verify, TokenPayload};
