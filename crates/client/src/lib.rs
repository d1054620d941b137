//! Client-side conversation driver for the chat widget.
//!
//! This crate models the widget's half of the relay protocol against two
//! seams: a [`StateStore`](transport::StateStore) (the localStorage analog)
//! and a [`RelayTransport`](transport::RelayTransport) (the relay and poll
//! endpoints). It sequences the intake questionnaire, gates the first relay
//! call on valid contact details, persists the versioned client-state record
//! so a reload resumes free chat, and polls the thread for operator replies
//! with bounded exponential backoff on transient failures.
//!
//! # Key Types
//!
//! - `ChatSession` - drives the conversation flow and the relay calls
//! - `ThreadPoller` - recurring poll loop with backoff and cursor tracking
//! - `VisitorNotice` - the visible message shown for any non-transient failure

pub mod poller;
pub mod session;
pub mod transport;

pub use poller::{BackoffPolicy, PollerConfig, PollerExit, ThreadPoller, TickOutcome};
pub use session::{ChatSession, SendError, SentMessage, VisitorNotice};
pub use transport::{PollOutcome, RelayOutcome, RelayRequest, RelayTransport, StateStore};
