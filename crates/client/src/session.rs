//! The widget's conversation driver.
//!
//! Binds the conversation flow to the state store and the relay transport.
//! Relay calls are only reachable once the flow is in free chat; everything
//! before that is local. A reload resumes free chat directly when the
//! persisted record says the questionnaire is already complete.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_core::client_state::{decode, ClientStateRecord, Restored, CLIENT_STATE_KEY};
use parley_core::domain::{SessionId, ThreadId};
use parley_core::errors::ChatError;
use parley_core::flows::{
    ConversationAction, ConversationError, ConversationEvent, ConversationFlow, ConversationState,
};

use crate::transport::{RelayRequest, RelayTransport, StateStore};

/// A message the widget must render to the visitor. Non-transient failures
/// always produce one; the widget never fails silently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitorNotice {
    pub text: String,
}

impl std::fmt::Display for VisitorNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub thread_id: ThreadId,
    pub token: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// Local validation rejected the submission; nothing reached the server.
    #[error(transparent)]
    Rejected(#[from] ConversationError),
    /// The relay call failed; `notice` is what the visitor sees.
    #[error("{notice}")]
    Failed { notice: VisitorNotice, error: ChatError },
}

pub struct ChatSession<S, T> {
    flow: ConversationFlow,
    state: ConversationState,
    record: ClientStateRecord,
    store: S,
    transport: T,
    page_url: Option<String>,
}

impl<S: StateStore, T: RelayTransport> ChatSession<S, T> {
    /// Restore from the persisted record, or start a fresh session.
    pub fn restore(store: S, transport: T, page_url: Option<String>) -> Self {
        let flow = ConversationFlow::default();
        let record = match store.get(CLIENT_STATE_KEY).as_deref().map(decode) {
            Some(Restored::Record { record, migrated }) => {
                if migrated {
                    debug!(session_id = %record.session_id, "migrated legacy client state");
                    store.put(CLIENT_STATE_KEY, record.encode());
                }
                record
            }
            _ => ClientStateRecord::fresh(Uuid::new_v4().to_string()),
        };

        let state = if record.questionnaire_complete {
            ConversationState::FreeChat
        } else {
            flow.initial_state()
        };

        Self { flow, state, record, store, transport, page_url }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn session_id(&self) -> SessionId {
        SessionId(self.record.session_id.clone())
    }

    /// The current capability token, once the first relay call has minted one.
    pub fn token(&self) -> Option<&str> {
        self.record.token.as_deref()
    }

    /// Answer the intake question shown at `step`.
    pub fn select_option(
        &mut self,
        step: usize,
        option: usize,
    ) -> Result<ConversationState, ConversationError> {
        let outcome = self
            .flow
            .transition(&self.state, ConversationEvent::OptionSelected { step, option })?;
        self.apply(outcome.to, &outcome.actions);
        Ok(self.state.clone())
    }

    /// Submit the visitor's contact details. Validation is local; the relay
    /// is not called here under any input.
    pub fn submit_contact(
        &mut self,
        name: &str,
        email: &str,
    ) -> Result<ConversationState, ConversationError> {
        let outcome = self.flow.transition(
            &self.state,
            ConversationEvent::ContactSubmitted { name: name.to_string(), email: email.to_string() },
        )?;
        self.apply(outcome.to, &outcome.actions);
        Ok(self.state.clone())
    }

    /// Decline the optional project-details prompt.
    pub fn skip_details(&mut self) -> Result<(), ConversationError> {
        let outcome = self.flow.transition(&self.state, ConversationEvent::DetailsSkipped)?;
        self.apply(outcome.to, &outcome.actions);
        Ok(())
    }

    /// Send a free-chat message through the relay, persisting the refreshed
    /// token on success.
    pub async fn send_message(&mut self, text: &str) -> Result<SentMessage, SendError> {
        let outcome = self
            .flow
            .transition(&self.state, ConversationEvent::MessageSubmitted { text: text.to_string() })
            .map_err(SendError::Rejected)?;
        self.apply(outcome.to.clone(), &[]);

        let Some(ConversationAction::SendViaRelay { text }) = outcome
            .actions
            .into_iter()
            .find(|action| matches!(action, ConversationAction::SendViaRelay { .. }))
        else {
            return Err(SendError::Rejected(ConversationError::EmptyMessage));
        };

        let request = RelayRequest {
            message: text,
            timestamp: Utc::now().to_rfc3339(),
            session_id: self.session_id(),
            page_url: self.page_url.clone(),
            token: self.record.token.clone(),
        };

        match self.transport.relay(request).await {
            Ok(outcome) => {
                self.record.token = Some(outcome.token.clone());
                self.persist();
                Ok(SentMessage { thread_id: outcome.thread_id, token: outcome.token })
            }
            Err(error) => {
                warn!(session_id = %self.record.session_id, %error, "relay call failed");
                if error == ChatError::Unauthorized {
                    // A rejected token is useless; drop it so the next send
                    // restarts the protocol with a fresh thread.
                    self.record.token = None;
                    self.persist();
                }
                Err(SendError::Failed {
                    notice: VisitorNotice { text: error.user_message() },
                    error,
                })
            }
        }
    }

    fn apply(&mut self, to: ConversationState, actions: &[ConversationAction]) {
        let entered_free_chat =
            to == ConversationState::FreeChat && self.state != ConversationState::FreeChat;
        self.state = to;

        for action in actions {
            if let ConversationAction::RecordContact { name, .. } = action {
                debug!(name, "visitor contact recorded");
            }
        }

        if entered_free_chat {
            self.record.questionnaire_complete = true;
            self.persist();
        }
    }

    fn persist(&self) {
        self.store.put(CLIENT_STATE_KEY, self.record.encode());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use parley_core::client_state::{ClientStateRecord, CLIENT_STATE_KEY};
    use parley_core::cursor::PollCursor;
    use parley_core::domain::ThreadId;
    use parley_core::errors::ChatError;
    use parley_core::flows::ConversationState;

    use super::{ChatSession, SendError};
    use crate::transport::{
        PollOutcome, RelayOutcome, RelayRequest, RelayTransport, StateStore,
    };

    #[derive(Default)]
    struct MemoryStore {
        values: StdMutex<HashMap<String, String>>,
    }

    impl StateStore for MemoryStore {
        fn get(&self, key: &str) -> Option<String> {
            self.values.lock().expect("store lock").get(key).cloned()
        }

        fn put(&self, key: &str, value: String) {
            self.values.lock().expect("store lock").insert(key.to_string(), value);
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        relay_results: VecDeque<Result<RelayOutcome, ChatError>>,
        relay_requests: Vec<RelayRequest>,
    }

    impl ScriptedTransport {
        fn with_relay(results: Vec<Result<RelayOutcome, ChatError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    relay_results: results.into(),
                    relay_requests: Vec::new(),
                }),
            }
        }

        async fn relay_requests(&self) -> Vec<RelayRequest> {
            self.state.lock().await.relay_requests.clone()
        }
    }

    #[async_trait]
    impl RelayTransport for &ScriptedTransport {
        async fn relay(&self, request: RelayRequest) -> Result<RelayOutcome, ChatError> {
            let mut state = self.state.lock().await;
            state.relay_requests.push(request);
            state.relay_results.pop_front().unwrap_or_else(|| {
                Ok(RelayOutcome {
                    token: "tok.default".to_string(),
                    thread_id: ThreadId("1730000000.000100".to_string()),
                })
            })
        }

        async fn poll(&self, _token: &str, _cursor: &PollCursor) -> Result<PollOutcome, ChatError> {
            Ok(PollOutcome::default())
        }
    }

    fn outcome(token: &str) -> RelayOutcome {
        RelayOutcome {
            token: token.to_string(),
            thread_id: ThreadId("1730000000.000100".to_string()),
        }
    }

    #[tokio::test]
    async fn full_walk_reaches_free_chat_and_relays() {
        let transport = ScriptedTransport::with_relay(vec![Ok(outcome("tok.1"))]);
        let store = MemoryStore::default();
        let mut session = ChatSession::restore(store, &transport, None);

        for step in 0..3 {
            session.select_option(step, 0).expect("answer accepted");
        }
        assert_eq!(session.state(), &ConversationState::CollectingContact);

        session.submit_contact("Jane", "jane@example.com").expect("contact accepted");
        assert_eq!(session.state(), &ConversationState::FreeChat);

        let sent = session.send_message("Hello").await.expect("send succeeds");
        assert_eq!(sent.token, "tok.1");
        assert_eq!(session.token(), Some("tok.1"));
    }

    #[tokio::test]
    async fn relay_is_never_called_before_valid_contact() {
        let transport = ScriptedTransport::default();
        let mut session = ChatSession::restore(MemoryStore::default(), &transport, None);

        assert!(session.send_message("too early").await.is_err());

        for step in 0..3 {
            session.select_option(step, 0).expect("answer accepted");
        }
        assert!(session.submit_contact("", "a@b.com").is_err());
        assert!(session.submit_contact("Jane", "not-an-email").is_err());
        assert!(session.send_message("still gated").await.is_err());

        assert!(transport.relay_requests().await.is_empty());
    }

    #[tokio::test]
    async fn restore_resumes_free_chat_with_the_stored_token() {
        let store = MemoryStore::default();
        let mut record = ClientStateRecord::fresh("sess-keep");
        record.token = Some("tok.kept".to_string());
        record.questionnaire_complete = true;
        store.put(CLIENT_STATE_KEY, record.encode());

        let transport = ScriptedTransport::with_relay(vec![Ok(outcome("tok.kept"))]);
        let mut session = ChatSession::restore(store, &transport, None);

        assert_eq!(session.state(), &ConversationState::FreeChat);
        assert_eq!(session.token(), Some("tok.kept"));
        assert_eq!(session.session_id().as_str(), "sess-keep");

        session.send_message("back again").await.expect("send succeeds");
        let requests = transport.relay_requests().await;
        assert_eq!(requests[0].token.as_deref(), Some("tok.kept"));
        assert_eq!(requests[0].session_id.as_str(), "sess-keep");
    }

    #[tokio::test]
    async fn relay_failure_surfaces_the_phone_fallback_notice() {
        let transport = ScriptedTransport::with_relay(vec![Err(ChatError::DirectoryUnavailable {
            detail: "slack 502".to_string(),
        })]);
        let store = MemoryStore::default();
        let mut session = ChatSession::restore(store, &transport, None);
        for step in 0..3 {
            session.select_option(step, 0).expect("answer accepted");
        }
        session.submit_contact("Jane", "jane@example.com").expect("contact accepted");

        let error = session.send_message("Hello").await.expect_err("send should fail");
        let SendError::Failed { notice, .. } = error else {
            panic!("expected a relay failure");
        };
        assert!(notice.text.contains("call us"));
        assert!(!notice.text.contains("slack 502"));
    }

    #[tokio::test]
    async fn skipping_details_keeps_free_chat_without_a_relay_call() {
        let transport = ScriptedTransport::default();
        let mut session = ChatSession::restore(MemoryStore::default(), &transport, None);
        for step in 0..3 {
            session.select_option(step, 0).expect("answer accepted");
        }
        session.submit_contact("Jane", "jane@example.com").expect("contact accepted");

        session.skip_details().expect("skip accepted");
        assert_eq!(session.state(), &ConversationState::FreeChat);
        assert!(transport.relay_requests().await.is_empty());
    }
}
