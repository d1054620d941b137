//! Recurring poll loop for operator replies.
//!
//! Healthy ticks run on a fixed interval. Transient failures switch to
//! bounded exponential backoff and recover to the fixed interval on the next
//! success; the visitor is never alarmed for them. Only an `Unauthorized`
//! answer stops the loop - the session must drop its token and start over
//! with a fresh relay call.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_core::cursor::PollCursor;
use parley_core::domain::ThreadMessage;
use parley_core::errors::ChatError;

use crate::transport::RelayTransport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl BackoffPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Tick spacing while polls are succeeding.
    pub interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(3), backoff: BackoffPolicy::default() }
    }
}

/// Result of a single poll tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Messages delivered (possibly none); poll again after `next_delay`.
    Delivered { messages: Vec<ThreadMessage>, next_delay: Duration },
    /// Transient failure; poll again after the backoff `next_delay`.
    Deferred { next_delay: Duration },
    /// The token was rejected; polling must not continue.
    Unauthorized,
}

/// Why [`ThreadPoller::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerExit {
    /// The receiving side hung up (the UI was torn down).
    Closed,
    /// The server rejected the token.
    Unauthorized,
}

pub struct ThreadPoller<T> {
    transport: T,
    token: String,
    cursor: PollCursor,
    config: PollerConfig,
    consecutive_failures: u32,
}

impl<T: RelayTransport> ThreadPoller<T> {
    pub fn new(transport: T, token: impl Into<String>, config: PollerConfig) -> Self {
        Self {
            transport,
            token: token.into(),
            cursor: PollCursor::start(),
            config,
            consecutive_failures: 0,
        }
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    /// One poll attempt. Advances the cursor only to positions the server
    /// returned; a stale or corrupt cursor in the response cannot move it
    /// backwards.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.transport.poll(&self.token, &self.cursor).await {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                self.cursor.advance(outcome.cursor.as_str());
                TickOutcome::Delivered {
                    messages: outcome.messages,
                    next_delay: self.config.interval,
                }
            }
            Err(ChatError::Unauthorized) => {
                warn!("poll token rejected; stopping the poll loop");
                TickOutcome::Unauthorized
            }
            Err(error) => {
                let attempt = self.consecutive_failures;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let next_delay = self.config.backoff.backoff(attempt);
                debug!(%error, attempt, delay_ms = next_delay.as_millis() as u64, "poll deferred");
                TickOutcome::Deferred { next_delay }
            }
        }
    }

    /// Poll until the token is rejected or `sink` is closed, forwarding every
    /// operator message in order.
    pub async fn run(mut self, sink: mpsc::Sender<ThreadMessage>) -> PollerExit {
        loop {
            let delay = match self.tick().await {
                TickOutcome::Delivered { messages, next_delay } => {
                    for message in messages {
                        if sink.send(message).await.is_err() {
                            return PollerExit::Closed;
                        }
                    }
                    next_delay
                }
                TickOutcome::Deferred { next_delay } => next_delay,
                TickOutcome::Unauthorized => return PollerExit::Unauthorized,
            };

            if sink.is_closed() {
                return PollerExit::Closed;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Mutex};

    use parley_core::cursor::PollCursor;
    use parley_core::domain::{AuthorRole, ThreadMessage};
    use parley_core::errors::ChatError;

    use super::{BackoffPolicy, PollerConfig, PollerExit, ThreadPoller, TickOutcome};
    use crate::transport::{PollOutcome, RelayOutcome, RelayRequest, RelayTransport};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        poll_results: VecDeque<Result<PollOutcome, ChatError>>,
        cursors_seen: Vec<String>,
    }

    impl ScriptedTransport {
        fn with_polls(results: Vec<Result<PollOutcome, ChatError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    poll_results: results.into(),
                    cursors_seen: Vec::new(),
                }),
            }
        }

        async fn cursors_seen(&self) -> Vec<String> {
            self.state.lock().await.cursors_seen.clone()
        }
    }

    #[async_trait]
    impl RelayTransport for &ScriptedTransport {
        async fn relay(&self, _request: RelayRequest) -> Result<RelayOutcome, ChatError> {
            unreachable!("the poller never relays");
        }

        async fn poll(&self, _token: &str, cursor: &PollCursor) -> Result<PollOutcome, ChatError> {
            let mut state = self.state.lock().await;
            state.cursors_seen.push(cursor.as_str().to_string());
            state.poll_results.pop_front().unwrap_or_else(|| Ok(PollOutcome::default()))
        }
    }

    fn message(ts: &str, text: &str) -> ThreadMessage {
        ThreadMessage {
            id: ts.to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
            author: AuthorRole::Operator,
        }
    }

    fn config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(3),
            backoff: BackoffPolicy { base_delay_ms: 250, max_delay_ms: 5_000 },
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy { base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(4), Duration::from_millis(4_000));
        assert_eq!(policy.backoff(5), Duration::from_millis(5_000));
        assert_eq!(policy.backoff(60), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn successful_ticks_deliver_and_advance_the_cursor() {
        let transport = ScriptedTransport::with_polls(vec![
            Ok(PollOutcome {
                messages: vec![message("1730000001.000200", "Hi there!")],
                cursor: PollCursor("1730000001.000200".to_string()),
            }),
            Ok(PollOutcome::default()),
        ]);
        let mut poller = ThreadPoller::new(&transport, "tok.1", config());

        let first = poller.tick().await;
        let TickOutcome::Delivered { messages, next_delay } = first else {
            panic!("first tick should deliver");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(next_delay, Duration::from_secs(3));
        assert_eq!(poller.cursor().as_str(), "1730000001.000200");

        // Idempotent re-poll: nothing new leaves the cursor where it was.
        let second = poller.tick().await;
        assert!(matches!(second, TickOutcome::Delivered { ref messages, .. } if messages.is_empty()));
        assert_eq!(poller.cursor().as_str(), "1730000001.000200");

        assert_eq!(transport.cursors_seen().await, vec!["", "1730000001.000200"]);
    }

    #[tokio::test]
    async fn transient_failures_back_off_and_recover() {
        let transport = ScriptedTransport::with_polls(vec![
            Err(ChatError::ThreadNotReady),
            Err(ChatError::ThreadNotReady),
            Err(ChatError::DirectoryUnavailable { detail: "502".to_string() }),
            Ok(PollOutcome::default()),
            Err(ChatError::ThreadNotReady),
        ]);
        let mut poller = ThreadPoller::new(&transport, "tok.1", config());

        assert_eq!(
            poller.tick().await,
            TickOutcome::Deferred { next_delay: Duration::from_millis(250) }
        );
        assert_eq!(
            poller.tick().await,
            TickOutcome::Deferred { next_delay: Duration::from_millis(500) }
        );
        assert_eq!(
            poller.tick().await,
            TickOutcome::Deferred { next_delay: Duration::from_millis(1_000) }
        );

        // A success resets the failure streak.
        assert!(matches!(poller.tick().await, TickOutcome::Delivered { .. }));
        assert_eq!(
            poller.tick().await,
            TickOutcome::Deferred { next_delay: Duration::from_millis(250) }
        );
    }

    #[tokio::test]
    async fn unauthorized_stops_the_loop() {
        let transport = ScriptedTransport::with_polls(vec![Err(ChatError::Unauthorized)]);
        let mut poller = ThreadPoller::new(&transport, "tok.expired", config());
        assert_eq!(poller.tick().await, TickOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn a_stale_server_cursor_cannot_move_the_poller_backwards() {
        let transport = ScriptedTransport::with_polls(vec![
            Ok(PollOutcome {
                messages: vec![message("1730000005.000500", "newest")],
                cursor: PollCursor("1730000005.000500".to_string()),
            }),
            Ok(PollOutcome {
                messages: Vec::new(),
                cursor: PollCursor("1730000001.000100".to_string()),
            }),
        ]);
        let mut poller = ThreadPoller::new(&transport, "tok.1", config());

        poller.tick().await;
        poller.tick().await;
        assert_eq!(poller.cursor().as_str(), "1730000005.000500");
    }

    #[tokio::test]
    async fn run_forwards_messages_until_unauthorized() {
        let transport = ScriptedTransport::with_polls(vec![
            Ok(PollOutcome {
                messages: vec![
                    message("1730000001.000200", "first"),
                    message("1730000002.000300", "second"),
                ],
                cursor: PollCursor("1730000002.000300".to_string()),
            }),
            Err(ChatError::Unauthorized),
        ]);
        let poller = ThreadPoller::new(
            &transport,
            "tok.1",
            PollerConfig {
                interval: Duration::ZERO,
                backoff: BackoffPolicy { base_delay_ms: 0, max_delay_ms: 0 },
            },
        );

        let (sender, mut receiver) = mpsc::channel(8);
        let exit = poller.run(sender).await;
        assert_eq!(exit, PollerExit::Unauthorized);

        let mut texts = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            texts.push(message.text);
        }
        assert_eq!(texts, ["first", "second"]);
    }
}
