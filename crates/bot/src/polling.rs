use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{Dispatcher, InboundUpdate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollingError {
    #[error("polling gave up after {attempts} consecutive failures: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Pull side of the chat transport. The source keeps its own read offset.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// `Ok(None)` means the source is closed for good.
    async fn next_batch(&self) -> Result<Option<Vec<InboundUpdate>>, TransportError>;
}

/// Long-polling loop. Every update is dispatched on its own task so a slow
/// user never holds up the next batch.
pub struct PollingRunner {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<Dispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl PollingRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: Arc<Dispatcher>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, dispatcher, reconnect_policy }
    }

    /// Runs until the source closes or consecutive failures exceed the
    /// policy. In-flight dispatches are awaited before returning.
    pub async fn start(&self) -> Result<(), PollingError> {
        let mut in_flight = JoinSet::new();
        let result = self.pump(&mut in_flight).await;
        while in_flight.join_next().await.is_some() {}
        result
    }

    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<(), PollingError> {
        let mut failures = 0_u32;
        let mut connected = false;

        loop {
            let step = if connected {
                self.source.next_batch().await
            } else {
                info!(event_name = "ingress.poll.connecting", attempt = failures, "starting update polling");
                self.source.connect().await.map(|()| {
                    connected = true;
                    Some(Vec::new())
                })
            };

            match step {
                Ok(Some(batch)) => {
                    failures = 0;
                    if !batch.is_empty() {
                        debug!(event_name = "ingress.poll.batch_received", size = batch.len(), "received updates");
                    }
                    for update in batch {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        in_flight.spawn(async move {
                            dispatcher.dispatch(update).await;
                        });
                    }
                    while in_flight.try_join_next().is_some() {}
                }
                Ok(None) => {
                    info!(event_name = "ingress.poll.closed", "update source closed");
                    return Ok(());
                }
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.poll.failed",
                        attempt = failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "update polling failed"
                    );
                    if failures >= self.reconnect_policy.max_retries {
                        return Err(PollingError::RetriesExhausted {
                            attempts: failures + 1,
                            last: transport_error,
                        });
                    }

                    if matches!(transport_error, TransportError::Connect(_)) {
                        connected = false;
                    }
                    let delay = self.reconnect_policy.backoff(failures);
                    failures += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use storytime_core::dialog::{ReplySurface, UserId};
    use storytime_db::InMemoryLibraryRepository;
    use tokio::sync::Mutex;

    use super::{PollingError, PollingRunner, ReconnectPolicy, TransportError, UpdateSource};
    use crate::commands::HELP_TEXT;
    use crate::events::{AllowList, Dispatcher, InboundUpdate, UpdateKind};
    use crate::gateway::RecordingGateway;

    #[derive(Default)]
    struct ScriptedSource {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        batches: VecDeque<Result<Option<Vec<InboundUpdate>>, TransportError>>,
        connect_attempts: usize,
        polls: usize,
    }

    impl ScriptedSource {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            batches: Vec<Result<Option<Vec<InboundUpdate>>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    batches: batches.into(),
                    connect_attempts: 0,
                    polls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn polls(&self) -> usize {
            self.state.lock().await.polls
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_batch(&self) -> Result<Option<Vec<InboundUpdate>>, TransportError> {
            let mut state = self.state.lock().await;
            state.polls += 1;
            state.batches.pop_front().unwrap_or(Ok(None))
        }
    }

    fn start_update(update_id: i64, user: i64) -> InboundUpdate {
        InboundUpdate {
            update_id,
            user: UserId(user),
            surface: ReplySurface::new(user, None),
            kind: UpdateKind::Text("/start".to_owned()),
        }
    }

    fn dispatcher() -> (Arc<Dispatcher>, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::new());
        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryLibraryRepository::with_default_family()),
            gateway.clone(),
            Arc::new(AllowList::new([1, 2])),
        );
        (Arc::new(dispatcher), gateway)
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let source = Arc::new(ScriptedSource::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(vec![start_update(10, 1), start_update(11, 2)])), Ok(None)],
        ));
        let (dispatcher, gateway) = dispatcher();

        let runner = PollingRunner::new(source.clone(), dispatcher, no_delay(2));
        runner.start().await.expect("runner should finish when the source closes");

        assert_eq!(source.connect_attempts().await, 2);
        assert_eq!(gateway.sent_texts(), vec![HELP_TEXT, HELP_TEXT]);
    }

    #[tokio::test]
    async fn receive_failures_retry_without_reconnecting() {
        let source = Arc::new(ScriptedSource::with_script(
            vec![Ok(())],
            vec![
                Err(TransportError::Receive("timeout".to_owned())),
                Err(TransportError::Receive("timeout".to_owned())),
                Ok(Some(vec![start_update(10, 1)])),
                Err(TransportError::Receive("timeout".to_owned())),
                Ok(None),
            ],
        ));
        let (dispatcher, gateway) = dispatcher();

        let runner = PollingRunner::new(source.clone(), dispatcher, no_delay(2));
        runner.start().await.expect("failures reset after a good batch");

        assert_eq!(source.connect_attempts().await, 1);
        assert_eq!(source.polls().await, 5);
        assert_eq!(gateway.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_with_error() {
        let source = Arc::new(ScriptedSource::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));
        let (dispatcher, _gateway) = dispatcher();

        let runner = PollingRunner::new(source.clone(), dispatcher, no_delay(2));
        let error = runner.start().await.expect_err("retries should run out");

        assert_eq!(
            error,
            PollingError::RetriesExhausted {
                attempts: 3,
                last: TransportError::Connect("fail-3".to_owned()),
            }
        );
        assert_eq!(source.connect_attempts().await, 3);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(5_000));
    }
}
