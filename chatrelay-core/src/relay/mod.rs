//! Relay polling loop
//!
//! Pulls batches from an [`UpdateSource`] starting at a process-local cursor
//! and hands every message to an [`EventPublisher`]. The cursor moves past
//! every fetched event whatever the publish outcome, so a failed publish is
//! a dropped message, never a stuck loop.

mod traits;

pub use traits::{EventPublisher, UpdateSource};

use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{Event, MessagePayload};
use crate::Result;

/// Default long-poll wait passed to the source
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause after a failed fetch
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub poll_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Counters kept across the lifetime of a relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub fetched: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub fetch_failures: u64,
}

pub struct Relay<S, P> {
    source: S,
    publisher: P,
    cursor: i64,
    options: RelayOptions,
    stats: RelayStats,
}

impl<S, P> Relay<S, P>
where
    S: UpdateSource,
    P: EventPublisher,
{
    #[must_use]
    pub fn new(source: S, publisher: P, options: RelayOptions) -> Self {
        Self {
            source,
            publisher,
            cursor: 0,
            options,
            stats: RelayStats::default(),
        }
    }

    /// Next sequence id to fetch
    #[must_use]
    pub const fn cursor(&self) -> i64 {
        self.cursor
    }

    #[must_use]
    pub const fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is observed before each fetch and during the backoff
    /// after a failed fetch. A fetch already in progress is allowed to
    /// complete and its batch is published in full before the loop exits.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            cursor = self.cursor,
            poll_timeout_secs = self.options.poll_timeout.as_secs(),
            "Relay polling loop started"
        );

        loop {
            if cancel.is_cancelled() {
                info!("Relay polling loop cancelled");
                break;
            }

            let batch = match self.source.fetch(self.cursor, self.options.poll_timeout).await {
                Ok(batch) => batch,
                Err(e) => {
                    self.stats.fetch_failures += 1;
                    error!(
                        error = %e,
                        cursor = self.cursor,
                        backoff_secs = self.options.retry_backoff.as_secs(),
                        "Failed to fetch updates, retrying after backoff"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("Relay polling loop cancelled during backoff");
                            break;
                        }
                        () = tokio::time::sleep(self.options.retry_backoff) => {}
                    }
                    continue;
                }
            };

            if !batch.is_empty() {
                self.process_batch(batch).await;
                debug!(cursor = self.cursor, stats = ?self.stats, "Batch processed");
            }
        }

        info!(
            cursor = self.cursor,
            fetched = self.stats.fetched,
            published = self.stats.published,
            publish_failures = self.stats.publish_failures,
            fetch_failures = self.stats.fetch_failures,
            "Relay polling loop stopped"
        );
        Ok(())
    }

    async fn process_batch(&mut self, mut batch: Vec<Event>) {
        batch.sort_by_key(|event| event.sequence_id);

        for event in batch {
            self.stats.fetched += 1;
            self.relay_event(&event).await;

            // max() keeps the cursor from moving back if a source misbehaves
            self.cursor = self.cursor.max(event.sequence_id.saturating_add(1));
        }
    }

    async fn relay_event(&mut self, event: &Event) {
        let Some(message) = &event.message else {
            debug!(sequence_id = event.sequence_id, "Skipping update without message");
            return;
        };

        info!(
            sequence_id = event.sequence_id,
            destination = %message.destination,
            "Received message"
        );

        let payload = MessagePayload::from_event(event.sequence_id, message);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!(error = %e, sequence_id = event.sequence_id, "Failed to encode message payload");
                return;
            }
        };

        match self.publisher.publish(message.destination, body).await {
            Ok(()) => {
                self.stats.published += 1;
                debug!(
                    sequence_id = event.sequence_id,
                    routing_key = %message.destination.routing_key(),
                    "Message published"
                );
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!(
                    error = %e,
                    sequence_id = event.sequence_id,
                    destination = %message.destination,
                    "Failed to publish message, dropping it"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DestinationId;
    use crate::Error;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    enum Step {
        Batch(Vec<Event>),
        Fail,
        /// Cancellation arrives while this fetch is outstanding
        BatchThenCancel(Vec<Event>),
    }

    /// Replays a fixed script, then cancels the relay once it runs dry
    #[derive(Clone)]
    struct ScriptedSource {
        steps: Arc<Mutex<VecDeque<Step>>>,
        cursors: Arc<Mutex<Vec<i64>>>,
        cancel: CancellationToken,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>, cancel: CancellationToken) -> Self {
            Self {
                steps: Arc::new(Mutex::new(steps.into())),
                cursors: Arc::new(Mutex::new(Vec::new())),
                cancel,
            }
        }

        fn cursors(&self) -> Vec<i64> {
            self.cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn fetch(&self, cursor: i64, _timeout: Duration) -> Result<Vec<Event>> {
            self.cursors.lock().unwrap().push(cursor);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Batch(events)) => Ok(events),
                Some(Step::Fail) => Err(Error::Source("connection reset".to_string())),
                Some(Step::BatchThenCancel(events)) => {
                    self.cancel.cancel();
                    Ok(events)
                }
                None => {
                    self.cancel.cancel();
                    Ok(Vec::new())
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<(DestinationId, Bytes)>>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn published(&self) -> Vec<(DestinationId, Bytes)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, destination: DestinationId, body: Bytes) -> Result<()> {
            if self.fail {
                return Err(Error::Publish("channel closed".to_string()));
            }
            self.published.lock().unwrap().push((destination, body));
            Ok(())
        }
    }

    fn msg(seq: i64, chat: i64, text: &str) -> Event {
        Event::message(seq, DestinationId::new(chat), text)
    }

    #[tokio::test]
    async fn test_cursor_follows_max_sequence_id() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![
                Step::Batch(vec![msg(1, 10, "a"), msg(2, 10, "b")]),
                Step::Batch(vec![]),
                Step::Batch(vec![msg(5, 11, "c")]),
            ],
            cancel.clone(),
        );
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source.clone(), publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        assert_eq!(relay.cursor(), 6);
        assert_eq!(source.cursors(), vec![0, 3, 3, 6]);
        assert_eq!(publisher.published().len(), 3);
        assert_eq!(relay.stats().fetched, 3);
        assert_eq!(relay.stats().published, 3);
    }

    #[tokio::test]
    async fn test_cursor_advances_when_every_publish_fails() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![
                Step::Batch(vec![msg(7, 1, "x"), msg(9, 2, "y")]),
                Step::Batch(vec![msg(12, 3, "z")]),
            ],
            cancel.clone(),
        );
        let mut relay = Relay::new(source.clone(), RecordingPublisher::failing(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        assert_eq!(relay.cursor(), 13);
        assert_eq!(source.cursors(), vec![0, 10, 13]);
        assert_eq!(relay.stats().publish_failures, 3);
        assert_eq!(relay.stats().published, 0);
    }

    #[tokio::test]
    async fn test_batch_published_in_sequence_order() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![Step::Batch(vec![msg(4, 1, "second"), msg(3, 1, "first")])],
            cancel.clone(),
        );
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source, publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        let texts: Vec<String> = publisher
            .published()
            .iter()
            .map(|(_, body)| serde_json::from_slice::<MessagePayload>(body).unwrap().text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(relay.cursor(), 5);
    }

    #[tokio::test]
    async fn test_published_body_is_message_payload() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(vec![Step::Batch(vec![msg(10, 7, "hi")])], cancel.clone());
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source, publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, DestinationId::new(7));
        let payload: MessagePayload = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(
            payload,
            MessagePayload {
                update_id: 10,
                chat_id: 7,
                text: "hi".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_events_without_message_move_cursor() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![Step::Batch(vec![Event::empty(20), Event::empty(21)])],
            cancel.clone(),
        );
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source.clone(), publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        assert_eq!(relay.cursor(), 22);
        assert!(publisher.published().is_empty());
        assert_eq!(source.cursors(), vec![0, 22]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failures_keep_cursor() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![
                Step::Batch(vec![msg(1, 5, "before")]),
                Step::Fail,
                Step::Fail,
                Step::Fail,
                Step::Batch(vec![msg(2, 5, "after")]),
            ],
            cancel.clone(),
        );
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source.clone(), publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        assert_eq!(source.cursors(), vec![0, 2, 2, 2, 2, 3]);
        assert_eq!(relay.cursor(), 3);
        assert_eq!(relay.stats().fetch_failures, 3);
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_immediately() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(vec![Step::Fail], cancel.clone());
        let options = RelayOptions {
            poll_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(3600),
        };
        let mut relay = Relay::new(source.clone(), RecordingPublisher::default(), options);

        let started = tokio::time::Instant::now();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = relay.run(token).await;
            (result, relay)
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let (result, relay) = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(source.cursors(), vec![0]);
        assert_eq!(relay.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_drains_batch() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(
            vec![
                Step::BatchThenCancel(vec![msg(10, 3, "one"), msg(11, 3, "two")]),
                Step::Batch(vec![msg(12, 3, "never fetched")]),
            ],
            cancel.clone(),
        );
        let publisher = RecordingPublisher::default();
        let mut relay = Relay::new(source.clone(), publisher.clone(), RelayOptions::default());

        relay.run(cancel).await.unwrap();

        assert_eq!(source.cursors(), vec![0]);
        assert_eq!(publisher.published().len(), 2);
        assert_eq!(relay.cursor(), 12);
    }
}
