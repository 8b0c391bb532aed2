//! Conversion events and their delivery.
//!
//! Events go through an [`EventProcessor`]: the forwarding processor hands
//! each event to the dispatcher immediately, the batching processor queues
//! them on a background task that flushes on size, on a timer, and on close.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::ExperimentError;
use super::audience::Attributes;
use crate::config::EventProcessorKind;

/// Event key recorded when an order is placed.
pub const ORDER_PLACED: &str = "order_placed";

/// Capacity of the batching queue.
const QUEUE_CAPACITY: usize = 1024;

/// A conversion to report to the experimentation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub uuid: Uuid,
    pub key: String,
    /// Event id from the datafile, when it declares the event.
    pub entity_id: Option<String>,
    pub user_id: String,
    pub attributes: Attributes,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub project_id: String,
    pub revision: String,
    /// Experiment the user was bucketed into for the decided flag.
    pub experiment_id: Option<String>,
    pub variation_id: Option<String>,
}

#[derive(Serialize)]
struct EventBatch<'a> {
    events: &'a [ConversionEvent],
}

/// Sends a batch of events somewhere.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Deliver `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered.
    async fn dispatch(&self, events: &[ConversionEvent]) -> Result<(), ExperimentError>;
}

/// Posts event batches as JSON.
pub struct HttpDispatcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpDispatcher {
    #[must_use]
    pub const fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl EventDispatcher for HttpDispatcher {
    async fn dispatch(&self, events: &[ConversionEvent]) -> Result<(), ExperimentError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&EventBatch { events })
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExperimentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Logs events instead of sending them; used when no endpoint is set.
pub struct LogDispatcher;

#[async_trait]
impl EventDispatcher for LogDispatcher {
    async fn dispatch(&self, events: &[ConversionEvent]) -> Result<(), ExperimentError> {
        for event in events {
            info!(
                event = %event.key,
                user_id = %event.user_id,
                variation_id = event.variation_id.as_deref().unwrap_or("-"),
                "Conversion event"
            );
        }
        Ok(())
    }
}

enum BatchCommand {
    Event(ConversionEvent),
    Close(oneshot::Sender<()>),
}

enum Mode {
    Forwarding(Arc<dyn EventDispatcher>),
    Batch(mpsc::Sender<BatchCommand>),
}

/// Delivers events according to the configured processor kind.
pub struct EventProcessor {
    mode: Mode,
}

impl EventProcessor {
    /// Build a processor; the batching kind spawns its worker task.
    #[must_use]
    pub fn new(kind: &EventProcessorKind, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        let mode = match *kind {
            EventProcessorKind::Forwarding => Mode::Forwarding(dispatcher),
            EventProcessorKind::Batch {
                batch_size,
                flush_interval,
            } => {
                let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                tokio::spawn(run_batch_worker(
                    rx,
                    dispatcher,
                    batch_size.max(1),
                    flush_interval.max(Duration::from_millis(1)),
                ));
                Mode::Batch(tx)
            }
        };
        Self { mode }
    }

    /// Hand an event over for delivery.
    ///
    /// For the batching kind success means the event was queued.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error when forwarding, or
    /// `ExperimentError::Closed` once the batching worker has stopped.
    pub async fn process(&self, event: ConversionEvent) -> Result<(), ExperimentError> {
        match &self.mode {
            Mode::Forwarding(dispatcher) => dispatcher.dispatch(std::slice::from_ref(&event)).await,
            Mode::Batch(queue) => queue
                .send(BatchCommand::Event(event))
                .await
                .map_err(|_| ExperimentError::Closed),
        }
    }

    /// Flush queued events and stop the batching worker.
    pub async fn close(&self) {
        if let Mode::Batch(queue) = &self.mode {
            let (ack, done) = oneshot::channel();
            if queue.send(BatchCommand::Close(ack)).await.is_ok() {
                let _ = done.await;
            }
        }
    }
}

async fn run_batch_worker(
    mut rx: mpsc::Receiver<BatchCommand>,
    dispatcher: Arc<dyn EventDispatcher>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut pending = Vec::with_capacity(batch_size);
    let mut ticker = interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        batch_size,
        flush_interval_ms = flush_interval.as_millis(),
        "Event batch worker started"
    );

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(BatchCommand::Event(event)) => {
                    pending.push(event);
                    if pending.len() >= batch_size {
                        flush(dispatcher.as_ref(), &mut pending).await;
                    }
                }
                Some(BatchCommand::Close(ack)) => {
                    flush(dispatcher.as_ref(), &mut pending).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    flush(dispatcher.as_ref(), &mut pending).await;
                    break;
                }
            },
            _ = ticker.tick() => flush(dispatcher.as_ref(), &mut pending).await,
        }
    }

    debug!("Event batch worker stopped");
}

async fn flush(dispatcher: &dyn EventDispatcher, pending: &mut Vec<ConversionEvent>) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    match dispatcher.dispatch(&batch).await {
        Ok(()) => debug!(count = batch.len(), "Dispatched conversion events"),
        Err(e) => warn!(error = %e, dropped = batch.len(), "Failed to dispatch conversion events"),
    }
}
