//! Experiment variant decisions and conversion tracking.
//!
//! [`ExperimentClient`] is built once at startup from [`ExperimentConfig`]
//! and closed on shutdown, which flushes queued conversion events. Nothing in
//! here fails the caller: without a datafile every user gets the default
//! variant, and tracking reports success as a plain `bool`.

mod audience;
mod bucketing;
mod datafile;
mod decision;
mod events;
mod project_config;
mod ui_config;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ai_store_core::{CountryCode, Email};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use audience::Attributes;
pub use bucketing::{MAX_TRAFFIC_VALUE, bucket_value};
pub use datafile::Datafile;
pub use decision::{Decision, decide_flag};
pub use events::{
    ConversionEvent, EventDispatcher, EventProcessor, HttpDispatcher, LogDispatcher, ORDER_PLACED,
};
pub use ui_config::{DEFAULT_VARIANT, UiConfig, ui_config};

use self::project_config::{DatafileFetcher, ProjectConfig, refresh, spawn_poller};
use crate::config::ExperimentConfig;

/// Timeout for datafile and event HTTP requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Attribute the audience conditions target.
pub const COUNTRY_ATTRIBUTE: &str = "country";

/// Errors inside the experiment client. Never returned to HTTP callers.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("invalid datafile: {0}")]
    Datafile(#[from] serde_json::Error),

    #[error("event processor is closed")]
    Closed,
}

/// Request URLs carry the SDK key, so they never reach the error text.
impl From<reqwest::Error> for ExperimentError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.without_url())
    }
}

/// Experiment decisions and conversion tracking for the store.
///
/// Cheap to clone; clones share the datafile, event queue and poller.
#[derive(Clone)]
pub struct ExperimentClient {
    inner: Arc<Inner>,
}

struct Inner {
    flag_key: String,
    project: Arc<ProjectConfig>,
    events: EventProcessor,
    track_timeout: Duration,
    shutdown: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ExperimentClient {
    /// Build a client from configuration.
    ///
    /// With a remote source the first datafile fetch is awaited and a poller
    /// keeps it fresh; a failed fetch is logged and decisions fall back to
    /// the default variant until a later refresh succeeds.
    pub async fn init(config: &ExperimentConfig) -> Self {
        Self::init_with(config, reqwest::Client::builder().timeout(HTTP_TIMEOUT)).await
    }

    /// Without a working HTTP client the embedded datafile is used and
    /// events are only logged.
    async fn init_with(config: &ExperimentConfig, builder: reqwest::ClientBuilder) -> Self {
        let http = match builder.build() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(
                    error = %e,
                    "HTTP client unavailable; using embedded datafile and logging events"
                );
                None
            }
        };

        let dispatcher: Arc<dyn EventDispatcher> = match (&http, &config.events_url) {
            (Some(http), Some(url)) => Arc::new(HttpDispatcher::new(http.clone(), url.clone())),
            _ => Arc::new(LogDispatcher),
        };
        let events = EventProcessor::new(&config.event_processor, dispatcher);

        let project = Arc::new(ProjectConfig::default());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let remote = http.zip(config.source.datafile_url());
        let poller = match remote {
            None => {
                match Datafile::embedded() {
                    Ok(datafile) => project.set(datafile),
                    Err(e) => warn!(error = %e, "Embedded datafile is invalid"),
                }
                None
            }
            Some((http, url)) => {
                let fetcher = DatafileFetcher::new(http, url);
                let last_modified = match refresh(&fetcher, &project, None).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(
                            error = %e,
                            source = %config.source.describe(),
                            "Initial datafile fetch failed; using default variant until refresh"
                        );
                        None
                    }
                };
                Some(spawn_poller(
                    fetcher,
                    Arc::clone(&project),
                    config.poll_interval,
                    last_modified,
                    shutdown_rx,
                ))
            }
        };

        info!(
            source = %config.source.describe(),
            flag_key = %config.flag_key,
            event_processor = ?config.event_processor,
            "Experiment client initialized"
        );

        Self {
            inner: Arc::new(Inner {
                flag_key: config.flag_key.clone(),
                project,
                events,
                track_timeout: config.track_timeout,
                shutdown,
                poller: Mutex::new(poller),
            }),
        }
    }

    /// Build a client around a fixed datafile (or none) and event processor.
    #[must_use]
    pub fn new(
        flag_key: impl Into<String>,
        datafile: Option<Datafile>,
        events: EventProcessor,
        track_timeout: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                flag_key: flag_key.into(),
                project: Arc::new(ProjectConfig::new(datafile)),
                events,
                track_timeout,
                shutdown,
                poller: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn flag_key(&self) -> &str {
        &self.inner.flag_key
    }

    /// Decide the storefront flag for a user.
    ///
    /// Deterministic for a given user and datafile revision.
    #[must_use]
    pub fn decide(&self, user: &Email, country: &CountryCode) -> Decision {
        let flag_key = &self.inner.flag_key;
        let Some(datafile) = self.inner.project.get() else {
            warn!(user = %user, "No datafile available; serving default variant");
            return Decision::fallback(flag_key, "datafile not available");
        };

        let decision = decide_flag(&datafile, flag_key, user.as_str(), &attributes(country));
        info!(
            user = %user,
            country = %country,
            variant = %decision.variant,
            enabled = decision.enabled,
            "Variant decided"
        );
        decision
    }

    /// Record an `order_placed` conversion, bounded by the track timeout.
    ///
    /// Returns whether the event was handed to the processor.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn track_conversion(&self, user: &Email, country: &CountryCode) -> bool {
        let Some(datafile) = self.inner.project.get() else {
            warn!("No datafile available; conversion not tracked");
            return false;
        };

        let attributes = attributes(country);
        let decision = decide_flag(&datafile, &self.inner.flag_key, user.as_str(), &attributes);
        let event = ConversionEvent {
            uuid: Uuid::new_v4(),
            key: ORDER_PLACED.to_owned(),
            entity_id: datafile.event(ORDER_PLACED).map(|e| e.id.clone()),
            user_id: user.as_str().to_owned(),
            attributes,
            timestamp: Utc::now().timestamp_millis(),
            project_id: datafile.project_id.clone(),
            revision: datafile.revision.clone(),
            experiment_id: decision.experiment_id,
            variation_id: decision.variation_id,
        };

        let processed = self.inner.events.process(event);
        match tokio::time::timeout(self.inner.track_timeout, processed).await {
            Ok(Ok(())) => {
                info!("Order conversion tracked");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Conversion tracking failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.inner.track_timeout.as_millis(),
                    "Conversion tracking timed out"
                );
                false
            }
        }
    }

    /// Stop polling and flush queued events.
    pub async fn close(&self) {
        let _ = self.inner.shutdown.send(true);
        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = poller
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Datafile poller ended abnormally");
        }

        self.inner.events.close().await;
        info!("Experiment client closed, events flushed");
    }
}

fn attributes(country: &CountryCode) -> Attributes {
    Attributes::from([(COUNTRY_ATTRIBUTE.to_owned(), country.as_str().to_owned())])
}
