//! Current datafile and its refresh loop.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::ExperimentError;
use super::datafile::Datafile;

/// Holder of the datafile decisions are made against.
///
/// Empty until a datafile has been loaded; readers get a cheap `Arc` clone
/// and never observe a half-replaced configuration.
#[derive(Debug, Default)]
pub struct ProjectConfig {
    current: RwLock<Option<Arc<Datafile>>>,
}

impl ProjectConfig {
    #[must_use]
    pub fn new(datafile: Option<Datafile>) -> Self {
        Self {
            current: RwLock::new(datafile.map(Arc::new)),
        }
    }

    /// The current datafile, if any has been loaded.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Datafile>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, datafile: Datafile) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(datafile));
    }
}

/// Outcome of one datafile request.
#[derive(Debug)]
pub enum Fetched {
    Updated {
        datafile: Datafile,
        last_modified: Option<String>,
    },
    NotModified,
}

/// Downloads the datafile from a fixed URL.
#[derive(Debug, Clone)]
pub struct DatafileFetcher {
    client: reqwest::Client,
    url: String,
}

impl DatafileFetcher {
    #[must_use]
    pub const fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    /// Request the datafile, conditional on `since` when given.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentError::Http` if the request fails,
    /// `ExperimentError::Api` for a non-success status, and
    /// `ExperimentError::Datafile` if the body does not parse.
    pub async fn fetch(&self, since: Option<&str>) -> Result<Fetched, ExperimentError> {
        let mut request = self.client.get(&self.url);
        if let Some(since) = since {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(Fetched::NotModified);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExperimentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;

        Ok(Fetched::Updated {
            datafile: Datafile::parse(&body)?,
            last_modified,
        })
    }
}

/// Fetch once and store the result; returns the `Last-Modified` value.
///
/// # Errors
///
/// Propagates the fetch error; the stored datafile is left unchanged.
pub async fn refresh(
    fetcher: &DatafileFetcher,
    config: &ProjectConfig,
    since: Option<&str>,
) -> Result<Option<String>, ExperimentError> {
    match fetcher.fetch(since).await? {
        Fetched::Updated {
            datafile,
            last_modified,
        } => {
            info!(revision = %datafile.revision, "Datafile updated");
            config.set(datafile);
            Ok(last_modified)
        }
        Fetched::NotModified => {
            debug!("Datafile not modified");
            Ok(since.map(str::to_owned))
        }
    }
}

/// Spawn the polling loop, which runs until `shutdown` flips to `true`.
///
/// The first refresh happens one `period` after spawning.
pub fn spawn_poller(
    fetcher: DatafileFetcher,
    config: Arc<ProjectConfig>,
    period: Duration,
    mut last_modified: Option<String>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Datafile poller stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match refresh(&fetcher, &config, last_modified.as_deref()).await {
                        Ok(value) => last_modified = value,
                        Err(e) => warn!(
                            error = %e,
                            "Datafile refresh failed; keeping previous datafile"
                        ),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::DatafileSource;

    #[test]
    fn test_project_config_swap() {
        let config = ProjectConfig::default();
        assert!(config.get().is_none());

        config.set(Datafile::embedded().unwrap());
        let first = config.get().unwrap();
        assert!(first.flag("test1").is_some());

        config.set(Datafile::parse(r#"{"revision":"2"}"#).unwrap());
        assert_eq!(config.get().unwrap().revision, "2");
        // Earlier readers keep the datafile they loaded.
        assert_eq!(first.revision, "1");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        let fetcher = DatafileFetcher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/datafile.json".to_owned(),
        );
        let config = ProjectConfig::default();

        assert!(refresh(&fetcher, &config, None).await.is_err());
        assert!(config.get().is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_expose_sdk_key() {
        let source = DatafileSource::SdkKey(SecretString::from("TopSecretSdkKey987654"));
        let url = source
            .datafile_url()
            .unwrap()
            .replace("https://cdn.optimizely.com/", "http://127.0.0.1:9/");
        assert!(url.contains("TopSecretSdkKey987654"));
        let fetcher = DatafileFetcher::new(reqwest::Client::new(), url);

        let error = fetcher.fetch(None).await.unwrap_err();
        assert!(matches!(error, ExperimentError::Http(_)));
        assert!(!error.to_string().contains("TopSecretSdkKey987654"));
    }

    #[tokio::test]
    async fn test_poller_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let fetcher = DatafileFetcher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/datafile.json".to_owned(),
        );
        let handle = spawn_poller(
            fetcher,
            Arc::new(ProjectConfig::default()),
            Duration::from_secs(300),
            None,
            rx,
        );

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
