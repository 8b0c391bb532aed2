//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Server
//! - `DATABASE_URL` - SQLite connection string (default: `sqlite://store.db`)
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `CORS_ORIGIN` - Comma-separated origin allowlist (unset: any origin)
//! - `APP_ENV` - `development` or `production` (default: production)
//! - `FRONTEND_DIST_DIR` - Built SPA directory served in production
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//!
//! ## Experimentation
//!
//! In development the `_DEV` suffixed variants of the SDK key and datafile
//! URL are read instead.
//!
//! - `EXPERIMENT_SDK_KEY` - SDK key; the datafile is polled from the CDN
//! - `EXPERIMENT_DATAFILE_URL` - Explicit datafile URL (used when no SDK key)
//! - `EXPERIMENT_FLAG_KEY` - Flag decided for the header UI (default: test1)
//! - `EXPERIMENT_EVENT_PROCESSOR` - `forwarding` or `batch`
//! - `EXPERIMENT_EVENT_BATCH_SIZE` - Events per batch (default: 10)
//! - `EXPERIMENT_EVENT_FLUSH_INTERVAL_MS` - Batch flush interval (default: 1000)
//! - `EXPERIMENT_EVENTS_URL` - Conversion event endpoint (unset: log only)
//! - `EXPERIMENT_TRACK_TIMEOUT_MS` - Bound on a single track call (default: 2000)
//! - `EXPERIMENT_DATAFILE_POLL_SECS` - Datafile refresh interval (default: 300)
//!
//! Without an SDK key or datafile URL the embedded static datafile is used.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// CDN location of the datafile for an SDK key.
const SDK_KEY_DATAFILE_URL: &str = "https://cdn.optimizely.com/datafiles/";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite connection URL
    pub database_url: String,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
    /// Deployment environment
    pub environment: Environment,
    /// Built frontend served with an SPA fallback in production
    pub frontend_dist_dir: Option<PathBuf>,
    /// Experimentation backend configuration
    pub experiment: ExperimentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Where the experiment datafile comes from.
#[derive(Clone)]
pub enum DatafileSource {
    /// Embedded datafile; no network access.
    Static,
    /// Poll the CDN datafile for this SDK key.
    SdkKey(SecretString),
    /// Poll an explicit datafile URL.
    Url(Url),
}

impl DatafileSource {
    /// URL to poll, or `None` for the static datafile.
    #[must_use]
    pub fn datafile_url(&self) -> Option<String> {
        match self {
            Self::Static => None,
            Self::SdkKey(key) => Some(format!(
                "{SDK_KEY_DATAFILE_URL}{}.json",
                key.expose_secret()
            )),
            Self::Url(url) => Some(url.to_string()),
        }
    }

    /// Log-safe description of the source.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Static => "static datafile".to_owned(),
            Self::SdkKey(key) => format!("SDK key {}", mask_sdk_key(key.expose_secret())),
            Self::Url(url) => format!("datafile URL {}", mask_url(url)),
        }
    }
}

impl std::fmt::Debug for DatafileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// How conversion events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventProcessorKind {
    /// Dispatch every event immediately.
    Forwarding,
    /// Group events and flush on size or interval.
    Batch {
        batch_size: usize,
        flush_interval: Duration,
    },
}

/// Experimentation backend configuration.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub source: DatafileSource,
    /// Feature flag decided for the storefront UI
    pub flag_key: String,
    pub event_processor: EventProcessorKind,
    /// Conversion event endpoint; `None` logs events instead of sending them
    pub events_url: Option<Url>,
    /// Upper bound on one `track_conversion` call
    pub track_timeout: Duration,
    /// Datafile refresh interval for polling sources
    pub poll_interval: Duration,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            source: DatafileSource::Static,
            flag_key: "test1".to_owned(),
            event_processor: EventProcessorKind::Batch {
                batch_size: 10,
                flush_interval: Duration::from_millis(1000),
            },
            events_url: None,
            track_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let environment = match env.optional("APP_ENV").as_deref() {
            Some("development") => Environment::Development,
            _ => Environment::Production,
        };

        Ok(Self {
            database_url: env.or_default("DATABASE_URL", "sqlite://store.db"),
            host: env.parsed("HOST", "127.0.0.1")?,
            port: env.parsed("PORT", "3000")?,
            cors_origins: env
                .optional("CORS_ORIGIN")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
            environment,
            frontend_dist_dir: env.optional("FRONTEND_DIST_DIR").map(PathBuf::from),
            experiment: ExperimentConfig::from_env(&env, environment)?,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ExperimentConfig {
    fn from_env(env: &Env<'_>, environment: Environment) -> Result<Self, ConfigError> {
        let suffix = if environment.is_development() { "_DEV" } else { "" };
        let sdk_key = env.optional(&format!("EXPERIMENT_SDK_KEY{suffix}"));
        let datafile_url_key = format!("EXPERIMENT_DATAFILE_URL{suffix}");
        let datafile_url = env.optional(&datafile_url_key);

        // SDK key takes precedence over an explicit datafile URL
        let source = match (sdk_key, datafile_url) {
            (Some(key), _) => DatafileSource::SdkKey(SecretString::from(key)),
            (None, Some(raw)) => DatafileSource::Url(
                Url::parse(&raw)
                    .map_err(|e| ConfigError::InvalidEnvVar(datafile_url_key, e.to_string()))?,
            ),
            (None, None) => DatafileSource::Static,
        };

        let default_processor = if environment.is_development() {
            "forwarding"
        } else {
            "batch"
        };
        let event_processor = match env
            .or_default("EXPERIMENT_EVENT_PROCESSOR", default_processor)
            .as_str()
        {
            "forwarding" => EventProcessorKind::Forwarding,
            "batch" => EventProcessorKind::Batch {
                batch_size: env.parsed::<usize>("EXPERIMENT_EVENT_BATCH_SIZE", "10")?.max(1),
                flush_interval: Duration::from_millis(
                    env.parsed("EXPERIMENT_EVENT_FLUSH_INTERVAL_MS", "1000")?,
                ),
            },
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "EXPERIMENT_EVENT_PROCESSOR".to_owned(),
                    format!("expected 'forwarding' or 'batch', got '{other}'"),
                ));
            }
        };

        let events_url = env
            .optional("EXPERIMENT_EVENTS_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("EXPERIMENT_EVENTS_URL".to_owned(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            source,
            flag_key: env.or_default("EXPERIMENT_FLAG_KEY", "test1"),
            event_processor,
            events_url,
            track_timeout: Duration::from_millis(
                env.parsed("EXPERIMENT_TRACK_TIMEOUT_MS", "2000")?,
            ),
            poll_interval: Duration::from_secs(env.parsed("EXPERIMENT_DATAFILE_POLL_SECS", "300")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with typed accessors.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_owned())
    }

    /// Parse a variable (or its default) into `T`.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
    }
}

/// Split a comma-separated origin list.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Mask an SDK key for logging: first 8 and last 4 characters.
#[must_use]
pub fn mask_sdk_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 12 {
        let head: String = chars.iter().take(8).collect();
        let tail: String = chars.iter().skip(chars.len() - 4).collect();
        format!("{head}...{tail}")
    } else {
        "***...***".to_owned()
    }
}

/// Mask a URL for logging: origin only.
#[must_use]
pub fn mask_url(url: &Url) -> String {
    format!("{}/***", url.origin().ascii_serialization())
}
