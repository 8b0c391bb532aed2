//! Project datafile model.
//!
//! A datafile is the JSON project configuration published by the
//! experimentation backend. Only the parts needed to decide a flag and
//! attribute a conversion are modelled; unknown fields are ignored so newer
//! datafile revisions still parse.

use std::collections::HashMap;

use serde::Deserialize;

use super::ExperimentError;

/// Datafile embedded in the binary, used when no SDK key or URL is set.
const STATIC_DATAFILE: &str = include_str!("static_datafile.json");

/// Experiment status that takes part in decisions.
pub const RUNNING: &str = "Running";

/// A parsed project configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub audiences: Vec<Audience>,
    #[serde(default)]
    pub typed_audiences: Vec<Audience>,
    #[serde(default)]
    pub events: Vec<EventType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub audience_ids: Vec<String>,
    /// User id -> variation key overrides.
    #[serde(default)]
    pub forced_variations: HashMap<String, String>,
    #[serde(default)]
    pub traffic_allocation: Vec<TrafficAllocation>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

/// Bucket range `[previous end, end_of_range)` mapped to a variation id.
///
/// An empty `entity_id` marks traffic held out of the experiment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficAllocation {
    pub entity_id: String,
    pub end_of_range: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub feature_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
}

/// Audience with its condition tree.
///
/// Legacy audiences carry the tree as a JSON string, typed audiences as a
/// JSON value; both are kept as a `serde_json::Value`.
#[derive(Debug, Clone, Deserialize)]
pub struct Audience {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub conditions: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
}

impl Datafile {
    /// Parse a datafile from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentError::Datafile` if the text is not a datafile.
    pub fn parse(text: &str) -> Result<Self, ExperimentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The datafile compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentError::Datafile` if the embedded JSON is invalid.
    pub fn embedded() -> Result<Self, ExperimentError> {
        Self::parse(STATIC_DATAFILE)
    }

    #[must_use]
    pub fn flag(&self, key: &str) -> Option<&FeatureFlag> {
        self.feature_flags.iter().find(|f| f.key == key)
    }

    #[must_use]
    pub fn experiment(&self, id: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.id == id)
    }

    /// Audience by id; typed audiences take precedence over legacy ones.
    #[must_use]
    pub fn audience(&self, id: &str) -> Option<&Audience> {
        self.typed_audiences
            .iter()
            .chain(&self.audiences)
            .find(|a| a.id == id)
    }

    #[must_use]
    pub fn event(&self, key: &str) -> Option<&EventType> {
        self.events.iter().find(|e| e.key == key)
    }
}

impl Experiment {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RUNNING
    }

    #[must_use]
    pub fn variation_by_id(&self, id: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }

    #[must_use]
    pub fn variation_by_key(&self, key: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.key == key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_datafile() {
        let datafile = Datafile::embedded().unwrap();
        let flag = datafile.flag("test1").unwrap();
        assert_eq!(flag.experiment_ids, vec!["store_ui_experiment"]);

        let experiment = datafile.experiment("store_ui_experiment").unwrap();
        assert!(experiment.is_running());
        assert_eq!(experiment.traffic_allocation.len(), 2);
        assert_eq!(experiment.traffic_allocation[1].end_of_range, 10_000);
        assert_eq!(experiment.variation_by_id("variation_2").unwrap().key, "v2");
        assert!(datafile.event("order_placed").is_some());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let datafile = Datafile::parse(
            r#"{"version":"4","revision":"7","rollouts":[{"id":"r"}],"sdkKey":"x","featureFlags":[]}"#,
        )
        .unwrap();
        assert_eq!(datafile.revision, "7");
        assert!(datafile.experiments.is_empty());
    }

    #[test]
    fn test_invalid_datafile() {
        assert!(matches!(
            Datafile::parse("<html>"),
            Err(ExperimentError::Datafile(_))
        ));
    }
}
