//! Flag decisions against a datafile.

use serde::Serialize;

use super::audience::{self, Attributes};
use super::bucketing::{allocate, bucket_value};
use super::datafile::Datafile;
use super::ui_config::DEFAULT_VARIANT;

/// The variant a user sees for a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub variant: String,
    pub enabled: bool,
    pub flag_key: String,
    /// Key of the experiment that produced the variant.
    pub rule_key: Option<String>,
    pub reasons: Vec<String>,
    #[serde(skip)]
    pub experiment_id: Option<String>,
    #[serde(skip)]
    pub variation_id: Option<String>,
}

impl Decision {
    /// Decision used when no datafile is available.
    #[must_use]
    pub fn fallback(flag_key: &str, reason: impl Into<String>) -> Self {
        Self {
            variant: DEFAULT_VARIANT.to_owned(),
            enabled: true,
            flag_key: flag_key.to_owned(),
            rule_key: None,
            reasons: vec![reason.into()],
            experiment_id: None,
            variation_id: None,
        }
    }

    /// Default variant with the flag off; the user matched no rule.
    fn off(flag_key: &str, reasons: Vec<String>) -> Self {
        Self {
            enabled: false,
            reasons,
            ..Self::fallback(flag_key, String::new())
        }
    }
}

/// Decide `flag_key` for `user_id`.
///
/// Experiments attached to the flag are tried in order; the first one that
/// is running, admits the user's audience and buckets them into a variation
/// wins. Forced variations override bucketing.
#[must_use]
pub fn decide_flag(
    datafile: &Datafile,
    flag_key: &str,
    user_id: &str,
    attributes: &Attributes,
) -> Decision {
    let Some(flag) = datafile.flag(flag_key) else {
        return Decision::off(flag_key, vec![format!("no flag was found for key \"{flag_key}\"")]);
    };

    let mut reasons = Vec::new();

    for experiment_id in &flag.experiment_ids {
        let Some(experiment) = datafile.experiment(experiment_id) else {
            reasons.push(format!("experiment \"{experiment_id}\" is not in the datafile"));
            continue;
        };
        if !experiment.is_running() {
            reasons.push(format!("experiment \"{}\" is not running", experiment.key));
            continue;
        }

        let variation = if let Some(forced) = experiment
            .forced_variations
            .get(user_id)
            .and_then(|key| experiment.variation_by_key(key))
        {
            reasons.push(format!(
                "user \"{user_id}\" is forced into variation \"{}\"",
                forced.key
            ));
            Some(forced)
        } else if !audience::qualifies(datafile, experiment, attributes) {
            reasons.push(format!(
                "user \"{user_id}\" does not meet the audience of \"{}\"",
                experiment.key
            ));
            None
        } else {
            let bucket = bucket_value(user_id, &experiment.id);
            let variation = allocate(&experiment.traffic_allocation, bucket)
                .and_then(|id| experiment.variation_by_id(id));
            if variation.is_none() {
                reasons.push(format!(
                    "user \"{user_id}\" is not in any variation of \"{}\"",
                    experiment.key
                ));
            }
            variation
        };

        if let Some(variation) = variation {
            return Decision {
                variant: variation.key.clone(),
                enabled: variation.feature_enabled,
                flag_key: flag_key.to_owned(),
                rule_key: Some(experiment.key.clone()),
                reasons,
                experiment_id: Some(experiment.id.clone()),
                variation_id: Some(variation.id.clone()),
            };
        }
    }

    Decision::off(flag_key, reasons)
}
