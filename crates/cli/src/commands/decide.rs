//! Show the variant decision for a user.

use serde_json::json;

use ai_store_core::{CountryCode, Email};
use ai_store_server::config::ServerConfig;
use ai_store_server::services::ExperimentClient;
use ai_store_server::services::experiment::{Decision, ui_config};

/// Decide the configured flag for `email` and print it with the UI config.
///
/// Uses the datafile source from the environment, so the answer matches
/// what the running server would return at login.
///
/// # Errors
///
/// Returns an error if the email or country is malformed or the
/// configuration is invalid.
pub async fn run(email: &str, country: &str) -> Result<(), Box<dyn std::error::Error>> {
    let email = Email::parse(email)?;
    let country = CountryCode::parse(country)?;
    let config = ServerConfig::from_env()?;

    let client = ExperimentClient::init(&config.experiment).await;
    let decision = client.decide(&email, &country);
    client.close().await;

    let output = render(&email, &country, &decision)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}

fn render(
    email: &Email,
    country: &CountryCode,
    decision: &Decision,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({
        "email": email,
        "country": country,
        "decision": decision,
        "uiConfig": ui_config(&decision.variant),
    }))
}
