//! Registration and login routes.
//!
//! Both respond with the user's profile plus the experiment variant decided
//! for them and the UI settings for that variant.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, set_sentry_user};
use crate::models::User;
use crate::services::experiment::{UiConfig, ui_config};
use crate::services::{AuthService, Registration};
use crate::state::AppState;

use super::json_body;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile plus experiment assignment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub email: String,
    pub name: String,
    pub country: String,
    pub variant: String,
    pub ui_config: &'static UiConfig,
}

fn session_response(state: &AppState, user: User) -> SessionResponse {
    let decision = state.experiments().decide(&user.email, &user.country);
    SessionResponse {
        ui_config: ui_config(&decision.variant),
        variant: decision.variant,
        country: user.country.to_string(),
        email: user.email.into_inner(),
        name: user.name,
    }
}

/// Register a new user.
///
/// POST /api/register
///
/// # Errors
///
/// 400 if a field is missing, 409 if the email is already registered.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let body = json_body(payload)?;
    state.schema().ensure_ready("users")?;

    let user = AuthService::new(state.pool())
        .register(&Registration {
            email: &body.email,
            name: &body.name,
            password: &body.password,
            country: body.country.as_deref(),
        })
        .await?;

    set_sentry_user(user.email.as_str());
    tracing::info!(user = %user.email, country = %user.country, "User registered");

    Ok(Json(session_response(&state, user)))
}

/// Log a user in.
///
/// POST /api/login
///
/// # Errors
///
/// 401 on an unknown email or wrong password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let body = json_body(payload)?;
    state.schema().ensure_ready("users")?;

    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    set_sentry_user(user.email.as_str());
    Ok(Json(session_response(&state, user)))
}
