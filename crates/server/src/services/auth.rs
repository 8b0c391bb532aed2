//! Registration and password login.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use ai_store_core::{CountryCode, Email, EmailError};

use crate::db::{RepositoryError, UserRepository};
use crate::models::User;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// A required field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Wrong password or unknown user.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("password hashing error")]
    PasswordHash,
}

/// Fields of a registration request.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password: &'a str,
    pub country: Option<&'a str>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new user.
    ///
    /// An unrecognised country code falls back to the default country.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` for a blank name or password,
    /// `AuthError::InvalidEmail` for a malformed email and
    /// `AuthError::UserAlreadyExists` if the email is taken.
    pub async fn register(&self, registration: &Registration<'_>) -> Result<User, AuthError> {
        let name = registration.name.trim();
        for (field, value) in [
            ("email", registration.email.trim()),
            ("name", name),
            ("password", registration.password),
        ] {
            if value.is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }
        let email = Email::parse(registration.email)?;

        let country = CountryCode::or_default(registration.country);
        let password_hash = hash_password(registration.password)?;

        self.users
            .create(&email, name, &password_hash, &country)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Check a user's password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown or
    /// the password does not match.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, stored) = self
            .users
            .get_with_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if PasswordHash::new(&stored).is_ok() {
            verify_password(password, &stored)?;
            return Ok(user);
        }

        // Rows written before hashing hold the password itself
        if stored.is_empty() || stored != password {
            return Err(AuthError::InvalidCredentials);
        }
        let upgraded = hash_password(password)?;
        self.users.set_password_hash(&user.email, &upgraded).await?;
        info!(user = %user.email, "Upgraded legacy plaintext password");
        Ok(user)
    }
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on mismatch or an unreadable hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}
