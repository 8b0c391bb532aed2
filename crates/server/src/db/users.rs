//! User repository for database operations.

use ai_store_core::{CountryCode, Email};
use sqlx::SqlitePool;

use super::{RepositoryError, conflict_on_unique};
use crate::models::User;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    email: String,
    name: String,
    password: String,
    country: Option<String>,
}

impl UserRow {
    fn into_user(self) -> Result<(User, String), RepositoryError> {
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let user = User {
            email,
            name: self.name,
            country: CountryCode::or_default(self.country.as_deref()),
        };
        Ok((user, self.password))
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .get_with_password_hash(email)
            .await?
            .map(|(user, _)| user))
    }

    /// Get a user together with their stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_with_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT email, name, password, country FROM users WHERE email = ?1")
                .bind(email.as_str())
                .fetch_optional(self.pool)
                .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
        country: &CountryCode,
    ) -> Result<User, RepositoryError> {
        sqlx::query("INSERT INTO users (email, name, password, country) VALUES (?1, ?2, ?3, ?4)")
            .bind(email.as_str())
            .bind(name)
            .bind(password_hash)
            .bind(country.as_str())
            .execute(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "email already exists"))?;

        Ok(User {
            email: email.clone(),
            name: name.to_owned(),
            country: country.clone(),
        })
    }

    /// Replace a user's stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_password_hash(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password = ?1 WHERE email = ?2")
            .bind(password_hash)
            .bind(email.as_str())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
