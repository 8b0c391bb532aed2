//! User domain types.

use ai_store_core::{CountryCode, Email};

/// A registered shopper.
///
/// The password hash never leaves the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User's email address (identity).
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Country used as the experiment audience attribute.
    pub country: CountryCode,
}
