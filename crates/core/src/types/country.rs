//! ISO 3166-1 alpha-2 country code.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CountryCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CountryCodeError {
    #[error("country code must be two ASCII letters, got {0:?}")]
    Invalid(String),
}

/// Two-letter upper-case country code, used as an experiment audience attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Default country for users without one (legacy rows, omitted form field).
    pub const DEFAULT: &'static str = "KR";

    /// Parse and upper-case a country code.
    ///
    /// # Errors
    ///
    /// Returns `CountryCodeError::Invalid` unless the trimmed input is exactly
    /// two ASCII letters.
    pub fn parse(s: &str) -> Result<Self, CountryCodeError> {
        let trimmed = s.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(CountryCodeError::Invalid(s.to_owned()))
        }
    }

    /// Parse a stored value, falling back to [`CountryCode::DEFAULT`] when it is
    /// missing or malformed.
    #[must_use]
    pub fn or_default(value: Option<&str>) -> Self {
        value.and_then(|v| Self::parse(v).ok()).unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!(CountryCode::parse("us").unwrap().as_str(), "US");
        assert_eq!(CountryCode::parse(" jp ").unwrap().as_str(), "JP");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CountryCode::parse("KOR").is_err());
        assert!(CountryCode::parse("1A").is_err());
        assert!(CountryCode::parse("").is_err());
    }

    #[test]
    fn test_or_default() {
        assert_eq!(CountryCode::or_default(None).as_str(), "KR");
        assert_eq!(CountryCode::or_default(Some("")).as_str(), "KR");
        assert_eq!(CountryCode::or_default(Some("us")).as_str(), "US");
    }
}
