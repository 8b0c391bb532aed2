//! Core types for AI Store.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod country;
pub mod email;
pub mod id;
pub mod money;
pub mod order_line;
pub mod status;

pub use country::{CountryCode, CountryCodeError};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use order_line::OrderLine;
pub use status::*;
