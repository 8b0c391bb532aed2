//! AI Store Core - Shared domain types.
//!
//! This crate provides the types used across all AI Store components:
//! - `server` - JSON API for catalog, cart, checkout and orders
//! - `cli` - Command-line tools for migrations, seeding and experiment checks
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, countries, order
//!   status and order snapshot lines

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
