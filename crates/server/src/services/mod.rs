//! Business logic services.
//!
//! - `auth` - Registration and password login
//! - `checkout` - Cart to order conversion
//! - `experiment` - Variant decisions and conversion tracking
//! - `locks` - Per-user mutual exclusion for cart and checkout

pub mod auth;
pub mod checkout;
pub mod experiment;
pub mod locks;

pub use auth::{AuthError, AuthService, Registration};
pub use checkout::{CheckoutError, CheckoutService};
pub use experiment::ExperimentClient;
pub use locks::UserLocks;
