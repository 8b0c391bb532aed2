//! Domain models for the store.
//!
//! These types represent validated domain objects separate from database row
//! types; repositories convert rows into them.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::CartItem;
pub use order::{NewOrder, Order};
pub use product::Product;
pub use user::User;
