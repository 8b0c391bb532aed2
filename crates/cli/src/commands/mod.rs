//! CLI command implementations.

pub mod decide;
pub mod migrate;
pub mod seed;
