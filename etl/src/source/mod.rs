//! Relational sources channels read rows from.
//!
//! A [`RelationalSource`] executes a rendered [`crate::query::SelectStatement`] with named
//! parameters and returns rows addressable by select alias.

mod base;
pub mod memory;
pub mod postgres;

pub use base::RelationalSource;
