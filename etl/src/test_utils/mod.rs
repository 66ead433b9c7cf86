//! Helpers for testing channels without a database or a search cluster.
//!
//! [`crate::source::memory::MemorySource`] and
//! [`crate::destination::memory::MemorySearchIndex`] stand in for the collaborators; the
//! [`fixtures`] module declares an orders channel with one-to-many order lines and the rows
//! that feed it.

pub mod fixtures;
