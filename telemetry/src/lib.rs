//! Process wide tracing setup shared by the replicator binary and the test suites.

pub mod tracing;
