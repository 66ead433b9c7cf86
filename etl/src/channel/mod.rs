//! Channel runs: the batch fetch and watermark loop plus update detection.
//!
//! A [`Channel`] is a channel configuration resolved against its datasource: a validated
//! schema tree, the statements derived from it and the merger for its rows. [`run_channel`]
//! drives one run of a channel to completion against a source and a search index.

mod definition;
mod runner;
mod summary;
mod updates;

pub use definition::Channel;
pub use runner::{ChannelRunner, run_channel};
pub use summary::ChannelRunSummary;
