//! Per channel progress persisted between runs.
//!
//! A [`Checkpoint`] records the root watermark a channel reached, when it last ran and the
//! channel configuration it ran with. [`CheckpointStore`] keeps one checkpoint document per
//! channel in a dedicated index of the channel's search cluster.

mod checkpoint;
mod store;

pub use checkpoint::Checkpoint;
pub use store::CheckpointStore;
