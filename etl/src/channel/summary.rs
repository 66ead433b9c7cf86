use crate::types::Cell;

/// What one run of a channel did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRunSummary {
    /// Documents written by the incremental fetch.
    pub inserted_count: usize,
    /// Documents rewritten by update detection.
    pub updated_count: usize,
    /// Documents the index rejected in otherwise successful bulk requests.
    pub failed_count: usize,
    /// Root watermark after the run, `None` while nothing was ever persisted.
    pub final_watermark: Option<Cell>,
}
