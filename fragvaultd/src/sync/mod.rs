pub mod plan;
pub mod synchronizer;

pub use synchronizer::{SyncCounts, SyncError, SyncOutcome, SyncReport, Synchronizer};
