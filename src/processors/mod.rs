pub mod extraction_worker;
pub mod merge_store;
pub mod nearest_neighbor;
pub mod parallel_scheduler;
pub mod run_report;

pub use extraction_worker::{ExtractionWorker, FileOutcome, StationFailure};
pub use merge_store::{dedup_merge, ConflictPolicy, DedupMergeStore, MergeSummary, MergedRows, NaturalKey};
pub use nearest_neighbor::{nearest_cell, NearestNeighborIndex, StationCellIndex};
pub use parallel_scheduler::{BatchOutput, ParallelScheduler};
pub use run_report::{RunReport, SkippedFile};
