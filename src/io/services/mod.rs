//! Run orchestration over sources and sinks.

pub mod runner;
pub mod sorted;

pub use runner::{
    DedupRunner, MAX_REPORTED_ERRORS, ProgressCallback, RejectPolicy, RunOptions, RunProgress,
    RunSummary,
};
pub use sorted::SortedSource;
