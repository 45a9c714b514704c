//! Streaming near-duplicate classification.
//!
//! Every event of a time-ordered stream is compared with the events seen
//! within the configured horizon. It is classified as a duplicate of the
//! best-scoring recent event when that score reaches the threshold, and as
//! novel otherwise.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        StreamPipeline                            │
//! │                                                                  │
//! │  admit ──▶ evict ──▶ events_within ──▶ classify ──▶ insert       │
//! │    │          │            │               │           │         │
//! │  order &   HistoryWindow (VecDeque,   DedupClassifier  root-     │
//! │  validity  oldest at the front)       + SimilarityScorer linked  │
//! └──────────────────────────────────────────────────────────────────┘
//!           PartitionedPipeline: one StreamPipeline per key
//! ```
//!
//! # Example
//!
//! ```rust
//! use alertdedup::services::deduplication::{DeduplicationConfig, StreamPipeline};
//! use alertdedup::models::Event;
//! use chrono::{TimeZone, Utc};
//!
//! let config = DeduplicationConfig::default().with_threshold(90.0);
//! let mut pipeline = StreamPipeline::new(config)?;
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
//!
//! pipeline.process(Event::new("1", t0, "High CPU on web-01"))?;
//! let result = pipeline.process(Event::new("2", t0, "high cpu on web-01"))?;
//! assert!(result.is_duplicate);
//! # Ok::<(), alertdedup::Error>(())
//! ```

mod classifier;
mod config;
mod partitioned;
mod pipeline;
mod similarity;
mod window;

pub use classifier::{BestMatch, DedupClassifier};
pub use config::{
    DEFAULT_HORIZON_SECS, DEFAULT_THRESHOLD, DeduplicationConfig, ResetPolicy, parse_duration,
};
pub use partitioned::{DEFAULT_PARTITION, PartitionedPipeline};
pub use pipeline::{PipelineStats, StreamPipeline};
pub use similarity::{FuzzRatio, MAX_SCORE, SimilarityScorer, default_process, indel_ratio};
pub use window::{HistoryWindow, WindowEntry};
