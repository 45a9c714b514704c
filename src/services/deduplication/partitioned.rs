//! Independent pipelines keyed by partition.
//!
//! Each partition (for example a service or host name) gets its own
//! [`StreamPipeline`] and therefore its own window, ordering contract and
//! counters. Events in different partitions are never compared.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::config::DeduplicationConfig;
use super::pipeline::{PipelineStats, StreamPipeline};
use super::similarity::{FuzzRatio, SimilarityScorer};
use crate::models::{ClassificationResult, Event};
use crate::Result;

/// Partition used for records that carry no partition key.
pub const DEFAULT_PARTITION: &str = "_default";

/// A set of [`StreamPipeline`]s created lazily per partition key.
///
/// A partition only comes into existence once one of its events is
/// admitted. Rejections of events that would have opened a new partition
/// are still counted in [`Self::stats`].
#[derive(Debug)]
pub struct PartitionedPipeline<S: SimilarityScorer + Clone = FuzzRatio> {
    config: DeduplicationConfig,
    scorer: S,
    pipelines: HashMap<String, StreamPipeline<S>>,
    unrouted: PipelineStats,
}

impl PartitionedPipeline<FuzzRatio> {
    /// Creates an empty set of pipelines sharing `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration is invalid.
    pub fn new(config: DeduplicationConfig) -> Result<Self> {
        let scorer = FuzzRatio::new(config.normalize);
        Self::with_scorer(config, scorer)
    }
}

impl<S: SimilarityScorer + Clone> PartitionedPipeline<S> {
    /// Creates an empty set of pipelines that each score with a clone of
    /// `scorer`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration is invalid.
    pub fn with_scorer(config: DeduplicationConfig, scorer: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            scorer,
            pipelines: HashMap::new(),
            unrouted: PipelineStats::default(),
        })
    }

    /// Routes an event to its partition's pipeline.
    ///
    /// A `None` or blank key goes to [`DEFAULT_PARTITION`].
    ///
    /// # Errors
    ///
    /// Propagates every error from [`StreamPipeline::process`]. Ordering is
    /// enforced per partition, so interleaved partitions may each move at
    /// their own pace.
    pub fn process(&mut self, partition: Option<&str>, event: Event) -> Result<ClassificationResult> {
        let key = match partition.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => DEFAULT_PARTITION,
        };

        match self.pipelines.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => occupied.get_mut().process(event),
            Entry::Vacant(vacant) => {
                let mut pipeline =
                    StreamPipeline::with_scorer(self.config.clone(), self.scorer.clone())?;
                match pipeline.process(event) {
                    Err(e) if e.is_rejection() => {
                        self.unrouted.merge(&pipeline.stats());
                        Err(e)
                    },
                    outcome => {
                        tracing::debug!(partition = key, "Created partition pipeline");
                        vacant.insert(pipeline);
                        outcome
                    },
                }
            },
        }
    }

    /// Number of partitions seen so far.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns the pipeline for a partition, if it exists.
    #[must_use]
    pub fn partition(&self, key: &str) -> Option<&StreamPipeline<S>> {
        self.pipelines.get(key)
    }

    /// Combined counters across all partitions.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let mut total = self.unrouted;
        for pipeline in self.pipelines.values() {
            total.merge(&pipeline.stats());
        }
        total
    }

    /// Ends every stream and returns per-partition counters, sorted by key.
    pub fn finish(self) -> Vec<(String, PipelineStats)> {
        let mut stats: Vec<_> = self
            .pipelines
            .into_iter()
            .map(|(key, pipeline)| (key, pipeline.finish()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}
