//! Data models for alertdedup.
//!
//! This module contains the values that flow through the dedup engine: input
//! events and the per-event classification records it emits.

mod classification;
mod event;

pub use classification::ClassificationResult;
pub use event::{Event, EventId};
