//! Business logic services.
//!
//! The only service is the streaming dedup engine; I/O lives in [`crate::io`].

pub mod deduplication;
