//! # stu-controller
//!
//! Level-based reconciliation controller for `Student` resources.
//!
//! An informer keeps a local cache of students warm from a list/watch
//! source. Every add or update enqueues the object's key on a deduplicating,
//! rate-limited work queue, and a pool of workers syncs each key against
//! the cache, one worker per key at a time, retrying transient failures
//! with backoff.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod source;
pub mod telemetry;
