//! Resource sources: where the informer lists and watches students from.
//!
//! A source owns listing and watching. The informer turns what it
//! delivers into cache contents and change notifications.

pub mod manifest;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::model::{Student, StudentList};

pub use manifest::ManifestSource;
pub use memory::MemorySource;

/// One change observed by a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Student),
    Modified(Student),
    Deleted(Student),
}

/// List + watch access to the external resource store.
#[async_trait]
pub trait ListWatch: Send + Sync {
    /// Snapshot of every student, with the version it was taken at.
    async fn list(&self) -> Result<StudentList>;

    /// Stream of changes after `resource_version`.
    ///
    /// The stream ending means the watch was lost; callers re-list.
    async fn watch(&self, resource_version: &str) -> Result<mpsc::Receiver<WatchEvent>>;
}
