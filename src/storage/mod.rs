//! Storage module for the shared crawl state
//!
//! This module defines the store capabilities the crawl engine coordinates
//! through, and provides bindings for them:
//! - An in-process memory store for single-node runs and tests
//! - A SQLite store with a polled queue table
//! - A Redis store using lists and sets
//! - A filesystem object store for persisted pages

mod filestore;
mod memory;
mod redis_store;
mod schema;
mod sqlite;
mod traits;

pub use filestore::FileStore;
pub use memory::MemoryStore;
pub use redis_store::{RedisKeys, RedisStore};
pub use sqlite::{QueueNames, SqliteStore};
pub use traits::{
    Blacklist, Frontier, Handoff, IngressQueue, ObjectStore, PopMode, StorageError,
    StorageResult, StoreItem, VisitedSet,
};

use serde::{Deserialize, Serialize};

/// One frontier entry
///
/// Serialized as `{"location": "...", "retries": 0}` in every store binding
/// and on the ingress queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub location: String,
    pub retries: u32,
}

impl WorkItem {
    /// Creates a fresh item with no retries consumed
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            retries: 0,
        }
    }

    /// Returns the same item with one more retry consumed
    pub fn retried(&self) -> Self {
        Self {
            location: self.location.clone(),
            retries: self.retries.saturating_add(1),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}
