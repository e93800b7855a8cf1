//! In-process store binding
//!
//! Implements every queue and set capability with local collections. Pops
//! park on a [`Notify`] until a push arrives or the bounded wait elapses.

use crate::storage::traits::{
    Blacklist, Frontier, Handoff, IngressQueue, PopMode, StorageResult, VisitedSet,
};
use crate::storage::WorkItem;
use crate::url::domain_suffixes;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Memory-backed frontier, visited set, blacklist, handoff and ingress queues
#[derive(Debug)]
pub struct MemoryStore {
    pop_mode: PopMode,
    frontier: Mutex<VecDeque<WorkItem>>,
    frontier_ready: Notify,
    visited: RwLock<HashSet<String>>,
    blacklist: RwLock<HashSet<String>>,
    handoff: Mutex<Vec<String>>,
    ingress: Mutex<VecDeque<String>>,
    ingress_ready: Notify,
}

impl MemoryStore {
    pub fn new(pop_mode: PopMode) -> Self {
        Self {
            pop_mode,
            frontier: Mutex::new(VecDeque::new()),
            frontier_ready: Notify::new(),
            visited: RwLock::new(HashSet::new()),
            blacklist: RwLock::new(HashSet::new()),
            handoff: Mutex::new(Vec::new()),
            ingress: Mutex::new(VecDeque::new()),
            ingress_ready: Notify::new(),
        }
    }

    /// Adds a domain to the blacklist
    pub fn add_blacklisted(&self, domain: &str) {
        let domain = crate::url::normalize_host(domain);
        if !domain.is_empty() {
            self.blacklist
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(domain);
        }
    }

    /// Payloads pushed to the handoff queue so far, oldest first
    pub fn handed_off(&self) -> Vec<String> {
        lock(&self.handoff).clone()
    }

    /// Snapshot of the frontier, head first
    pub fn frontier_items(&self) -> Vec<WorkItem> {
        lock(&self.frontier).iter().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(PopMode::Blocking)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pops the head of `queue`, parking on `ready` while it is empty
async fn pop_waiting<T>(queue: &Mutex<VecDeque<T>>, ready: &Notify, mode: PopMode) -> Option<T> {
    let deadline = match mode {
        PopMode::Bounded(wait) => Some(Instant::now() + wait),
        PopMode::Blocking => None,
    };

    loop {
        // Register for wakeups before checking, so a push in between is not missed
        let notified = ready.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next = lock(queue).pop_front();
        if next.is_some() {
            return next;
        }

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return None;
                }
            }
            None => notified.await,
        }
    }
}

#[async_trait]
impl Frontier for MemoryStore {
    async fn push(&self, item: &WorkItem) -> StorageResult<()> {
        lock(&self.frontier).push_back(item.clone());
        self.frontier_ready.notify_one();
        Ok(())
    }

    async fn pop(&self) -> StorageResult<Option<WorkItem>> {
        Ok(pop_waiting(&self.frontier, &self.frontier_ready, self.pop_mode).await)
    }

    async fn size(&self) -> StorageResult<u64> {
        Ok(lock(&self.frontier).len() as u64)
    }
}

#[async_trait]
impl VisitedSet for MemoryStore {
    async fn mark(&self, location: &str) -> StorageResult<()> {
        self.visited
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.to_string());
        Ok(())
    }

    async fn is_marked(&self, location: &str) -> StorageResult<bool> {
        Ok(self
            .visited
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(location))
    }
}

#[async_trait]
impl Blacklist for MemoryStore {
    async fn is_blacklisted(&self, host: &str) -> StorageResult<bool> {
        let blacklist = self.blacklist.read().unwrap_or_else(PoisonError::into_inner);
        Ok(domain_suffixes(host)
            .iter()
            .any(|suffix| blacklist.contains(suffix)))
    }
}

#[async_trait]
impl Handoff for MemoryStore {
    async fn hand_off(&self, payload: &str) -> StorageResult<()> {
        lock(&self.handoff).push(payload.to_string());
        Ok(())
    }
}

#[async_trait]
impl IngressQueue for MemoryStore {
    async fn push_ingress(&self, payload: &str) -> StorageResult<()> {
        lock(&self.ingress).push_back(payload.to_string());
        self.ingress_ready.notify_one();
        Ok(())
    }

    async fn pop_ingress(&self) -> StorageResult<Option<String>> {
        Ok(pop_waiting(&self.ingress, &self.ingress_ready, self.pop_mode).await)
    }
}
