//! SQLite store binding
//!
//! Queues live in one table keyed by queue name. SQLite has no blocking
//! reads, so pops poll: each attempt claims the oldest row inside an
//! immediate transaction, then sleeps for the poll interval while the queue
//! is empty.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    Blacklist, Frontier, Handoff, IngressQueue, PopMode, StorageError, StorageResult, VisitedSet,
};
use crate::storage::WorkItem;
use crate::url::{domain_suffixes, normalize_host};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Queue names used inside the `queues` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub frontier: String,
    pub handoff: String,
    pub ingress: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            frontier: "queue".to_string(),
            handoff: "fungicide".to_string(),
            ingress: "mycelium-ingress".to_string(),
        }
    }
}

/// SQLite-backed frontier, visited set, blacklist, handoff and ingress queues
///
/// Statements run on tokio's blocking pool, so a busy database never stalls
/// the async workers.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    names: QueueNames,
    pop_mode: PopMode,
    poll_interval: Duration,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `names` - Queue names for the frontier, handoff and ingress queues
    /// * `pop_mode` - How frontier and ingress pops wait on an empty queue
    pub fn open(path: &Path, names: QueueNames, pop_mode: PopMode) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets several crawler processes share one database file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, names, pop_mode))
    }

    /// Creates an in-memory database
    pub fn open_in_memory(names: QueueNames, pop_mode: PopMode) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, names, pop_mode))
    }

    fn from_connection(conn: Connection, names: QueueNames, pop_mode: PopMode) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            names,
            pop_mode,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how often an empty queue is re-checked while a pop waits
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Adds a domain to the blacklist
    pub fn add_blacklisted(&self, domain: &str) -> StorageResult<()> {
        let domain = normalize_host(domain);
        self.lock().execute(
            "INSERT OR IGNORE INTO blacklist (domain) VALUES (?1)",
            params![domain],
        )?;
        Ok(())
    }

    /// Number of payloads in the named queue
    pub fn queue_len(&self, name: &str) -> StorageResult<u64> {
        count_queue(&self.lock(), name)
    }

    /// Payloads pushed to the handoff queue so far, oldest first
    pub fn handed_off(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM queues WHERE name = ?1 ORDER BY id")?;
        let payloads = stmt
            .query_map(params![self.names.handoff], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(payloads)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        lock_connection(&self.conn)
    }

    /// Runs `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&mut lock_connection(&conn)))
            .await
            .map_err(|e| StorageError::Unavailable(format!("SQLite task failed: {}", e)))?
    }

    async fn push_payload(&self, name: &str, payload: &str) -> StorageResult<()> {
        let name = name.to_string();
        let payload = payload.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO queues (name, payload, enqueued_at) VALUES (?1, ?2, ?3)",
                params![name, payload, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn pop_payload(&self, name: &str) -> StorageResult<Option<String>> {
        let deadline = match self.pop_mode {
            PopMode::Bounded(wait) => Some(Instant::now() + wait),
            PopMode::Blocking => None,
        };

        loop {
            let queue = name.to_string();
            if let Some(payload) = self.with_conn(move |conn| claim_head(conn, &queue)).await? {
                return Ok(Some(payload));
            }

            let mut nap = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                nap = nap.min(deadline - now);
            }
            tokio::time::sleep(nap).await;
        }
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn count_queue(conn: &Connection, name: &str) -> StorageResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM queues WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Claims and removes the oldest payload of the named queue, if any
fn claim_head(conn: &mut Connection, name: &str) -> StorageResult<Option<String>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let head: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, payload FROM queues WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((id, _)) = &head {
        tx.execute("DELETE FROM queues WHERE id = ?1", params![id])?;
    }
    tx.commit()?;

    Ok(head.map(|(_, payload)| payload))
}

#[async_trait]
impl Frontier for SqliteStore {
    async fn push(&self, item: &WorkItem) -> StorageResult<()> {
        self.push_payload(&self.names.frontier, &item.to_json()?).await
    }

    async fn pop(&self) -> StorageResult<Option<WorkItem>> {
        loop {
            let Some(payload) = self.pop_payload(&self.names.frontier).await? else {
                return Ok(None);
            };
            match WorkItem::from_json(&payload) {
                Ok(item) => return Ok(Some(item)),
                Err(e) => {
                    tracing::warn!(payload = %payload, error = %e, "Dropping malformed frontier item");
                }
            }
        }
    }

    async fn size(&self) -> StorageResult<u64> {
        let name = self.names.frontier.clone();
        self.with_conn(move |conn| count_queue(conn, &name)).await
    }
}

#[async_trait]
impl VisitedSet for SqliteStore {
    async fn mark(&self, location: &str) -> StorageResult<()> {
        let location = location.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO visited (location, visited_at) VALUES (?1, ?2)",
                params![location, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn is_marked(&self, location: &str) -> StorageResult<bool> {
        let location = location.to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM visited WHERE location = ?1",
                    params![location],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}

#[async_trait]
impl Blacklist for SqliteStore {
    async fn is_blacklisted(&self, host: &str) -> StorageResult<bool> {
        let suffixes = domain_suffixes(host);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached("SELECT 1 FROM blacklist WHERE domain = ?1")?;
            for suffix in &suffixes {
                if stmt.exists(params![suffix])? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
    }
}

#[async_trait]
impl Handoff for SqliteStore {
    async fn hand_off(&self, payload: &str) -> StorageResult<()> {
        self.push_payload(&self.names.handoff, payload).await
    }
}

#[async_trait]
impl IngressQueue for SqliteStore {
    async fn push_ingress(&self, payload: &str) -> StorageResult<()> {
        self.push_payload(&self.names.ingress, payload).await
    }

    async fn pop_ingress(&self) -> StorageResult<Option<String>> {
        self.pop_payload(&self.names.ingress).await
    }
}
