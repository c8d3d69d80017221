//! Durable storage for bridge jobs.
//!
//! The store is the only stateful component of the facilitator. It enforces
//! two of the job invariants directly: uniqueness of the idempotency key
//! (unique index) and terminality (updates to a terminal row are rejected).
//! Everything else is last-write-wins.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use b402::ChainId;

use crate::job::{BridgeJob, BridgeJobStatus};

/// Errors from bridge job storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A job with the same idempotency key already exists.
    #[error("bridge job with idempotency key {0:?} already exists")]
    Conflict(String),
    /// No job with the given id.
    #[error("bridge job {0:?} not found")]
    NotFound(String),
    /// The job is in a terminal state and cannot be updated.
    #[error("bridge job {0:?} is terminal and rejects updates")]
    Terminal(String),
    /// Underlying storage failure.
    #[error("bridge job storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

/// Persistent storage for bridge jobs.
#[async_trait]
pub trait BridgeJobStore: Send + Sync {
    /// Inserts a new job.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when a job with the same idempotency key
    /// exists.
    async fn create(&self, job: &BridgeJob) -> Result<(), StoreError>;

    /// Fetches a job by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<BridgeJob>, StoreError>;

    /// Fetches a job by idempotency key.
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<BridgeJob>, StoreError>;

    /// Overwrites a job's mutable fields.
    ///
    /// # Errors
    ///
    /// [`StoreError::Terminal`] when the stored row is already terminal,
    /// [`StoreError::NotFound`] when the id is unknown.
    async fn update(&self, job: &BridgeJob) -> Result<(), StoreError>;

    /// Lists non-terminal jobs not updated in the last `staleness_secs`
    /// seconds. Used by the recovery scan after restarts.
    async fn list_unfinished(&self, staleness_secs: u64) -> Result<Vec<BridgeJob>, StoreError>;
}

/// SQLite-backed job store.
///
/// One table, a unique index on `idempotency_key`, secondary indexes on
/// `status` and `source_tx_hash`. WAL mode keeps concurrent readers cheap.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteJobStore").finish_non_exhaustive()
    }
}

impl SqliteJobStore {
    /// Opens (or creates) the job database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Durable only for the process lifetime;
    /// intended for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS bridge_jobs (
                id TEXT PRIMARY KEY,
                idempotency_key TEXT UNIQUE NOT NULL,
                source_network TEXT NOT NULL,
                destination_network TEXT NOT NULL,
                source_tx_hash TEXT NOT NULL,
                amount TEXT NOT NULL,
                destination_asset TEXT NOT NULL,
                destination_pay_to TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                bridge_tx_hash TEXT,
                destination_tx_hash TEXT,
                message_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bridge_jobs_status ON bridge_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_bridge_jobs_source_tx ON bridge_jobs(source_tx_hash);
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<BridgeJob> {
    let source_network: String = row.get("source_network")?;
    let destination_network: String = row.get("destination_network")?;
    let destination_asset: String = row.get("destination_asset")?;
    let destination_pay_to: String = row.get("destination_pay_to")?;
    let status: String = row.get("status")?;
    let parse_err =
        |e: String| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into());
    Ok(BridgeJob {
        id: row.get("id")?,
        idempotency_key: row.get("idempotency_key")?,
        source_network: ChainId::from_str(&source_network)
            .map_err(|e| parse_err(e.to_string()))?,
        destination_network: ChainId::from_str(&destination_network)
            .map_err(|e| parse_err(e.to_string()))?,
        source_tx_hash: row.get("source_tx_hash")?,
        amount: row.get("amount")?,
        destination_asset: Address::from_str(&destination_asset)
            .map_err(|e| parse_err(e.to_string()))?,
        destination_pay_to: Address::from_str(&destination_pay_to)
            .map_err(|e| parse_err(e.to_string()))?,
        status: status.parse().map_err(parse_err)?,
        attempts: row.get("attempts")?,
        last_error: row.get("last_error")?,
        bridge_tx_hash: row.get("bridge_tx_hash")?,
        destination_tx_hash: row.get("destination_tx_hash")?,
        message_id: row.get("message_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[async_trait]
impl BridgeJobStore for SqliteJobStore {
    async fn create(&self, job: &BridgeJob) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            r"INSERT INTO bridge_jobs (
                id, idempotency_key, source_network, destination_network,
                source_tx_hash, amount, destination_asset, destination_pay_to,
                status, attempts, last_error, bridge_tx_hash,
                destination_tx_hash, message_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                job.id,
                job.idempotency_key,
                job.source_network.to_string(),
                job.destination_network.to_string(),
                job.source_tx_hash,
                job.amount,
                job.destination_asset.to_string(),
                job.destination_pay_to.to_string(),
                job.status.as_str(),
                job.attempts,
                job.last_error,
                job.bridge_tx_hash,
                job.destination_tx_hash,
                job.message_id,
                job.created_at,
                job.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(job.idempotency_key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<BridgeJob>, StoreError> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                "SELECT * FROM bridge_jobs WHERE id = ?1",
                params![id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<BridgeJob>, StoreError> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                "SELECT * FROM bridge_jobs WHERE idempotency_key = ?1",
                params![key],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    async fn update(&self, job: &BridgeJob) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM bridge_jobs WHERE id = ?1",
                params![job.id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| StoreError::NotFound(job.id.clone()))?;
        let current: BridgeJobStatus = current
            .parse()
            .map_err(StoreError::Storage)?;
        if current.is_terminal() {
            return Err(StoreError::Terminal(job.id.clone()));
        }

        conn.execute(
            r"UPDATE bridge_jobs SET
                status = ?2, attempts = ?3, last_error = ?4, bridge_tx_hash = ?5,
                destination_tx_hash = ?6, message_id = ?7, updated_at = ?8
            WHERE id = ?1",
            params![
                job.id,
                job.status.as_str(),
                job.attempts,
                job.last_error,
                job.bridge_tx_hash,
                job.destination_tx_hash,
                job.message_id,
                job.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn list_unfinished(&self, staleness_secs: u64) -> Result<Vec<BridgeJob>, StoreError> {
        let cutoff = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .saturating_sub(staleness_secs);
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT * FROM bridge_jobs
             WHERE status IN ('pending', 'bridging') AND updated_at <= ?1
             ORDER BY created_at ASC",
        )?;
        let jobs = statement
            .query_map(params![cutoff], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

/// In-memory job store with the same semantics as the SQLite store.
///
/// Used in tests and available as an ephemeral backend.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, BridgeJob>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BridgeJobStore for InMemoryJobStore {
    async fn create(&self, job: &BridgeJob) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))?;
        if jobs
            .values()
            .any(|existing| existing.idempotency_key == job.idempotency_key)
        {
            return Err(StoreError::Conflict(job.idempotency_key.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<BridgeJob>, StoreError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))?;
        Ok(jobs.get(id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<BridgeJob>, StoreError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))?;
        Ok(jobs.values().find(|j| j.idempotency_key == key).cloned())
    }

    async fn update(&self, job: &BridgeJob) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))?;
        let existing = jobs
            .get(&job.id)
            .ok_or_else(|| StoreError::NotFound(job.id.clone()))?;
        if existing.status.is_terminal() {
            return Err(StoreError::Terminal(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list_unfinished(&self, staleness_secs: u64) -> Result<Vec<BridgeJob>, StoreError> {
        let cutoff = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .saturating_sub(staleness_secs);
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Storage("job store lock poisoned".into()))?;
        let mut unfinished: Vec<_> = jobs
            .values()
            .filter(|j| !j.status.is_terminal() && j.updated_at <= cutoff)
            .cloned()
            .collect();
        unfinished.sort_by_key(|j| j.created_at);
        Ok(unfinished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BridgeJob {
        BridgeJob::new(
            ChainId::eip155(84_532),
            ChainId::eip155(11_155_111),
            format!("0x{}", uuid::Uuid::new_v4().simple()),
            "10000".into(),
            Address::repeat_byte(0x33),
            Address::repeat_byte(0x44),
        )
    }

    async fn exercises_store(store: &dyn BridgeJobStore) {
        let mut j = job();
        store.create(&j).await.unwrap();

        // Duplicate idempotency key conflicts, even under a fresh id.
        let mut duplicate = j.clone();
        duplicate.id = uuid::Uuid::new_v4().to_string();
        assert!(matches!(
            store.create(&duplicate).await,
            Err(StoreError::Conflict(_))
        ));

        // Round trips by id and by key.
        let by_id = store.get_by_id(&j.id).await.unwrap().unwrap();
        assert_eq!(by_id.idempotency_key, j.idempotency_key);
        let by_key = store
            .get_by_idempotency_key(&j.idempotency_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key.id, j.id);

        // Update through to a terminal state.
        j.transition(BridgeJobStatus::Bridging).unwrap();
        j.attempts += 1;
        store.update(&j).await.unwrap();
        j.transition(BridgeJobStatus::Completed).unwrap();
        j.destination_tx_hash = Some("0xmint".into());
        store.update(&j).await.unwrap();

        // Terminal rows reject further updates.
        let mut late = store.get_by_id(&j.id).await.unwrap().unwrap();
        late.last_error = Some("should not stick".into());
        assert!(matches!(
            store.update(&late).await,
            Err(StoreError::Terminal(_))
        ));

        // Unknown ids are NotFound.
        let mut ghost = job();
        ghost.id = "no-such-id".into();
        assert!(matches!(
            store.update(&ghost).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sqlite_store_semantics() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        exercises_store(&store).await;
    }

    #[tokio::test]
    async fn in_memory_store_semantics() {
        let store = InMemoryJobStore::new();
        exercises_store(&store).await;
    }

    #[tokio::test]
    async fn unfinished_listing_skips_terminal_and_fresh_jobs() {
        let store = SqliteJobStore::open_in_memory().unwrap();

        let mut stale = job();
        stale.updated_at -= 3600;
        // created_at/updated_at are plain columns; write the backdated row.
        store.create(&stale).await.unwrap();

        let fresh = job();
        store.create(&fresh).await.unwrap();

        let mut done = job();
        done.updated_at -= 3600;
        store.create(&done).await.unwrap();
        done.transition(BridgeJobStatus::Bridging).unwrap();
        done.transition(BridgeJobStatus::Completed).unwrap();
        done.updated_at -= 3600;
        store.update(&done).await.unwrap();

        let unfinished = store.list_unfinished(600).await.unwrap();
        let ids: Vec<_> = unfinished.iter().map(|j| j.id.as_str()).collect();
        assert!(ids.contains(&stale.id.as_str()));
        assert!(!ids.contains(&fresh.id.as_str()));
        assert!(!ids.contains(&done.id.as_str()));
    }
}
