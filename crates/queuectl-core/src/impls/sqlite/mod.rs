//! SQLite job store.
//!
//! Timestamps are stored as INTEGER unix milliseconds so that the readiness
//! comparison in `find_next_ready` is numeric. Every conditional transition
//! is a single `UPDATE ... WHERE state ...` statement, which SQLite executes
//! atomically; the row count tells the caller whether the guard matched.

mod migrate;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, query, query_as, query_scalar};
use tracing::debug;

pub use migrate::migrate;

use crate::domain::{Job, JobId, JobState};
use crate::error::{QueueError, Result, StoreError};
use crate::observability::QueueCounts;
use crate::ports::JobStore;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

const JOB_COLUMNS: &str =
    "id, command, state, attempts, max_retries, created_at, updated_at, next_retry_at";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => StoreError::Busy(err.to_string()),
            sqlx::Error::Database(db_err) => {
                // Extended result codes keep the primary code in the low byte.
                let primary = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(SQLITE_BUSY | SQLITE_LOCKED) => StoreError::Busy(err.to_string()),
                    _ => StoreError::Fatal(err.to_string()),
                }
            }
            _ => StoreError::Fatal(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Store(err.into())
    }
}

/// Connection settings for [`SqliteJobStore`].
#[derive(Debug, Clone)]
pub struct SqliteStoreOptions {
    pub path: PathBuf,

    /// How long SQLite itself waits on a lock before reporting busy.
    pub busy_timeout: Duration,

    pub max_connections: u32,

    /// How long to wait for a pooled connection before reporting busy.
    pub acquire_timeout: Duration,
}

impl SqliteStoreOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(250),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn busy_timeout(mut self, value: Duration) -> Self {
        self.busy_timeout = value;
        self
    }

    pub fn max_connections(mut self, value: u32) -> Self {
        self.max_connections = value;
        self
    }

    pub fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    next_retry_at: Option<i64>,
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(column: &str, ms: i64) -> core::result::Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Fatal(format!("{column} out of range: {ms}")))
}

fn to_count(column: &str, value: i64) -> core::result::Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Fatal(format!("{column} out of range: {value}")))
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> core::result::Result<Self, Self::Error> {
        let state = JobState::from_str(&row.state)
            .map_err(|e| StoreError::Fatal(format!("job '{}': {e}", row.id)))?;
        Ok(Job {
            state,
            attempts: to_count("attempts", row.attempts)?,
            max_retries: to_count("max_retries", row.max_retries)?,
            created_at: from_millis("created_at", row.created_at)?,
            updated_at: from_millis("updated_at", row.updated_at)?,
            next_retry_at: row
                .next_retry_at
                .map(|ms| from_millis("next_retry_at", ms))
                .transpose()?,
            id: JobId::new(row.id),
            command: row.command,
        })
    }
}

fn rows_to_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>> {
    rows.into_iter()
        .map(|row| Job::try_from(row).map_err(QueueError::from))
        .collect()
}

/// `JobStore` backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (creating if missing) the database at `options.path` and bring
    /// its schema up to date.
    pub async fn open(options: SqliteStoreOptions) -> Result<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&options.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await?;

        migrate(&pool).await?;
        debug!(path = %options.path.display(), "Opened job store");
        Ok(Self { pool })
    }

    /// A private in-memory database. Single connection, so every caller
    /// sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Convenience for `open(SqliteStoreOptions::new(path))`.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(SqliteStoreOptions::new(path.as_ref())).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let result = query(
            r#"
                insert into jobs (id, command, state, attempts, max_retries, created_at, updated_at, next_retry_at)
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.command.as_str())
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(to_millis(job.created_at))
        .bind(to_millis(job.updated_at))
        .bind(job.next_retry_at.map(to_millis))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                QueueError::Conflict(format!("job '{}' already exists", job.id)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        let row: Option<JobRow> =
            query_as(&format!("select {JOB_COLUMNS} from jobs where id = ?1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Job::try_from(row)?),
            None => Err(QueueError::NotFound(id.clone())),
        }
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = query_as(&format!(
            "select {JOB_COLUMNS} from jobs where state = ?1 order by created_at asc, rowid asc"
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_jobs(rows)
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = query_as(&format!(
            "select {JOB_COLUMNS} from jobs order by created_at asc, rowid asc"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows_to_jobs(rows)
    }

    async fn count_by_state(&self) -> Result<QueueCounts> {
        let rows: Vec<(String, i64)> =
            query_as("select state, count(*) from jobs group by state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = QueueCounts::default();
        for (state, n) in rows {
            let state = JobState::from_str(&state).map_err(|e| StoreError::Fatal(e.to_string()))?;
            counts.add(state, n.max(0) as usize);
        }
        Ok(counts)
    }

    async fn find_next_ready(&self, now: DateTime<Utc>) -> Result<Option<JobId>> {
        let id: Option<String> = query_scalar(
            r#"
                select id from jobs
                where state = ?1
                   or (state = ?2 and next_retry_at is not null and next_retry_at <= ?3)
                order by created_at asc, rowid asc
                limit 1
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(JobState::Failed.as_str())
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(JobId::new))
    }

    async fn try_mark_processing(&self, id: &JobId, now: DateTime<Utc>) -> Result<bool> {
        let result = query(
            r#"
                update jobs
                set state = ?1, next_retry_at = null, updated_at = ?2
                where id = ?3
                  and (state = ?4
                       or (state = ?5 and next_retry_at is not null and next_retry_at <= ?2))
            "#,
        )
        .bind(JobState::Processing.as_str())
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(JobState::Pending.as_str())
        .bind(JobState::Failed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_outcome(
        &self,
        id: &JobId,
        state: JobState,
        attempts: u32,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = query(
            r#"
                update jobs
                set state = ?1, attempts = ?2, next_retry_at = ?3, updated_at = ?4
                where id = ?5
            "#,
        )
        .bind(state.as_str())
        .bind(i64::from(attempts))
        .bind(next_retry_at.map(to_millis))
        .bind(to_millis(now))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn requeue_dead(&self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        let result = query(
            r#"
                update jobs
                set state = ?1, attempts = 0, next_retry_at = null, updated_at = ?2
                where id = ?3 and state = ?4
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(to_millis(now))
        .bind(id.as_str())
        .bind(JobState::Dead.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<String> = query_scalar("select state from jobs where id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match current {
            None => Err(QueueError::NotFound(id.clone())),
            Some(state) => Err(QueueError::Conflict(format!(
                "job '{id}' is {state}, only dead jobs can be requeued"
            ))),
        }
    }
}
