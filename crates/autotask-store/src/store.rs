use std::sync::{Mutex, MutexGuard, PoisonError};

use autotask_core::{
    time::{duration_to_micros, format_ts, micros_to_duration, parse_ts, to_storage_precision},
    DatabaseConfig,
};
use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db,
    error::{Result, StoreError},
    types::{NewTask, TaskEntry, TaskStatus},
};

/// Bound on claim retries after lost races; afterwards the caller sees "none"
/// and tries again on its next poll.
const MAX_CLAIM_ATTEMPTS: u32 = 16;

const COLUMNS: &str = "rowid, id, scheduled_at, module, function, arguments, is_periodic,
                       interval_us, cron_pattern, status, retries, result, error_message,
                       ttl_us, expire_at";

/// Registration lookup; the leader marker is not a registration.
const FIND_PERIODIC: &str = "SELECT 1 FROM tasks
                             WHERE module = ?1 AND function = ?2 AND is_periodic = 1
                               AND status != ?3
                             LIMIT 1";

/// Outcome of one claim transaction.
enum Claim {
    Won(TaskEntry),
    Empty,
    /// The selected row changed state under us.
    Lost,
}

/// Persistent task queue shared by every cooperating process.
///
/// Each process owns one `TaskStore` (one SQLite connection behind a
/// `Mutex`); processes coordinate only through the database file.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (and create if needed) the shared database file.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        info!(path = %config.path, "opening task store");
        Self::new(db::open(config)?)
    }

    /// Private in-memory store; only useful within one process.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // `Transaction` rolls back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a new entry and return it with its assigned identifier.
    #[instrument(skip(self, task), fields(module = %task.module, function = %task.function))]
    pub fn create(&self, task: NewTask) -> Result<TaskEntry> {
        let conn = self.lock();
        let entry = insert(&conn, task)?;
        debug!(task_id = %entry.id, status = %entry.status, "task created");
        Ok(entry)
    }

    /// Fetch an entry by id, `None` if it no longer exists.
    pub fn get(&self, id: &str) -> Result<Option<TaskEntry>> {
        let conn = self.lock();
        let entry = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                [id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All entries in insertion order.
    pub fn list(&self) -> Result<Vec<TaskEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM tasks ORDER BY rowid"))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Whether a periodic entry for this target is already registered.
    pub fn find_periodic(&self, module: &str, function: &str) -> Result<bool> {
        let conn = self.lock();
        let found = conn
            .query_row(
                FIND_PERIODIC,
                [module, function, TaskStatus::SupervisorActive.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a periodic or cron entry unless one for the same target exists.
    ///
    /// The check and the insert share one immediate transaction, so host
    /// processes loading the same registrations concurrently create one row.
    pub fn create_periodic_if_absent(&self, task: NewTask) -> Result<Option<TaskEntry>> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
            .query_row(
                FIND_PERIODIC,
                [
                    task.module.as_str(),
                    task.function.as_str(),
                    TaskStatus::SupervisorActive.as_str(),
                ],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            debug!(module = %task.module, function = %task.function, "periodic task already registered");
            return Ok(None);
        }
        let entry = insert(&tx, task)?;
        tx.commit()?;
        debug!(task_id = %entry.id, "periodic task registered");
        Ok(Some(entry))
    }

    /// Claim the earliest eligible entry, see [`TaskStore::claim_next_at`].
    pub fn claim_next(&self) -> Result<Option<TaskEntry>> {
        self.claim_next_at(Utc::now())
    }

    /// Atomically move the earliest `waiting` entry with `scheduled_at <= now`
    /// to `running` and return it.
    ///
    /// SQLite has no row locks, so the selection and the update run inside one
    /// `BEGIN IMMEDIATE` transaction, which holds the database write lock.
    /// A BUSY/LOCKED error or a conditional update that touches no row means
    /// another claimant won; the selection is retried.
    pub fn claim_next_at(&self, now: DateTime<Utc>) -> Result<Option<TaskEntry>> {
        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            match self.try_claim(now) {
                Ok(Claim::Won(entry)) => {
                    debug!(task_id = %entry.id, attempt, "task claimed");
                    return Ok(Some(entry));
                }
                Ok(Claim::Empty) => return Ok(None),
                Ok(Claim::Lost) => debug!(attempt, "claim lost to another worker, retrying"),
                Err(e) if e.is_contention() => debug!(attempt, "claim contention, retrying: {e}"),
                Err(e) => return Err(e),
            }
        }
        warn!(
            attempts = MAX_CLAIM_ATTEMPTS,
            "giving up claim after repeated contention"
        );
        Ok(None)
    }

    fn try_claim(&self, now: DateTime<Utc>) -> Result<Claim> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {COLUMNS} FROM tasks
                 WHERE status = 'waiting' AND scheduled_at <= ?1
                 ORDER BY scheduled_at, rowid
                 LIMIT 1"
            ))?;
            stmt.query_row([format_ts(now)], row_to_entry).optional()?
        };
        let Some(mut entry) = candidate else {
            return Ok(Claim::Empty);
        };

        let changed = tx.execute(
            "UPDATE tasks SET status = 'running' WHERE id = ?1 AND status = 'waiting'",
            [&entry.id],
        )?;
        if changed != 1 {
            return Ok(Claim::Lost);
        }
        tx.commit()?;

        entry.status = TaskStatus::Running;
        Ok(Claim::Won(entry))
    }

    /// Write back the mutable fields of a claimed entry.
    #[instrument(skip(self, entry), fields(task_id = %entry.id, status = %entry.status))]
    pub fn save(&self, entry: &TaskEntry) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tasks
             SET scheduled_at = ?1, status = ?2, retries = ?3, result = ?4,
                 error_message = ?5, expire_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                format_ts(entry.scheduled_at),
                entry.status.as_str(),
                entry.retries,
                entry.result,
                entry.error_message,
                entry.expire_at.map(format_ts),
                entry.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                id: entry.id.clone(),
            });
        }
        Ok(())
    }

    /// Try to become the leader for this database.
    pub fn try_acquire_leader_marker(&self) -> Result<bool> {
        self.try_acquire_leader_marker_at(Utc::now())
    }

    /// Insert the leader marker if none exists, in one immediate transaction.
    ///
    /// Returns true iff this call inserted it. Losing a lock race returns
    /// false, the same as finding an existing marker.
    pub fn try_acquire_leader_marker_at(&self, now: DateTime<Utc>) -> Result<bool> {
        match self.insert_marker(now) {
            Ok(acquired) => Ok(acquired),
            Err(e) if e.is_contention() => {
                debug!("leader marker contention: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn insert_marker(&self, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            [TaskStatus::SupervisorActive.as_str()],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(false);
        }
        let marker = insert(&tx, NewTask::leader_marker(now))?;
        tx.commit()?;
        info!(task_id = %marker.id, "leader marker acquired");
        Ok(true)
    }

    /// Delete finished one-shot entries whose `expire_at` has passed.
    pub fn delete_expired_one_shot(&self) -> Result<usize> {
        self.delete_expired_one_shot_at(Utc::now())
    }

    pub fn delete_expired_one_shot_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM tasks
             WHERE is_periodic = 0 AND expire_at IS NOT NULL AND expire_at <= ?1",
            [format_ts(now)],
        )?;
        if n > 0 {
            debug!(count = n, "expired tasks deleted");
        }
        Ok(n)
    }

    /// Delete every periodic, cron and leader-marker entry.
    pub fn delete_all_periodic(&self) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM tasks WHERE is_periodic = 1", [])?;
        info!(count = n, "periodic tasks and leader marker deleted");
        Ok(n)
    }
}

fn insert(conn: &Connection, task: NewTask) -> Result<TaskEntry> {
    let id = Uuid::now_v7().to_string();
    let scheduled_at = to_storage_precision(task.scheduled_at);
    conn.execute(
        "INSERT INTO tasks
         (id, scheduled_at, module, function, arguments, is_periodic, interval_us,
          cron_pattern, status, retries, result, error_message, ttl_us, expire_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, '', ?11, NULL)",
        rusqlite::params![
            id,
            format_ts(scheduled_at),
            task.module,
            task.function,
            task.arguments,
            task.is_periodic,
            task.interval.map(duration_to_micros),
            task.cron_pattern,
            task.status.as_str(),
            task.retries,
            duration_to_micros(task.ttl),
        ],
    )?;
    Ok(TaskEntry {
        id,
        seq: conn.last_insert_rowid(),
        scheduled_at,
        module: task.module,
        function: task.function,
        arguments: task.arguments,
        is_periodic: task.is_periodic,
        interval: task.interval,
        cron_pattern: task.cron_pattern,
        status: task.status,
        retries: task.retries,
        result: None,
        error_message: String::new(),
        ttl: task.ttl,
        expire_at: None,
    })
}

/// Map a `SELECT {COLUMNS}` row to a `TaskEntry`.
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskEntry> {
    let ts = |idx: usize, raw: String| {
        parse_ts(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };
    let status: String = row.get(9)?;
    let status = status
        .parse::<TaskStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, e.into()))?;
    let expire_at = match row.get::<_, Option<String>>(14)? {
        Some(raw) => Some(ts(14, raw)?),
        None => None,
    };

    Ok(TaskEntry {
        seq: row.get(0)?,
        id: row.get(1)?,
        scheduled_at: ts(2, row.get(2)?)?,
        module: row.get(3)?,
        function: row.get(4)?,
        arguments: row.get(5)?,
        is_periodic: row.get(6)?,
        interval: row.get::<_, Option<i64>>(7)?.map(micros_to_duration),
        cron_pattern: row.get(8)?,
        status,
        retries: row.get(10)?,
        result: row.get(11)?,
        error_message: row.get(12)?,
        ttl: micros_to_duration(row.get(13)?),
        expire_at,
    })
}
