use std::path::Path;

use autotask_core::DatabaseConfig;
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the autotask schema in `conn`.
///
/// Creates the `tasks` table (idempotent) plus the two indexes the hot queries
/// need: claiming (`status`, `scheduled_at`) and periodic dedup (`module`,
/// `function`, `is_periodic`). Insertion order is SQLite's implicit `rowid`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id            TEXT    NOT NULL PRIMARY KEY,
            scheduled_at  TEXT    NOT NULL,   -- fixed-width RFC 3339, UTC
            module        TEXT    NOT NULL,
            function      TEXT    NOT NULL,
            arguments     BLOB    NOT NULL,   -- JSON-encoded TaskArgs
            is_periodic   INTEGER NOT NULL DEFAULT 0,
            interval_us   INTEGER,            -- periodic only
            cron_pattern  BLOB,               -- cron only, JSON-encoded CronPattern
            status        TEXT    NOT NULL DEFAULT 'waiting',
            retries       INTEGER NOT NULL DEFAULT 0,
            result        BLOB,
            error_message TEXT    NOT NULL DEFAULT '',
            ttl_us        INTEGER NOT NULL DEFAULT 0,
            expire_at     TEXT                -- set once a one-shot entry is finished
        ) STRICT;

        -- Claiming: WHERE status = 'waiting' AND scheduled_at <= ? ORDER BY scheduled_at
        CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks (status, scheduled_at);
        CREATE INDEX IF NOT EXISTS idx_tasks_target ON tasks (module, function, is_periodic);
        ",
    )?;
    Ok(())
}

/// Open the shared database file named in `config`.
///
/// WAL lets readers (task handles in the host process) proceed while a worker
/// holds the write lock; the busy timeout makes short lock waits block instead
/// of failing immediately.
pub fn open(config: &DatabaseConfig) -> Result<Connection> {
    if let Some(parent) = Path::new(&config.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(config.busy_timeout())?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_db(&conn)?;
    Ok(conn)
}
