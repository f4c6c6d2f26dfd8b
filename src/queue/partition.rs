//! One queue partition: an append-only SQLite log plus a persisted read cursor.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::utils::config::SQLITE_BUSY_TIMEOUT;

/// WAL tuning pragmas. Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    body BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS cursor (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    last_seq INTEGER NOT NULL
);
INSERT OR IGNORE INTO cursor (id, last_seq) VALUES (0, 0);
"#;

/// Enable WAL and apply a schema to an open connection (idempotent).
pub(crate) fn apply_wal_and_schema(conn: &Connection, schema: &str) -> rusqlite::Result<()> {
    conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch(WAL_PRAGMAS)?;
    conn.execute_batch(schema)?;
    Ok(())
}

/// File name of partition `index` inside the queue directory.
pub fn partition_filename(index: usize) -> String {
    format!("Q{index}.db")
}

/// Remove a partition database and its WAL side files, if present.
pub fn remove_partition_files(path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.as_os_str().to_owned();
        p.push(suffix);
        match std::fs::remove_file(PathBuf::from(p)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub struct SqlitePartition {
    index: usize,
    path: PathBuf,
    conn: Mutex<Connection>,
    appended: Condvar,
}

impl SqlitePartition {
    /// Open or create the partition at `path`. Existing records and cursor are kept.
    pub fn open(index: usize, path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        apply_wal_and_schema(&conn, SCHEMA)?;
        Ok(Self {
            index,
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            appended: Condvar::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one encoded record and wake waiting pollers.
    pub fn append(&self, body: &[u8]) -> rusqlite::Result<()> {
        {
            let conn = self.lock();
            conn.execute("INSERT INTO records (body) VALUES (?1)", [body])?;
        }
        self.appended.notify_all();
        Ok(())
    }

    /// Take the next record past the cursor, waiting up to `timeout` for one to arrive.
    pub fn take(&self, timeout: Duration) -> rusqlite::Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut conn = self.lock();
        loop {
            if let Some(body) = take_next(&mut conn)? {
                return Ok(Some(body));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            conn = match self.appended.wait_timeout(conn, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Records appended and not yet taken.
    pub fn pending(&self) -> rusqlite::Result<u64> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE seq > (SELECT last_seq FROM cursor WHERE id = 0)",
            [],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}

/// Read the record after the cursor, advance the cursor and drop the row in one transaction.
fn take_next(conn: &mut Connection) -> rusqlite::Result<Option<Vec<u8>>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let next: Option<(i64, Vec<u8>)> = tx
        .query_row(
            "SELECT seq, body FROM records
             WHERE seq > (SELECT last_seq FROM cursor WHERE id = 0)
             ORDER BY seq LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((seq, body)) = next else {
        return Ok(None);
    };
    tx.execute("UPDATE cursor SET last_seq = ?1 WHERE id = 0", [seq])?;
    tx.execute("DELETE FROM records WHERE seq <= ?1", [seq])?;
    tx.commit()?;
    Ok(Some(body))
}
