//! SQLite document store: one WAL database, one connection per worker.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use super::{DocId, RecordSink, SinkFactory};
use crate::error::{SinkError, SinkResult};
use crate::queue::partition::apply_wal_and_schema;
use crate::{BlobLocation, Properties, Record};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    parent_path TEXT NOT NULL,
    name TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    properties TEXT NOT NULL,
    blob_digest TEXT,
    blob_length INTEGER,
    blob_filename TEXT,
    blob_mime TEXT,
    blob_file TEXT
);
CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent_path);

CREATE TABLE IF NOT EXISTS blobs (
    digest TEXT PRIMARY KEY,
    data BLOB NOT NULL
);
"#;

const UPSERT_DOCUMENT_SQL: &str = r#"
INSERT INTO documents
    (path, parent_path, name, doc_type, properties,
     blob_digest, blob_length, blob_filename, blob_mime, blob_file)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(path) DO UPDATE SET
    doc_type = excluded.doc_type,
    properties = excluded.properties,
    blob_digest = excluded.blob_digest,
    blob_length = excluded.blob_length,
    blob_filename = excluded.blob_filename,
    blob_mime = excluded.blob_mime,
    blob_file = excluded.blob_file
RETURNING id
"#;

const INSERT_BLOB_SQL: &str = "INSERT OR IGNORE INTO blobs (digest, data) VALUES (?1, ?2)";

/// Open or create the store and ensure schema + WAL.
pub fn open_store(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open document store {}", path.display()))?;
    apply_wal_and_schema(&conn, SCHEMA).context("prepare document store schema")?;
    Ok(conn)
}

/// Fold the WAL back into the main database file.
pub fn checkpoint_wal(path: &Path) -> Result<()> {
    let conn = open_store(path)?;
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        .context("checkpoint store WAL")?;
    Ok(())
}

/// A document row as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub id: DocId,
    pub path: String,
    pub parent_path: String,
    pub name: String,
    pub doc_type: String,
    pub properties: Properties,
    pub blob_digest: Option<String>,
    pub blob_length: Option<u64>,
}

/// All documents ordered by id (creation order).
pub fn load_documents(conn: &Connection) -> Result<Vec<StoredDocument>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, parent_path, name, doc_type, properties, blob_digest, blob_length
         FROM documents ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        let props: String = row.get(5)?;
        let length: Option<i64> = row.get(7)?;
        Ok((
            StoredDocument {
                id: row.get(0)?,
                path: row.get(1)?,
                parent_path: row.get(2)?,
                name: row.get(3)?,
                doc_type: row.get(4)?,
                properties: Properties::new(),
                blob_digest: row.get(6)?,
                blob_length: length.map(|l| l.max(0) as u64),
            },
            props,
        ))
    })?;
    let mut docs = Vec::new();
    for row in rows {
        let (mut doc, props) = row?;
        doc.properties = serde_json::from_str(&props)
            .with_context(|| format!("decode properties of {}", doc.path))?;
        docs.push(doc);
    }
    Ok(docs)
}

pub fn count_documents(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// Inline content stored for a digest, if any.
pub fn load_blob(conn: &Connection, digest: &str) -> Result<Option<Vec<u8>>> {
    Ok(conn
        .query_row("SELECT data FROM blobs WHERE digest = ?1", [digest], |row| row.get(0))
        .optional()?)
}

/// One worker's session on the store.
pub struct SqliteSink {
    conn: Connection,
    in_batch: bool,
}

impl SqliteSink {
    pub fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;
        apply_wal_and_schema(&conn, SCHEMA)?;
        Ok(Self {
            conn,
            in_batch: false,
        })
    }
}

impl RecordSink for SqliteSink {
    fn begin_batch(&mut self) -> SinkResult<()> {
        if self.in_batch {
            self.conn.execute_batch("ROLLBACK")?;
            self.in_batch = false;
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_batch = true;
        Ok(())
    }

    fn create_or_update(&mut self, record: &Record) -> SinkResult<DocId> {
        let properties = serde_json::to_string(&record.properties)
            .map_err(|e| SinkError::Permanent(format!("encode properties: {e}")))?;
        let blob = record.payload.as_ref();
        let blob_file = blob.and_then(|b| match &b.location {
            BlobLocation::File(p) => Some(p.to_string_lossy().into_owned()),
            BlobLocation::Inline(_) => None,
        });
        if let Some(b) = blob {
            if let BlobLocation::Inline(data) = &b.location {
                self.conn
                    .prepare_cached(INSERT_BLOB_SQL)?
                    .execute(params![b.digest, data])?;
            }
        }
        let id = self.conn.prepare_cached(UPSERT_DOCUMENT_SQL)?.query_row(
            params![
                record.path(),
                record.target_path,
                record.name,
                record.doc_type,
                properties,
                blob.map(|b| b.digest.as_str()),
                blob.map(|b| b.length as i64),
                blob.map(|b| b.filename.as_str()),
                blob.map(|b| b.mime_type.as_str()),
                blob_file,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn commit_batch(&mut self) -> SinkResult<()> {
        if !self.in_batch {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_batch = false;
        Ok(())
    }

    fn rollback_batch(&mut self) -> SinkResult<()> {
        if !self.in_batch {
            return Ok(());
        }
        self.in_batch = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteSink {
    fn drop(&mut self) {
        if self.in_batch {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

/// Opens a [`SqliteSink`] per worker on one store file.
#[derive(Clone, Debug)]
pub struct SqliteSinkFactory {
    path: PathBuf,
}

impl SqliteSinkFactory {
    /// Create the store (schema, WAL) up front so workers only open connections.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        open_store(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SinkFactory for SqliteSinkFactory {
    fn open(&self) -> SinkResult<Box<dyn RecordSink>> {
        Ok(Box::new(SqliteSink::open(&self.path)?))
    }
}
