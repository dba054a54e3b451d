//! Tracker metadata store.
//!
//! A single `filesystem` table maps logical paths to physical locations
//! across hosts. The connection is guarded by a mutex; every writer runs
//! serialized, which is the whole concurrency contract of the store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::path;
use crate::record::{Category, FsRecord, HostEntry, ListEntry, now_stamp};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS filesystem (
    logical_path  TEXT,
    physical_path TEXT,
    category      INTEGER NOT NULL,
    ctime         TEXT NOT NULL,
    mtime         TEXT NOT NULL,
    size          INTEGER NOT NULL DEFAULT 0,
    host_addr     TEXT,
    host_name     TEXT
);
"#;

pub struct MetaStore {
    conn: Mutex<Connection>,
}

impl MetaStore {
    /// Opens (or creates) the store file and guarantees the root row.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// In-memory store for tests.
    pub fn memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let roots: i64 = conn.query_row(
            "SELECT COUNT(*) FROM filesystem WHERE logical_path = '/'",
            [],
            |row| row.get(0),
        )?;
        if roots == 0 {
            let now = now_stamp();
            conn.execute(
                "INSERT INTO filesystem (logical_path, category, ctime, mtime, size)
                 VALUES ('/', 2, ?1, ?2, 0)",
                params![now, now],
            )?;
            tracing::info!("inserted logical root row");
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub async fn logical_exists(&self, logical: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM filesystem WHERE logical_path = ?1",
            params![logical],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Physical path of a logical record: `None` when no such row exists,
    /// `Some(None)` for a purely-logical row.
    pub async fn physical_of(&self, logical: &str) -> Result<Option<Option<String>>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT physical_path FROM filesystem WHERE logical_path = ?1",
                params![logical],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(row)
    }

    /// Binds a logical path to a physical location (`ln` with two arguments).
    pub async fn insert_link(
        &self,
        logical: &str,
        physical: &str,
        size: u64,
        location: &str,
        host_name: &str,
    ) -> Result<()> {
        let now = now_stamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO filesystem VALUES (?1, ?2, 2, ?3, ?4, ?5, ?6, ?7)",
            params![logical, physical, now, now, size as i64, location, host_name],
        )?;
        Ok(())
    }

    /// Records a bare physical path (`ln` with one argument), stamped now.
    pub async fn insert_physical(
        &self,
        physical: &str,
        category: Category,
        size: u64,
        location: &str,
        host_name: &str,
    ) -> Result<()> {
        let now = now_stamp();
        self.insert_physical_stamped(physical, category, &now, &now, size, location, host_name)
            .await
    }

    /// Records a physical path with caller-supplied timestamps, used by the
    /// tracker's own bootstrap walk where real file times are at hand.
    pub async fn insert_physical_stamped(
        &self,
        physical: &str,
        category: Category,
        ctime: &str,
        mtime: &str,
        size: u64,
        location: &str,
        host_name: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO filesystem
             (physical_path, category, ctime, mtime, size, host_addr, host_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![physical, category.as_i64(), ctime, mtime, size as i64, location, host_name],
        )?;
        Ok(())
    }

    /// Inserts a purely-logical directory (`md`).
    pub async fn insert_logical_dir(&self, logical: &str) -> Result<()> {
        let now = now_stamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO filesystem (logical_path, category, ctime, mtime, size)
             VALUES (?1, 2, ?2, ?3, 0)",
            params![logical, now, now],
        )?;
        Ok(())
    }

    /// Distinct `{name, addr}` pairs of every host with records.
    pub async fn hosts(&self) -> Result<Vec<HostEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT host_name, host_addr FROM filesystem
             WHERE host_name IS NOT NULL AND host_addr IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HostEntry { name: row.get(0)?, addr: row.get(1)? })
        })?;
        let mut hosts = Vec::new();
        for row in rows {
            hosts.push(row?);
        }
        Ok(hosts)
    }

    /// Records on one host whose physical path is `path` or a direct child
    /// of it. The filter is the LIKE pair of the protocol contract.
    pub async fn list_physical(&self, location: &str, tail: &str) -> Result<Vec<ListEntry>> {
        let host_column =
            if path::location_is_addr(location) { "host_addr" } else { "host_name" };
        let sql = format!(
            "SELECT physical_path, category, ctime, mtime, size, host_addr
             FROM filesystem
             WHERE {host_column} = ?1
               AND physical_path LIKE ?2 AND physical_path NOT LIKE ?3
             ORDER BY physical_path ASC"
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![location, format!("{tail}%"), format!("{tail}_%/%")],
            |row| {
                let physical: String = row.get(0)?;
                let category = Category::from_i64(row.get(1)?);
                Ok(ListEntry {
                    name: physical,
                    kind: Some(category.type_tag().to_string()),
                    ctime: row.get(2)?,
                    mtime: row.get(3)?,
                    size: row.get::<_, i64>(4)? as u64,
                    host: row.get(5)?,
                })
            },
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Records whose logical path is `path` or a direct child of it. The
    /// `type` field of each entry carries the record's physical path.
    pub async fn list_logical(&self, logical: &str) -> Result<Vec<ListEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT logical_path, physical_path, ctime, mtime, size, host_addr
             FROM filesystem
             WHERE logical_path LIKE ?1 AND logical_path NOT LIKE ?2
             ORDER BY logical_path ASC",
        )?;
        let rows = stmt.query_map(
            params![format!("{logical}%"), format!("{logical}_%/%")],
            |row| {
                Ok(ListEntry {
                    name: row.get(0)?,
                    kind: row.get(1)?,
                    ctime: row.get(2)?,
                    mtime: row.get(3)?,
                    size: row.get::<_, i64>(4)? as u64,
                    host: row.get(5)?,
                })
            },
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Nulls the logical column of a linked row, keeping the physical record.
    pub async fn detach_logical(&self, logical: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE filesystem SET logical_path = NULL WHERE logical_path = ?1",
            params![logical],
        )?;
        Ok(())
    }

    /// Deletes a logical subtree: the path itself and everything below it.
    pub async fn remove_logical_tree(&self, logical: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM filesystem WHERE logical_path = ?1 OR logical_path LIKE ?2",
            params![logical, format!("{logical}/%")],
        )?;
        Ok(())
    }

    /// Deletes rows with one physical path on one host.
    pub async fn remove_physical(&self, location: &str, physical: &str) -> Result<()> {
        let host_column =
            if path::location_is_addr(location) { "host_addr" } else { "host_name" };
        let sql =
            format!("DELETE FROM filesystem WHERE physical_path = ?1 AND {host_column} = ?2");
        let conn = self.conn.lock().await;
        conn.execute(&sql, params![physical, location])?;
        Ok(())
    }

    /// Removes every record of an evicted host, matching by name and by any
    /// address the name was seen with, so links created by third parties go
    /// away with the host that owned their physical side.
    pub async fn evict_host(&self, host_name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT host_addr FROM filesystem
             WHERE host_name = ?1 AND host_addr IS NOT NULL",
        )?;
        let addrs: Vec<String> = stmt
            .query_map(params![host_name], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);
        conn.execute("DELETE FROM filesystem WHERE host_name = ?1", params![host_name])?;
        for addr in addrs {
            conn.execute("DELETE FROM filesystem WHERE host_addr = ?1", params![addr])?;
        }
        Ok(())
    }

    /// Drops this host's own rows before a bootstrap re-walk.
    pub async fn purge_addr(&self, host_addr: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM filesystem WHERE host_addr = ?1", params![host_addr])?;
        Ok(())
    }

    /// Total row count, used by tests and diagnostics.
    pub async fn row_count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM filesystem", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Full row fetch by logical path, used by tests.
    pub async fn record_by_logical(&self, logical: &str) -> Result<Option<FsRecord>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT logical_path, physical_path, category, ctime, mtime, size,
                        host_addr, host_name
                 FROM filesystem WHERE logical_path = ?1",
                params![logical],
                |row| {
                    Ok(FsRecord {
                        logical_path: row.get(0)?,
                        physical_path: row.get(1)?,
                        category: Category::from_i64(row.get(2)?),
                        ctime: row.get(3)?,
                        mtime: row.get(4)?,
                        size: row.get::<_, i64>(5)? as u64,
                        host_addr: row.get(6)?,
                        host_name: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
