//! SQLite-backed record store.
//!
//! One database file holds every table: `memories` (the record store),
//! `albums` / `smart_albums` (collection store), `links` / `comments`
//! (relationship store) and `kv` (migration flag, legacy backup). Records
//! are stored as JSON documents alongside the columns worth indexing, so the
//! wire format and the storage format never drift apart.
//!
//! Every operation runs in its own implicit transaction; all writes are
//! single-record, so no multi-operation atomicity is needed. SQLite
//! serializes access on the single connection, which is the whole
//! concurrency model here (single process, single writer).

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::warn;

use crate::error::{Result, VaultError};
use crate::types::{Memory, MemoryPatch};

pub(crate) struct VaultDb {
    conn: Connection,
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    date_created TEXT NOT NULL,
    date_added TEXT NOT NULL,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_date_added ON memories(date_added);
CREATE INDEX IF NOT EXISTS idx_memories_date_created ON memories(date_created);
CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_memories_title ON memories(title);

CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    parent_album_id TEXT,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_albums_parent ON albums(parent_album_id)
    WHERE parent_album_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS smart_albums (
    id TEXT PRIMARY KEY,
    doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_id);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_id);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL,
    doc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_memory ON comments(memory_id);

CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

impl VaultDb {
    /// Open or create the database file with the full schema.
    pub(crate) fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VaultError::StorageUnavailable {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| VaultError::StorageUnavailable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.conn.execute_batch(SCHEMA_SQL)?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA cache_size = -8000;",
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Memory operations ────────────────────────────────────────────

    /// Full scan of the memory table. Order is storage-defined; callers
    /// sort. A broken store degrades to an empty result with a warning
    /// instead of an error — a vault that fails to read should render as
    /// empty, not crash the caller.
    pub(crate) fn get_all_memories(&self) -> Vec<Memory> {
        let mut stmt = match self.conn.prepare("SELECT doc FROM memories") {
            Ok(s) => s,
            Err(e) => {
                warn!("reading memories failed: {e}");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(r) => r,
            Err(e) => {
                warn!("reading memories failed: {e}");
                return Vec::new();
            }
        };
        rows.filter_map(|r| r.ok())
            .filter_map(|doc| match serde_json::from_str(&doc) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("skipping unreadable memory record: {e}");
                    None
                }
            })
            .collect()
    }

    /// Insert a new record. Fails with `DuplicateKey` if the id exists.
    pub(crate) fn add_memory(&self, memory: &Memory) -> Result<()> {
        let doc = serde_json::to_string(memory)?;
        self.conn
            .execute(
                "INSERT INTO memories (id, title, category, date_created, date_added, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    memory.id,
                    memory.title,
                    memory.category,
                    memory.date_created.to_rfc3339(),
                    memory.date_added.to_rfc3339(),
                    doc,
                ],
            )
            .map_err(|e| VaultError::from_write(e, &memory.id))?;
        Ok(())
    }

    /// Raw full-record replace, keyed by `memory.id`. An unknown id inserts
    /// silently — this is deliberate put semantics, used by overwrite-mode
    /// import where the stored record must become exactly the incoming one.
    /// Everyone else goes through `update_memory`.
    pub(crate) fn put_memory(&self, memory: &Memory) -> Result<()> {
        let doc = serde_json::to_string(memory)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO memories
                 (id, title, category, date_created, date_added, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    memory.id,
                    memory.title,
                    memory.category,
                    memory.date_created.to_rfc3339(),
                    memory.date_added.to_rfc3339(),
                    doc,
                ],
            )
            .map_err(|e| VaultError::from_write(e, &memory.id))?;
        Ok(())
    }

    /// Patch-style update. The immutable fields (`id`, `date_added`,
    /// `file_name`, `file_type`, `file_size`, `file_data`) are re-merged
    /// from the stored record here, inside the store, so the invariant
    /// cannot be bypassed by a caller holding a stale copy.
    pub(crate) fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        let existing = self
            .memory_by_id(id)?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let merged = patch.apply_to(&existing);
        self.put_memory(&merged)?;
        Ok(merged)
    }

    /// Idempotent delete: removing an absent id is success, not an error.
    pub(crate) fn delete_memory(&self, id: &str) -> Result<bool> {
        self.conn
            .execute("DELETE FROM memories WHERE id = ?1", params![id])
            .map_err(VaultError::Sqlite)?;
        Ok(true)
    }

    /// Wipe the memory table. Only meaningful as the first half of the
    /// clear-then-import protocol for replace-mode import.
    pub(crate) fn clear_memories(&self) -> Result<()> {
        self.conn.execute("DELETE FROM memories", [])?;
        Ok(())
    }

    pub(crate) fn memory_by_id(&self, id: &str) -> Result<Option<Memory>> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT doc FROM memories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(VaultError::Sqlite(other)),
            })?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn memory_count(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize
    }

    /// Database file size in bytes (storage footprint for `stats`).
    pub(crate) fn file_size(path: &Path) -> u64 {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }

    // ── Key-value operations ─────────────────────────────────────────

    pub(crate) fn kv_get(&self, key: &str) -> Option<String> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .ok()
    }

    pub(crate) fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| VaultError::from_write(e, key))?;
        Ok(())
    }

    pub(crate) fn kv_delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{TimeZone, Utc};

    use super::VaultDb;
    use crate::types::Memory;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    pub(crate) fn temp_db_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("memoria_vault_test");
        std::fs::create_dir_all(&dir).unwrap();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(
            "test_{}_{n}_{name}.sqlite",
            std::process::id()
        ))
    }

    pub(crate) fn open_temp(name: &str) -> (PathBuf, VaultDb) {
        let path = temp_db_path(name);
        let _ = std::fs::remove_file(&path);
        let db = VaultDb::open_or_create(&path).unwrap();
        (path, db)
    }

    pub(crate) fn sample_memory(id: &str) -> Memory {
        Memory {
            id: id.to_string(),
            title: format!("Memory {id}"),
            description: "a test record".to_string(),
            category: "Photos".to_string(),
            tags: vec!["test".to_string()],
            date_created: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            date_added: Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
            file_name: format!("{id}.jpg"),
            file_type: "image/jpeg".to_string(),
            file_size: 4,
            file_data: "data:image/jpeg;base64,dGVzdA==".to_string(),
            thumbnail: None,
            is_favorite: false,
            location: None,
            metadata: None,
        }
    }
}
