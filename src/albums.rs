//! Collection store: user-defined albums and rule-defined smart albums.
//!
//! Album membership is a list of memory ids with set semantics. The ids are
//! weak references — the album never owns the memory, and deleting a memory
//! leaves its id behind here. Every reader that resolves ids treats a miss
//! as "filtered out", never as an error.
//!
//! Smart albums store a rule instead of a member list; membership is
//! computed on read by `resolve_smart_album`, so it cannot go stale.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::params;
use tracing::warn;

use crate::db::VaultDb;
use crate::error::{Result, VaultError};
use crate::types::{Album, CustomCriteria, Memory, SmartAlbum, SmartRule};
use crate::util::{generate_id, prefixed_id};

#[derive(Debug, Clone, Default)]
pub(crate) struct NewAlbum {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) memory_ids: Vec<String>,
    pub(crate) parent_album_id: Option<String>,
    pub(crate) cover_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AlbumPatch {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) cover_image: Option<Option<String>>,
    pub(crate) parent_album_id: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewSmartAlbum {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) rule: SmartRule,
    pub(crate) auto_update: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SmartAlbumPatch {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) rule: Option<SmartRule>,
    pub(crate) auto_update: Option<bool>,
}

impl VaultDb {
    // ── Albums ───────────────────────────────────────────────────────

    pub(crate) fn create_album(&self, data: NewAlbum, now: DateTime<Utc>) -> Result<Album> {
        let album = Album {
            id: generate_id(now),
            name: data.name,
            description: data.description,
            date_created: now,
            memory_ids: data.memory_ids,
            parent_album_id: data.parent_album_id,
            cover_image: data.cover_image,
        };
        self.insert_album(&album)?;
        Ok(album)
    }

    pub(crate) fn update_album(&self, id: &str, patch: &AlbumPatch) -> Result<Album> {
        let mut album = self
            .album_by_id(id)?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        if let Some(v) = &patch.name {
            album.name = v.clone();
        }
        if let Some(v) = &patch.description {
            album.description = v.clone();
        }
        if let Some(v) = &patch.cover_image {
            album.cover_image = v.clone();
        }
        if let Some(v) = &patch.parent_album_id {
            if let Some(parent) = v {
                if parent == id || self.parent_chain_reaches(parent, id)? {
                    return Err(VaultError::Validation(format!(
                        "album {id} cannot be nested under {parent}: cycle"
                    )));
                }
            }
            album.parent_album_id = v.clone();
        }
        self.save_album(&album)?;
        Ok(album)
    }

    /// Removes the album only; referenced memories are untouched.
    pub(crate) fn delete_album(&self, id: &str) -> Result<bool> {
        self.conn()
            .execute("DELETE FROM albums WHERE id = ?1", params![id])?;
        Ok(true)
    }

    /// Idempotent set-insert: an id already present is a no-op.
    pub(crate) fn add_memory_to_album(&self, album_id: &str, memory_id: &str) -> Result<()> {
        let mut album = self
            .album_by_id(album_id)?
            .ok_or_else(|| VaultError::NotFound(album_id.to_string()))?;
        if album.memory_ids.iter().any(|id| id == memory_id) {
            return Ok(());
        }
        album.memory_ids.push(memory_id.to_string());
        self.save_album(&album)
    }

    pub(crate) fn remove_memory_from_album(
        &self,
        album_id: &str,
        memory_id: &str,
    ) -> Result<()> {
        let mut album = self
            .album_by_id(album_id)?
            .ok_or_else(|| VaultError::NotFound(album_id.to_string()))?;
        album.memory_ids.retain(|id| id != memory_id);
        self.save_album(&album)
    }

    /// Resolve membership against the live memory set. Ids that no longer
    /// resolve are silently dropped; a missing album resolves to empty.
    pub(crate) fn album_memories(&self, album_id: &str, all: &[Memory]) -> Vec<Memory> {
        let Ok(Some(album)) = self.album_by_id(album_id) else {
            return Vec::new();
        };
        all.iter()
            .filter(|m| album.memory_ids.iter().any(|id| *id == m.id))
            .cloned()
            .collect()
    }

    /// Reverse lookup: every album containing the memory. Full scan.
    pub(crate) fn memory_albums(&self, memory_id: &str) -> Vec<Album> {
        self.all_albums()
            .into_iter()
            .filter(|a| a.memory_ids.iter().any(|id| id == memory_id))
            .collect()
    }

    pub(crate) fn album_by_id(&self, id: &str) -> Result<Option<Album>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc FROM albums WHERE id = ?1",
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

    pub(crate) fn all_albums(&self) -> Vec<Album> {
        self.scan_docs("SELECT doc FROM albums")
    }

    pub(crate) fn child_albums(&self, parent_id: &str) -> Vec<Album> {
        self.all_albums()
            .into_iter()
            .filter(|a| a.parent_album_id.as_deref() == Some(parent_id))
            .collect()
    }

    pub(crate) fn root_albums(&self) -> Vec<Album> {
        self.all_albums()
            .into_iter()
            .filter(|a| a.parent_album_id.is_none())
            .collect()
    }

    fn insert_album(&self, album: &Album) -> Result<()> {
        let doc = serde_json::to_string(album)?;
        self.conn()
            .execute(
                "INSERT INTO albums (id, parent_album_id, doc) VALUES (?1, ?2, ?3)",
                params![album.id, album.parent_album_id, doc],
            )
            .map_err(|e| VaultError::from_write(e, &album.id))?;
        Ok(())
    }

    fn save_album(&self, album: &Album) -> Result<()> {
        let doc = serde_json::to_string(album)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO albums (id, parent_album_id, doc)
                 VALUES (?1, ?2, ?3)",
                params![album.id, album.parent_album_id, doc],
            )
            .map_err(|e| VaultError::from_write(e, &album.id))?;
        Ok(())
    }

    /// Walk the parent chain from `start` looking for `target`. Bounded by
    /// the album count, so a pre-existing malformed chain cannot loop us.
    fn parent_chain_reaches(&self, start: &str, target: &str) -> Result<bool> {
        let limit = self.all_albums().len() + 1;
        let mut current = Some(start.to_string());
        for _ in 0..limit {
            let Some(id) = current else { return Ok(false) };
            if id == target {
                return Ok(true);
            }
            current = self
                .album_by_id(&id)?
                .and_then(|a| a.parent_album_id);
        }
        Ok(false)
    }

    // ── Smart albums ─────────────────────────────────────────────────

    pub(crate) fn create_smart_album(
        &self,
        data: NewSmartAlbum,
        now: DateTime<Utc>,
    ) -> Result<SmartAlbum> {
        let album = SmartAlbum {
            id: prefixed_id("smart", now),
            name: data.name,
            description: data.description,
            rule: data.rule,
            auto_update: data.auto_update,
            date_created: now,
        };
        let doc = serde_json::to_string(&album)?;
        self.conn()
            .execute(
                "INSERT INTO smart_albums (id, doc) VALUES (?1, ?2)",
                params![album.id, doc],
            )
            .map_err(|e| VaultError::from_write(e, &album.id))?;
        Ok(album)
    }

    pub(crate) fn update_smart_album(
        &self,
        id: &str,
        patch: &SmartAlbumPatch,
    ) -> Result<SmartAlbum> {
        let mut album = self
            .all_smart_albums()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        if let Some(v) = &patch.name {
            album.name = v.clone();
        }
        if let Some(v) = &patch.description {
            album.description = v.clone();
        }
        if let Some(v) = &patch.rule {
            album.rule = v.clone();
        }
        if let Some(v) = patch.auto_update {
            album.auto_update = v;
        }
        let doc = serde_json::to_string(&album)?;
        self.conn().execute(
            "UPDATE smart_albums SET doc = ?2 WHERE id = ?1",
            params![album.id, doc],
        )?;
        Ok(album)
    }

    pub(crate) fn delete_smart_album(&self, id: &str) -> Result<bool> {
        self.conn()
            .execute("DELETE FROM smart_albums WHERE id = ?1", params![id])?;
        Ok(true)
    }

    pub(crate) fn all_smart_albums(&self) -> Vec<SmartAlbum> {
        self.scan_docs("SELECT doc FROM smart_albums")
    }

    fn scan_docs<T: serde::de::DeserializeOwned>(&self, sql: &str) -> Vec<T> {
        let mut stmt = match self.conn().prepare(sql) {
            Ok(s) => s,
            Err(e) => {
                warn!("collection scan failed: {e}");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(r) => r,
            Err(e) => {
                warn!("collection scan failed: {e}");
                return Vec::new();
            }
        };
        rows.filter_map(|r| r.ok())
            .filter_map(|doc| match serde_json::from_str(&doc) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("skipping unreadable collection record: {e}");
                    None
                }
            })
            .collect()
    }
}

// ── Rule resolution (pure) ───────────────────────────────────────────────

/// Evaluate a smart-album rule against the live memory set. Pure: same rule
/// and memories produce the same result, `now` is a parameter rather than a
/// hidden clock read.
pub(crate) fn resolve_smart_album(
    rule: &SmartRule,
    memories: &[Memory],
    now: DateTime<Utc>,
) -> Vec<Memory> {
    match rule {
        SmartRule::Recent { days } => {
            let cutoff = now - chrono::Duration::days(*days);
            let mut recent: Vec<Memory> = memories
                .iter()
                .filter(|m| m.date_added >= cutoff)
                .cloned()
                .collect();
            recent.sort_by(|a, b| b.date_added.cmp(&a.date_added));
            recent
        }
        SmartRule::Favorites => memories
            .iter()
            .filter(|m| m.is_favorite)
            .cloned()
            .collect(),
        SmartRule::ByYear { year } => memories
            .iter()
            .filter(|m| m.date_created.year() == *year)
            .cloned()
            .collect(),
        SmartRule::ByMonth { year, month } => memories
            .iter()
            .filter(|m| m.date_created.year() == *year && m.date_created.month() == *month)
            .cloned()
            .collect(),
        SmartRule::ByCategory { category } => memories
            .iter()
            .filter(|m| m.category == *category)
            .cloned()
            .collect(),
        SmartRule::ByTag { tag } => memories
            .iter()
            .filter(|m| m.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .cloned()
            .collect(),
        SmartRule::People { person } => {
            let needle = person.to_lowercase();
            memories
                .iter()
                .filter(|m| {
                    m.metadata.as_ref().is_some_and(|meta| {
                        meta.people
                            .iter()
                            .any(|p| p.to_lowercase().contains(&needle))
                    })
                })
                .cloned()
                .collect()
        }
        SmartRule::Places { place } => {
            let needle = place.to_lowercase();
            memories
                .iter()
                .filter(|m| {
                    m.location
                        .as_ref()
                        .is_some_and(|l| l.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect()
        }
        SmartRule::Custom(criteria) => memories
            .iter()
            .filter(|m| matches_custom(m, criteria))
            .cloned()
            .collect(),
    }
}

/// AND semantics: every provided clause must pass.
fn matches_custom(memory: &Memory, criteria: &CustomCriteria) -> bool {
    if let Some(range) = &criteria.date_range {
        if let Some(start) = range.start {
            if memory.date_created < start {
                return false;
            }
        }
        if let Some(end) = range.end {
            if memory.date_created > end {
                return false;
            }
        }
    }
    if let Some(categories) = &criteria.categories {
        if !categories.contains(&memory.category) {
            return false;
        }
    }
    if let Some(tags) = &criteria.tags {
        if !memory.tags.iter().any(|t| tags.contains(t)) {
            return false;
        }
    }
    if let Some(min) = criteria.min_rating {
        let rating = memory.metadata.as_ref().and_then(|meta| meta.rating);
        match rating {
            Some(r) if r >= min => {}
            _ => return false,
        }
    }
    if let Some(file_type) = &criteria.file_type {
        if memory.file_type != *file_type {
            return false;
        }
    }
    true
}

// ── Aggregations for rule building ───────────────────────────────────────

pub(crate) fn available_years(memories: &[Memory]) -> Vec<i32> {
    let mut years: Vec<i32> = memories.iter().map(|m| m.date_created.year()).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

pub(crate) fn available_categories(memories: &[Memory]) -> Vec<String> {
    let mut cats: Vec<String> = memories
        .iter()
        .filter(|m| !m.category.is_empty())
        .map(|m| m.category.clone())
        .collect();
    cats.sort();
    cats.dedup();
    cats
}

pub(crate) fn all_tags(memories: &[Memory]) -> Vec<String> {
    let mut tags: Vec<String> = memories
        .iter()
        .flat_map(|m| m.tags.iter().cloned())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// The starter set offered on first run: favorites, a 30-day window, and
/// the current year.
pub(crate) fn default_smart_albums(now: DateTime<Utc>) -> Vec<NewSmartAlbum> {
    vec![
        NewSmartAlbum {
            name: "Favorites".to_string(),
            description: "All your favorite memories".to_string(),
            rule: SmartRule::Favorites,
            auto_update: true,
        },
        NewSmartAlbum {
            name: "Recent (30 days)".to_string(),
            description: "Memories added in the last 30 days".to_string(),
            rule: SmartRule::Recent { days: 30 },
            auto_update: true,
        },
        NewSmartAlbum {
            name: now.year().to_string(),
            description: format!("All memories from {}", now.year()),
            rule: SmartRule::ByYear { year: now.year() },
            auto_update: true,
        },
    ]
}
