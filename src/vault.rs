//! Session layer over the record store.
//!
//! `Vault::open` is the one entry point: it opens (or creates) the database,
//! runs the legacy migration exactly once, and hands back a handle that the
//! CLI drives. Operations that span subsystems live here — deleting a memory
//! also purges its links and comments, adding one assigns its identity.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::db::VaultDb;
use crate::error::Result;
use crate::migrate::{MIGRATED_FLAG_KEY, migrate_from_legacy};
use crate::types::{Memory, MemoryMeta, MemoryPatch, MigrationReport};
use crate::util::generate_id;

pub(crate) struct Vault {
    db: VaultDb,
    db_path: PathBuf,
}

/// Input for a brand-new memory. Identity (`id`, `date_added`) is assigned
/// by the vault, never supplied.
#[derive(Debug, Clone, Default)]
pub(crate) struct NewMemory {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) tags: Vec<String>,
    pub(crate) date_created: Option<DateTime<Utc>>,
    pub(crate) file_name: String,
    pub(crate) file_type: String,
    pub(crate) file_size: u64,
    pub(crate) file_data: String,
    pub(crate) thumbnail: Option<String>,
    pub(crate) location: Option<String>,
    pub(crate) metadata: Option<MemoryMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SortBy {
    #[default]
    DateAdded,
    DateCreated,
    Title,
    Category,
}

/// Listing filter. All clauses are optional and conjunctive.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryFilter {
    /// Case-insensitive substring over title, description and tags.
    pub(crate) search: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) favorites_only: bool,
    pub(crate) sort_by: SortBy,
}

impl Vault {
    /// Open the vault, migrating from the legacy flat file if that has not
    /// happened yet. The migration flag is checked here so the transfer
    /// runs at most once per store.
    pub(crate) fn open(db_path: &Path, legacy_path: &Path) -> Result<(Self, MigrationReport)> {
        let db = VaultDb::open_or_create(db_path)?;
        let report = if db.kv_get(MIGRATED_FLAG_KEY).as_deref() == Some("true") {
            debug!("legacy migration already complete, skipping");
            MigrationReport::default()
        } else {
            migrate_from_legacy(&db, legacy_path)?
        };
        Ok((
            Self {
                db,
                db_path: db_path.to_path_buf(),
            },
            report,
        ))
    }

    pub(crate) fn db(&self) -> &VaultDb {
        &self.db
    }

    pub(crate) fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ── Memory operations ────────────────────────────────────────────

    pub(crate) fn add_memory(&self, new: NewMemory, now: DateTime<Utc>) -> Result<Memory> {
        let memory = Memory {
            id: generate_id(now),
            title: new.title,
            description: new.description,
            category: new.category,
            tags: new.tags,
            date_created: new.date_created.unwrap_or(now),
            date_added: now,
            file_name: new.file_name,
            file_type: new.file_type,
            file_size: new.file_size,
            file_data: new.file_data,
            thumbnail: new.thumbnail,
            is_favorite: false,
            location: new.location,
            metadata: new.metadata,
        };
        self.db.add_memory(&memory)?;
        info!("added memory {} ({})", memory.id, memory.title);
        Ok(memory)
    }

    pub(crate) fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        self.db.update_memory(id, patch)
    }

    /// Delete a memory and everything that references it in the
    /// relationship store. Album member lists are left alone; their readers
    /// filter unresolvable ids.
    pub(crate) fn delete_memory(&self, id: &str) -> Result<bool> {
        self.db.purge_memory_refs(id)?;
        let deleted = self.db.delete_memory(id)?;
        info!("deleted memory {id}");
        Ok(deleted)
    }

    pub(crate) fn toggle_favorite(&self, id: &str) -> Result<Memory> {
        let current = self
            .db
            .memory_by_id(id)?
            .ok_or_else(|| crate::error::VaultError::NotFound(id.to_string()))?;
        let patch = MemoryPatch {
            is_favorite: Some(!current.is_favorite),
            ..Default::default()
        };
        self.db.update_memory(id, &patch)
    }

    /// Filtered, sorted listing. Both date sorts are newest-first; title
    /// and category sort ascending, case-insensitive.
    pub(crate) fn filtered_memories(&self, filter: &MemoryFilter) -> Vec<Memory> {
        let mut memories = self.db.get_all_memories();

        if let Some(query) = &filter.search {
            let needle = query.to_lowercase();
            memories.retain(|m| {
                m.title.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            });
        }
        if let Some(category) = &filter.category {
            memories.retain(|m| m.category == *category);
        }
        if filter.favorites_only {
            memories.retain(|m| m.is_favorite);
        }

        match filter.sort_by {
            SortBy::DateAdded => memories.sort_by(|a, b| b.date_added.cmp(&a.date_added)),
            SortBy::DateCreated => {
                memories.sort_by(|a, b| b.date_created.cmp(&a.date_created))
            }
            SortBy::Title => {
                memories.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            }
            SortBy::Category => memories.sort_by(|a, b| {
                a.category
                    .to_lowercase()
                    .cmp(&b.category.to_lowercase())
            }),
        }
        memories
    }
}
