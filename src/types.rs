//! Record types for the vault. All wire formats are camelCase JSON with
//! ISO-8601 dates so export snapshots stay portable across clients and
//! readable by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Memory ───────────────────────────────────────────────────────────────

/// The atomic stored unit: one uploaded content item plus its metadata.
///
/// `file_data` is the canonical payload, encoded as a base64 data URI —
/// nothing else stores binary. `id`, `date_added` and the `file_*` fields
/// are immutable once created; `VaultDb::update_memory` re-merges them from
/// the stored record so no caller can clobber them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Memory {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: String,
    /// Open enumeration (Photos, Videos, Audio, Documents, Notes, ...).
    /// A hint, not a type tag — any string is accepted.
    #[serde(default)]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    /// The content's real-world date, user-supplied.
    pub(crate) date_created: DateTime<Utc>,
    /// Ingestion timestamp, system-assigned.
    pub(crate) date_added: DateTime<Utc>,
    #[serde(default)]
    pub(crate) file_name: String,
    #[serde(default)]
    pub(crate) file_type: String,
    #[serde(default)]
    pub(crate) file_size: u64,
    #[serde(default)]
    pub(crate) file_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thumbnail: Option<String>,
    #[serde(default)]
    pub(crate) is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) metadata: Option<MemoryMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct MemoryMeta {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) people: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rating: Option<u8>,
}

/// Patch of the mutable `Memory` fields. The immutable fields have no slot
/// here on purpose.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryPatch {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) tags: Option<Vec<String>>,
    pub(crate) date_created: Option<DateTime<Utc>>,
    pub(crate) is_favorite: Option<bool>,
    pub(crate) thumbnail: Option<Option<String>>,
    pub(crate) location: Option<Option<String>>,
    pub(crate) metadata: Option<Option<MemoryMeta>>,
}

impl MemoryPatch {
    pub(crate) fn apply_to(&self, existing: &Memory) -> Memory {
        let mut out = existing.clone();
        if let Some(v) = &self.title {
            out.title = v.clone();
        }
        if let Some(v) = &self.description {
            out.description = v.clone();
        }
        if let Some(v) = &self.category {
            out.category = v.clone();
        }
        if let Some(v) = &self.tags {
            out.tags = v.clone();
        }
        if let Some(v) = self.date_created {
            out.date_created = v;
        }
        if let Some(v) = self.is_favorite {
            out.is_favorite = v;
        }
        if let Some(v) = &self.thumbnail {
            out.thumbnail = v.clone();
        }
        if let Some(v) = &self.location {
            out.location = v.clone();
        }
        if let Some(v) = &self.metadata {
            out.metadata = v.clone();
        }
        out
    }
}

// ── Album ────────────────────────────────────────────────────────────────

/// User-curated grouping. `memory_ids` are weak references: deleting a
/// memory does not purge it here, readers filter unresolvable ids instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Album {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) date_created: DateTime<Utc>,
    #[serde(default)]
    pub(crate) memory_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) parent_album_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) cover_image: Option<String>,
}

// ── Smart album ──────────────────────────────────────────────────────────

/// Rule-based grouping, membership computed on read. Has no `memory_ids`
/// and therefore cannot go stale or dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SmartAlbum {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(flatten)]
    pub(crate) rule: SmartRule,
    #[serde(default = "default_true")]
    pub(crate) auto_update: bool,
    pub(crate) date_created: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// One variant per smart-album type, each carrying only the parameters its
/// resolution needs. Serialized as `{"type": ..., "criteria": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "criteria", rename_all = "snake_case")]
pub(crate) enum SmartRule {
    Recent {
        #[serde(default = "default_recent_days")]
        days: i64,
    },
    Favorites,
    ByYear {
        year: i32,
    },
    ByMonth {
        year: i32,
        /// 1-based calendar month.
        month: u32,
    },
    ByCategory {
        category: String,
    },
    ByTag {
        tag: String,
    },
    People {
        person: String,
    },
    Places {
        place: String,
    },
    Custom(CustomCriteria),
}

fn default_recent_days() -> i64 {
    30
}

/// Conjunction of filters: every provided clause must pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CustomCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) date_range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) min_rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) end: Option<DateTime<Utc>>,
}

// ── Link ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LinkType {
    Related,
    Sequence,
    BeforeAfter,
    SameEvent,
    SamePeople,
    SamePlace,
    Custom,
}

impl LinkType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Related => "related",
            Self::Sequence => "sequence",
            Self::BeforeAfter => "before_after",
            Self::SameEvent => "same_event",
            Self::SamePeople => "same_people",
            Self::SamePlace => "same_place",
            Self::Custom => "custom",
        }
    }
}

/// Symmetric typed edge between two memories. At most one link exists per
/// unordered pair, enforced at insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemoryLink {
    pub(crate) id: String,
    pub(crate) from_memory_id: String,
    pub(crate) to_memory_id: String,
    pub(crate) link_type: LinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) metadata: Option<serde_json::Value>,
    pub(crate) date_created: DateTime<Utc>,
}

// ── Comment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Comment {
    pub(crate) id: String,
    pub(crate) memory_id: String,
    pub(crate) text: String,
    pub(crate) author: String,
    pub(crate) timestamp: DateTime<Utc>,
    #[serde(default)]
    pub(crate) edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) edited_at: Option<DateTime<Utc>>,
}

// ── Snapshots and reports ────────────────────────────────────────────────

pub(crate) const SNAPSHOT_VERSION: &str = "1.0";

/// Portable export format: the whole memory set plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportSnapshot {
    pub(crate) memories: Vec<Memory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) export_date: Option<DateTime<Utc>>,
    #[serde(default = "default_snapshot_version")]
    pub(crate) version: String,
}

fn default_snapshot_version() -> String {
    SNAPSHOT_VERSION.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MigrationReport {
    pub(crate) total: usize,
    pub(crate) migrated: usize,
    pub(crate) skipped: usize,
}

/// Import outcome is always reported as counts, never a single pass/fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ImportReport {
    pub(crate) total: usize,
    pub(crate) imported: usize,
    pub(crate) skipped: usize,
    pub(crate) errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mem(id: &str) -> Memory {
        Memory {
            id: id.to_string(),
            title: "Trip".to_string(),
            description: String::new(),
            category: "Photos".to_string(),
            tags: vec!["beach".to_string()],
            date_created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            date_added: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            file_name: "trip.jpg".to_string(),
            file_type: "image/jpeg".to_string(),
            file_size: 3,
            file_data: "data:image/jpeg;base64,AAAA".to_string(),
            thumbnail: None,
            is_favorite: false,
            location: None,
            metadata: None,
        }
    }

    #[test]
    fn test_memory_wire_format_is_camel_case() {
        let json = serde_json::to_value(mem("m1")).unwrap();
        assert!(json.get("dateAdded").is_some());
        assert!(json.get("fileData").is_some());
        assert!(json.get("isFavorite").is_some());
        assert!(json.get("date_added").is_none());
    }

    #[test]
    fn test_memory_round_trip() {
        let m = mem("m1");
        let json = serde_json::to_string(&m).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn test_smart_rule_tagged_wire_format() {
        let rule = SmartRule::ByMonth { year: 2024, month: 6 };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "by_month");
        assert_eq!(json["criteria"]["year"], 2024);

        let favorites: SmartRule =
            serde_json::from_value(serde_json::json!({ "type": "favorites" })).unwrap();
        assert_eq!(favorites, SmartRule::Favorites);

        let recent: SmartRule =
            serde_json::from_value(serde_json::json!({ "type": "recent", "criteria": {} }))
                .unwrap();
        assert_eq!(recent, SmartRule::Recent { days: 30 });
    }

    #[test]
    fn test_patch_leaves_unset_fields_alone() {
        let m = mem("m1");
        let patch = MemoryPatch {
            title: Some("Trip 2024".to_string()),
            ..Default::default()
        };
        let updated = patch.apply_to(&m);
        assert_eq!(updated.title, "Trip 2024");
        assert_eq!(updated.description, m.description);
        assert_eq!(updated.file_data, m.file_data);
        assert_eq!(updated.date_added, m.date_added);
    }

    #[test]
    fn test_snapshot_version_defaults() {
        let snap: ExportSnapshot =
            serde_json::from_str(r#"{"memories": []}"#).unwrap();
        assert_eq!(snap.version, "1.0");
        assert!(snap.export_date.is_none());
    }
}
