//! One-time migration from the legacy flat-file store.
//!
//! The pre-SQLite format was a single JSON array of memory records in one
//! file. Migration copies every record into the record store, backs the
//! original payload up under a kv key, deletes the legacy file, and sets a
//! completion flag.
//!
//! The flag is written here but checked by the caller (`Vault::open`) —
//! this function always attempts the transfer when invoked. Re-running is
//! harmless either way: per-record duplicate keys are swallowed, so a
//! partial prior run never duplicates or loses data.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::db::VaultDb;
use crate::error::{Result, VaultError};
use crate::types::{Memory, MigrationReport};

/// kv key holding the verbatim legacy payload after migration.
pub(crate) const LEGACY_BACKUP_KEY: &str = "legacy-backup";
/// kv key set to "true" once migration has completed.
pub(crate) const MIGRATED_FLAG_KEY: &str = "legacy-migrated";

pub(crate) fn migrate_from_legacy(db: &VaultDb, legacy_path: &Path) -> Result<MigrationReport> {
    // No payload, or a payload that isn't a non-empty array of records:
    // report zero and stop without touching anything.
    let raw = match fs::read_to_string(legacy_path) {
        Ok(s) => s,
        Err(_) => return Ok(MigrationReport::default()),
    };
    let memories: Vec<Memory> = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("legacy payload at {} is not a memory array: {e}", legacy_path.display());
            return Ok(MigrationReport::default());
        }
    };
    if memories.is_empty() {
        return Ok(MigrationReport::default());
    }

    let total = memories.len();
    let mut migrated = 0usize;
    let mut skipped = 0usize;
    for memory in &memories {
        match db.add_memory(memory) {
            Ok(()) => migrated += 1,
            // Expected on re-run after a partial prior migration; the one
            // error class this subsystem drops without a log.
            Err(VaultError::DuplicateKey(_)) => skipped += 1,
            Err(e) => {
                warn!("failed to migrate memory {}: {e}", memory.id);
                skipped += 1;
            }
        }
    }

    // Backup before delete, then flag. Order matters: the legacy payload
    // must survive verbatim somewhere before its original copy goes away.
    db.kv_set(LEGACY_BACKUP_KEY, &raw)?;
    fs::remove_file(legacy_path)?;
    db.kv_set(MIGRATED_FLAG_KEY, "true")?;

    info!("migrated {migrated}/{total} legacy memories ({skipped} already present)");
    Ok(MigrationReport {
        total,
        migrated,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{open_temp, sample_memory, temp_db_path};

    fn write_legacy(name: &str, json: &str) -> std::path::PathBuf {
        let path = temp_db_path(name).with_extension("json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_migrates_records_backs_up_and_flags() {
        let (db_path, db) = open_temp("migrate_full");
        let payload = serde_json::to_string(&vec![
            sample_memory("a"),
            sample_memory("b"),
        ])
        .unwrap();
        let legacy = write_legacy("migrate_full", &payload);

        let report = migrate_from_legacy(&db, &legacy).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.migrated, 2);
        assert_eq!(report.skipped, 0);

        assert_eq!(db.memory_count(), 2);
        assert!(db.memory_by_id("a").unwrap().is_some());
        assert!(db.memory_by_id("b").unwrap().is_some());

        // Legacy file gone, backup holds the original payload, flag set.
        assert!(!legacy.exists());
        assert_eq!(db.kv_get(LEGACY_BACKUP_KEY).as_deref(), Some(payload.as_str()));
        assert_eq!(db.kv_get(MIGRATED_FLAG_KEY).as_deref(), Some("true"));
        std::fs::remove_file(&db_path).ok();
    }

    #[test]
    fn test_rerun_never_duplicates() {
        let (db_path, db) = open_temp("migrate_rerun");
        let payload = serde_json::to_string(&vec![
            sample_memory("a"),
            sample_memory("b"),
        ])
        .unwrap();

        let legacy = write_legacy("migrate_rerun_1", &payload);
        let first = migrate_from_legacy(&db, &legacy).unwrap();
        assert_eq!(first.migrated, 2);

        // A second run against the same payload (flag ignored on purpose,
        // simulating a caller that forgot to check it).
        let legacy = write_legacy("migrate_rerun_2", &payload);
        let second = migrate_from_legacy(&db, &legacy).unwrap();
        assert_eq!(second.migrated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.memory_count(), 2);
        std::fs::remove_file(&db_path).ok();
    }

    #[test]
    fn test_missing_payload_is_a_no_op() {
        let (db_path, db) = open_temp("migrate_missing");
        let report =
            migrate_from_legacy(&db, Path::new("/nonexistent/legacy.json")).unwrap();
        assert_eq!(report, MigrationReport::default());
        assert!(db.kv_get(MIGRATED_FLAG_KEY).is_none());
        assert!(db.kv_get(LEGACY_BACKUP_KEY).is_none());
        std::fs::remove_file(&db_path).ok();
    }

    #[test]
    fn test_invalid_payload_is_side_effect_free() {
        let (db_path, db) = open_temp("migrate_invalid");
        let legacy = write_legacy("migrate_invalid", "{\"not\": \"an array\"}");

        let report = migrate_from_legacy(&db, &legacy).unwrap();
        assert_eq!(report, MigrationReport::default());
        assert_eq!(db.memory_count(), 0);
        // Invalid payload is left in place and nothing is flagged.
        assert!(legacy.exists());
        assert!(db.kv_get(MIGRATED_FLAG_KEY).is_none());
        std::fs::remove_file(&legacy).ok();
        std::fs::remove_file(&db_path).ok();
    }

    #[test]
    fn test_empty_array_is_side_effect_free() {
        let (db_path, db) = open_temp("migrate_empty");
        let legacy = write_legacy("migrate_empty", "[]");
        let report = migrate_from_legacy(&db, &legacy).unwrap();
        assert_eq!(report, MigrationReport::default());
        assert!(legacy.exists());
        std::fs::remove_file(&legacy).ok();
        std::fs::remove_file(&db_path).ok();
    }
}
