//! Import/export reconciler.
//!
//! Export is a whole-store snapshot; import applies it back under
//! merge-or-replace semantics with a per-record conflict strategy. An import
//! is deliberately not transactional: records commit one at a time, a
//! failure partway leaves the committed prefix in place, and the outcome is
//! always reported as counts, never a single pass/fail.
//!
//! Replace mode does not clear the store itself. The caller clears first —
//! an explicit two-step protocol, so a destructive wipe never hides inside
//! an innocent-looking import call.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::db::VaultDb;
use crate::error::{Result, VaultError};
use crate::types::{ExportSnapshot, ImportReport, Memory, SNAPSHOT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportMode {
    Merge,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConflictStrategy {
    Skip,
    Overwrite,
}

/// Validate and parse a snapshot payload. Anything without a `memories`
/// array is rejected outright — no partial acceptance.
pub(crate) fn parse_snapshot(raw: &str) -> Result<ExportSnapshot> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| VaultError::Validation(format!("not valid JSON: {e}")))?;
    let Some(obj) = value.as_object() else {
        return Err(VaultError::Validation(
            "expected a top-level object".to_string(),
        ));
    };
    if !obj.get("memories").is_some_and(|v| v.is_array()) {
        return Err(VaultError::Validation(
            "missing \"memories\" array".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| VaultError::Validation(format!("malformed export: {e}")))
}

/// Snapshot the full memory set. Whole-store, non-streaming.
pub(crate) fn export_snapshot(db: &VaultDb, now: DateTime<Utc>) -> ExportSnapshot {
    ExportSnapshot {
        memories: db.get_all_memories(),
        export_date: Some(now),
        version: SNAPSHOT_VERSION.to_string(),
    }
}

enum RecordOutcome {
    Imported,
    Skipped,
}

fn import_one(
    db: &VaultDb,
    memory: &Memory,
    mode: ImportMode,
    strategy: ConflictStrategy,
) -> Result<RecordOutcome> {
    match mode {
        ImportMode::Replace => {
            db.add_memory(memory)?;
            Ok(RecordOutcome::Imported)
        }
        ImportMode::Merge => match db.memory_by_id(&memory.id)? {
            None => {
                db.add_memory(memory)?;
                Ok(RecordOutcome::Imported)
            }
            Some(_) => match strategy {
                ConflictStrategy::Skip => Ok(RecordOutcome::Skipped),
                // Exact replacement: put semantics, not a field-preserving
                // update — the incoming record wins wholesale.
                ConflictStrategy::Overwrite => {
                    db.put_memory(memory)?;
                    Ok(RecordOutcome::Imported)
                }
            },
        },
    }
}

/// Apply a snapshot record by record, reporting progress as
/// `(current, total)` before each attempt.
pub(crate) fn run_import<F>(
    db: &VaultDb,
    snapshot: &ExportSnapshot,
    mode: ImportMode,
    strategy: ConflictStrategy,
    mut progress: F,
) -> ImportReport
where
    F: FnMut(usize, usize),
{
    let total = snapshot.memories.len();
    let mut report = ImportReport {
        total,
        ..Default::default()
    };

    for (i, memory) in snapshot.memories.iter().enumerate() {
        progress(i + 1, total);
        match import_one(db, memory, mode, strategy) {
            Ok(RecordOutcome::Imported) => report.imported += 1,
            Ok(RecordOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!("failed to import memory {}: {e}", memory.id);
                report.errors += 1;
            }
        }
    }
    report
}

// ── Import session ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportStep {
    Selecting,
    Previewing,
    Importing,
    Complete,
}

/// Stats shown between selection and the import run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreviewStats {
    pub(crate) total: usize,
    pub(crate) categories: std::collections::BTreeMap<String, usize>,
    pub(crate) total_bytes: u64,
    pub(crate) export_date: Option<DateTime<Utc>>,
    pub(crate) version: String,
}

/// One import interaction: select a payload, preview it, run it, report.
/// Selection failures leave the session in `Selecting` with no state
/// change, so a bad file can simply be re-picked.
pub(crate) struct ImportSession {
    step: ImportStep,
    snapshot: Option<ExportSnapshot>,
    report: Option<ImportReport>,
}

impl ImportSession {
    pub(crate) fn new() -> Self {
        Self {
            step: ImportStep::Selecting,
            snapshot: None,
            report: None,
        }
    }

    pub(crate) fn step(&self) -> ImportStep {
        self.step
    }

    pub(crate) fn select(&mut self, raw: &str) -> Result<PreviewStats> {
        let snapshot = parse_snapshot(raw)?;
        let stats = preview_stats(&snapshot);
        self.snapshot = Some(snapshot);
        self.step = ImportStep::Previewing;
        Ok(stats)
    }

    pub(crate) fn run<F>(
        &mut self,
        db: &VaultDb,
        mode: ImportMode,
        strategy: ConflictStrategy,
        progress: F,
    ) -> Result<ImportReport>
    where
        F: FnMut(usize, usize),
    {
        let Some(snapshot) = &self.snapshot else {
            return Err(VaultError::Validation(
                "no snapshot selected".to_string(),
            ));
        };
        self.step = ImportStep::Importing;
        let report = run_import(db, snapshot, mode, strategy, progress);
        self.report = Some(report);
        self.step = ImportStep::Complete;
        Ok(report)
    }

    pub(crate) fn report(&self) -> Option<ImportReport> {
        self.report
    }
}

pub(crate) fn preview_stats(snapshot: &ExportSnapshot) -> PreviewStats {
    let mut categories = std::collections::BTreeMap::new();
    let mut total_bytes = 0u64;
    for m in &snapshot.memories {
        *categories.entry(m.category.clone()).or_insert(0) += 1;
        total_bytes += m.file_size;
    }
    PreviewStats {
        total: snapshot.memories.len(),
        categories,
        total_bytes,
        export_date: snapshot.export_date,
        version: snapshot.version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{open_temp, sample_memory};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(matches!(
            parse_snapshot("not json"),
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            parse_snapshot("[1, 2, 3]"),
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            parse_snapshot(r#"{"memories": "nope"}"#),
            Err(VaultError::Validation(_))
        ));
        assert!(parse_snapshot(r#"{"memories": []}"#).is_ok());
    }

    #[test]
    fn test_export_import_round_trip_under_replace() {
        let (path, db) = open_temp("round_trip");
        let mut fav = sample_memory("m2");
        fav.is_favorite = true;
        fav.thumbnail = Some("data:image/jpeg;base64,dA==".to_string());
        db.add_memory(&sample_memory("m1")).unwrap();
        db.add_memory(&fav).unwrap();

        let snapshot = export_snapshot(&db, now());
        let raw = serde_json::to_string(&snapshot).unwrap();

        // Clear-then-import: the explicit two-step replace protocol.
        db.clear_memories().unwrap();
        let parsed = parse_snapshot(&raw).unwrap();
        let report = run_import(
            &db,
            &parsed,
            ImportMode::Replace,
            ConflictStrategy::Skip,
            |_, _| {},
        );
        assert_eq!(report.imported, 2);
        assert_eq!(report.errors, 0);

        let mut original = snapshot.memories.clone();
        let mut restored = db.get_all_memories();
        original.sort_by(|a, b| a.id.cmp(&b.id));
        restored.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(original, restored);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_merge_skip_leaves_existing_untouched() {
        let (path, db) = open_temp("merge_skip");
        db.add_memory(&sample_memory("m1")).unwrap();

        let mut incoming = sample_memory("m1");
        incoming.title = "incoming title".to_string();
        let snapshot = ExportSnapshot {
            memories: vec![incoming, sample_memory("m2")],
            export_date: Some(now()),
            version: "1.0".to_string(),
        };

        let report = run_import(
            &db,
            &snapshot,
            ImportMode::Merge,
            ConflictStrategy::Skip,
            |_, _| {},
        );
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 0);

        let kept = db.memory_by_id("m1").unwrap().unwrap();
        assert_eq!(kept.title, "Memory m1");
        assert!(db.memory_by_id("m2").unwrap().is_some());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_merge_overwrite_replaces_exactly() {
        let (path, db) = open_temp("merge_overwrite");
        db.add_memory(&sample_memory("m1")).unwrap();

        let mut incoming = sample_memory("m1");
        incoming.title = "incoming title".to_string();
        incoming.file_data = "data:image/png;base64,bmV3".to_string();
        let snapshot = ExportSnapshot {
            memories: vec![incoming.clone()],
            export_date: Some(now()),
            version: "1.0".to_string(),
        };

        let report = run_import(
            &db,
            &snapshot,
            ImportMode::Merge,
            ConflictStrategy::Overwrite,
            |_, _| {},
        );
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 0);

        // Overwrite is wholesale: even the payload becomes the incoming one.
        let stored = db.memory_by_id("m1").unwrap().unwrap();
        assert_eq!(stored, incoming);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_progress_reported_per_record() {
        let (path, db) = open_temp("progress");
        let snapshot = ExportSnapshot {
            memories: vec![
                sample_memory("a"),
                sample_memory("b"),
                sample_memory("c"),
            ],
            export_date: Some(now()),
            version: "1.0".to_string(),
        };

        let mut seen = Vec::new();
        run_import(
            &db,
            &snapshot,
            ImportMode::Merge,
            ConflictStrategy::Skip,
            |current, total| seen.push((current, total)),
        );
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_replace_without_clear_counts_errors() {
        // A caller that skips the clear step gets duplicate-key errors
        // counted, not a crash — partial import is a reportable state.
        let (path, db) = open_temp("replace_no_clear");
        db.add_memory(&sample_memory("m1")).unwrap();

        let snapshot = ExportSnapshot {
            memories: vec![sample_memory("m1"), sample_memory("m2")],
            export_date: Some(now()),
            version: "1.0".to_string(),
        };
        let report = run_import(
            &db,
            &snapshot,
            ImportMode::Replace,
            ConflictStrategy::Skip,
            |_, _| {},
        );
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(db.memory_count(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_session_walks_the_state_machine() {
        let (path, db) = open_temp("session");
        let mut session = ImportSession::new();
        assert_eq!(session.step(), ImportStep::Selecting);

        // A bad payload leaves the session selectable.
        assert!(session.select("garbage").is_err());
        assert_eq!(session.step(), ImportStep::Selecting);

        let snapshot = ExportSnapshot {
            memories: vec![sample_memory("a"), sample_memory("b")],
            export_date: Some(now()),
            version: "1.0".to_string(),
        };
        let raw = serde_json::to_string(&snapshot).unwrap();
        let stats = session.select(&raw).unwrap();
        assert_eq!(session.step(), ImportStep::Previewing);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.categories.get("Photos"), Some(&2));
        assert_eq!(stats.total_bytes, 8);

        let report = session
            .run(&db, ImportMode::Merge, ConflictStrategy::Skip, |_, _| {})
            .unwrap();
        assert_eq!(session.step(), ImportStep::Complete);
        assert_eq!(report.imported, 2);
        assert_eq!(session.report(), Some(report));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_running_without_selection_is_a_validation_error() {
        let (path, db) = open_temp("session_no_select");
        let mut session = ImportSession::new();
        assert!(matches!(
            session.run(&db, ImportMode::Merge, ConflictStrategy::Skip, |_, _| {}),
            Err(VaultError::Validation(_))
        ));
        std::fs::remove_file(&path).ok();
    }
}
