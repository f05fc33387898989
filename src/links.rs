//! Relationship store: typed links between two memories, plus free-text
//! comments attached to one memory.
//!
//! Links are symmetric: at most one edge exists per unordered pair, checked
//! against both orderings at insert time. Both tables hold weak references
//! to memories — readers drop rows whose endpoints no longer resolve, and
//! `purge_memory_refs` removes everything touching a memory when the
//! session layer deletes it.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::warn;

use crate::db::VaultDb;
use crate::error::{Result, VaultError};
use crate::types::{Comment, LinkType, Memory, MemoryLink};
use crate::util::prefixed_id;

/// A resolved link plus the memory on the far end.
#[derive(Debug, Clone)]
pub(crate) struct LinkedMemory {
    pub(crate) link: MemoryLink,
    pub(crate) memory: Memory,
}

#[derive(Debug, Clone)]
pub(crate) struct LinkSuggestion {
    pub(crate) memory: Memory,
    pub(crate) score: u32,
    pub(crate) suggested_link_type: LinkType,
}

impl VaultDb {
    // ── Links ────────────────────────────────────────────────────────

    /// Insert a link unless one already exists between the pair in either
    /// direction. Returns `Ok(None)` for the existing-edge case — a soft
    /// fail the caller surfaces as "already linked", not an error.
    pub(crate) fn add_link(
        &self,
        from_id: &str,
        to_id: &str,
        link_type: LinkType,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<MemoryLink>> {
        let existing: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM links
             WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)",
            params![from_id, to_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(None);
        }

        let link = MemoryLink {
            id: prefixed_id("link", now),
            from_memory_id: from_id.to_string(),
            to_memory_id: to_id.to_string(),
            link_type,
            metadata,
            date_created: now,
        };
        let doc = serde_json::to_string(&link)?;
        self.conn()
            .execute(
                "INSERT INTO links (id, from_id, to_id, doc) VALUES (?1, ?2, ?3, ?4)",
                params![link.id, link.from_memory_id, link.to_memory_id, doc],
            )
            .map_err(|e| VaultError::from_write(e, &link.id))?;
        Ok(Some(link))
    }

    pub(crate) fn remove_link(&self, link_id: &str) -> Result<bool> {
        self.conn()
            .execute("DELETE FROM links WHERE id = ?1", params![link_id])?;
        Ok(true)
    }

    /// Every link touching the memory, in either role.
    pub(crate) fn links_for(&self, memory_id: &str) -> Vec<MemoryLink> {
        let mut stmt = match self.conn().prepare(
            "SELECT doc FROM links WHERE from_id = ?1 OR to_id = ?1",
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!("reading links failed: {e}");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map(params![memory_id], |row| row.get::<_, String>(0)) {
            Ok(r) => r,
            Err(e) => {
                warn!("reading links failed: {e}");
                return Vec::new();
            }
        };
        rows.filter_map(|r| r.ok())
            .filter_map(|doc| serde_json::from_str(&doc).ok())
            .collect()
    }

    /// Resolve the far endpoint of each link against the live memory set,
    /// dropping links whose other end no longer exists.
    pub(crate) fn linked_memories(&self, memory_id: &str, all: &[Memory]) -> Vec<LinkedMemory> {
        self.links_for(memory_id)
            .into_iter()
            .filter_map(|link| {
                let other_id = if link.from_memory_id == memory_id {
                    &link.to_memory_id
                } else {
                    &link.from_memory_id
                };
                let memory = all.iter().find(|m| m.id == *other_id)?.clone();
                Some(LinkedMemory { link, memory })
            })
            .collect()
    }

    fn all_links(&self) -> Vec<MemoryLink> {
        let mut stmt = match self.conn().prepare("SELECT doc FROM links") {
            Ok(s) => s,
            Err(e) => {
                warn!("reading links failed: {e}");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(r) => r,
            Err(e) => {
                warn!("reading links failed: {e}");
                return Vec::new();
            }
        };
        rows.filter_map(|r| r.ok())
            .filter_map(|doc| serde_json::from_str(&doc).ok())
            .collect()
    }

    /// Chain `sequence`-typed links into ordered runs, resolved against the
    /// live memory set. Unresolvable ids drop out of each run.
    pub(crate) fn memory_sequences(&self, all: &[Memory]) -> Vec<Vec<Memory>> {
        let sequence_links: Vec<MemoryLink> = self
            .all_links()
            .into_iter()
            .filter(|l| l.link_type == LinkType::Sequence)
            .collect();

        let mut sequences: Vec<Vec<String>> = Vec::new();
        let mut visited: Vec<&str> = Vec::new();

        for link in &sequence_links {
            if visited.contains(&link.id.as_str()) {
                continue;
            }
            let mut run = vec![link.from_memory_id.clone(), link.to_memory_id.clone()];
            visited.push(&link.id);

            let mut changed = true;
            while changed {
                changed = false;
                for other in &sequence_links {
                    if visited.contains(&other.id.as_str()) {
                        continue;
                    }
                    if Some(&other.from_memory_id) == run.last() {
                        run.push(other.to_memory_id.clone());
                        visited.push(&other.id);
                        changed = true;
                    } else if Some(&other.to_memory_id) == run.first() {
                        run.insert(0, other.from_memory_id.clone());
                        visited.push(&other.id);
                        changed = true;
                    }
                }
            }
            sequences.push(run);
        }

        sequences
            .into_iter()
            .map(|run| {
                run.into_iter()
                    .filter_map(|id| all.iter().find(|m| m.id == id).cloned())
                    .collect()
            })
            .collect()
    }

    // ── Comments ─────────────────────────────────────────────────────

    pub(crate) fn add_comment(
        &self,
        memory_id: &str,
        text: &str,
        author: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        let comment = Comment {
            id: prefixed_id("comment", now),
            memory_id: memory_id.to_string(),
            text: text.to_string(),
            author: author.to_string(),
            timestamp: now,
            edited: false,
            edited_at: None,
        };
        let doc = serde_json::to_string(&comment)?;
        self.conn()
            .execute(
                "INSERT INTO comments (id, memory_id, doc) VALUES (?1, ?2, ?3)",
                params![comment.id, comment.memory_id, doc],
            )
            .map_err(|e| VaultError::from_write(e, &comment.id))?;
        Ok(comment)
    }

    pub(crate) fn edit_comment(
        &self,
        comment_id: &str,
        new_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        let doc: String = self
            .conn()
            .query_row(
                "SELECT doc FROM comments WHERE id = ?1",
                params![comment_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    VaultError::NotFound(comment_id.to_string())
                }
                other => VaultError::Sqlite(other),
            })?;
        let mut comment: Comment = serde_json::from_str(&doc)?;
        comment.text = new_text.to_string();
        comment.edited = true;
        comment.edited_at = Some(now);

        let doc = serde_json::to_string(&comment)?;
        self.conn().execute(
            "UPDATE comments SET doc = ?2 WHERE id = ?1",
            params![comment.id, doc],
        )?;
        Ok(comment)
    }

    pub(crate) fn delete_comment(&self, comment_id: &str) -> Result<bool> {
        self.conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
        Ok(true)
    }

    pub(crate) fn comments_for(&self, memory_id: &str) -> Vec<Comment> {
        let mut stmt = match self
            .conn()
            .prepare("SELECT doc FROM comments WHERE memory_id = ?1")
        {
            Ok(s) => s,
            Err(e) => {
                warn!("reading comments failed: {e}");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map(params![memory_id], |row| row.get::<_, String>(0)) {
            Ok(r) => r,
            Err(e) => {
                warn!("reading comments failed: {e}");
                return Vec::new();
            }
        };
        let mut comments: Vec<Comment> = rows
            .filter_map(|r| r.ok())
            .filter_map(|doc| serde_json::from_str(&doc).ok())
            .collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        comments
    }

    pub(crate) fn comment_count(&self, memory_id: &str) -> usize {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM comments WHERE memory_id = ?1",
                params![memory_id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize
    }

    /// Remove every link touching and every comment attached to a memory.
    /// Called on memory deletion so dead ids don't accumulate here.
    pub(crate) fn purge_memory_refs(&self, memory_id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM links WHERE from_id = ?1 OR to_id = ?1",
            params![memory_id],
        )?;
        self.conn().execute(
            "DELETE FROM comments WHERE memory_id = ?1",
            params![memory_id],
        )?;
        Ok(())
    }
}

// ── Link suggestion (pure) ───────────────────────────────────────────────

/// Heuristic link scorer. No storage side effects: score each candidate,
/// keep everything at or above the threshold, return the top five.
///
/// Weights: same-day (±24h on `date_created`) 30, same location 25, each
/// shared person 15, each shared tag 10, same category 10. Threshold 20.
pub(crate) fn suggest_links(memory: &Memory, all: &[Memory]) -> Vec<LinkSuggestion> {
    let mut suggestions: Vec<LinkSuggestion> = Vec::new();

    for other in all {
        if other.id == memory.id {
            continue;
        }

        let mut score = 0u32;
        let mut link_type = LinkType::Related;

        let date_diff = (memory.date_created - other.date_created).num_seconds().abs();
        if date_diff < 24 * 60 * 60 {
            score += 30;
            link_type = LinkType::SameEvent;
        }

        if let (Some(a), Some(b)) = (&memory.location, &other.location) {
            if a.eq_ignore_ascii_case(b) {
                score += 25;
                if link_type == LinkType::Related {
                    link_type = LinkType::SamePlace;
                }
            }
        }

        if let (Some(meta_a), Some(meta_b)) = (&memory.metadata, &other.metadata) {
            let common_people = meta_a
                .people
                .iter()
                .filter(|p| meta_b.people.contains(p))
                .count() as u32;
            if common_people > 0 {
                score += common_people * 15;
                if link_type == LinkType::Related {
                    link_type = LinkType::SamePeople;
                }
            }
        }

        let common_tags = memory
            .tags
            .iter()
            .filter(|t| other.tags.contains(t))
            .count() as u32;
        score += common_tags * 10;

        if memory.category == other.category {
            score += 10;
        }

        if score >= 20 {
            suggestions.push(LinkSuggestion {
                memory: other.clone(),
                score,
                suggested_link_type: link_type,
            });
        }
    }

    suggestions.sort_by(|a, b| b.score.cmp(&a.score));
    suggestions.truncate(5);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{open_temp, sample_memory};
    use crate::types::MemoryMeta;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_at_most_one_link_per_pair() {
        let (path, db) = open_temp("link_pair");
        let first = db
            .add_link("a", "b", LinkType::Related, None, now())
            .unwrap();
        assert!(first.is_some());

        // Same pair, same direction.
        assert!(db.add_link("a", "b", LinkType::Sequence, None, now()).unwrap().is_none());
        // Same pair, reversed direction.
        assert!(db.add_link("b", "a", LinkType::Custom, None, now()).unwrap().is_none());

        assert_eq!(db.links_for("a").len(), 1);
        assert_eq!(db.links_for("b").len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_linked_memories_drops_dangling_endpoints() {
        let (path, db) = open_temp("link_dangling");
        db.add_link("a", "b", LinkType::Related, None, now()).unwrap();
        db.add_link("a", "gone", LinkType::Related, None, now()).unwrap();

        let live = vec![sample_memory("a"), sample_memory("b")];
        let linked = db.linked_memories("a", &live);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].memory.id, "b");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_remove_link() {
        let (path, db) = open_temp("link_remove");
        let link = db
            .add_link("a", "b", LinkType::Related, None, now())
            .unwrap()
            .unwrap();
        assert!(db.remove_link(&link.id).unwrap());
        assert!(db.links_for("a").is_empty());
        // Removing again is fine.
        assert!(db.remove_link(&link.id).unwrap());
        // And the pair can be re-linked now.
        assert!(db.add_link("b", "a", LinkType::Sequence, None, now()).unwrap().is_some());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_memory_sequences_chain_in_order() {
        let (path, db) = open_temp("link_seq");
        db.add_link("a", "b", LinkType::Sequence, None, now()).unwrap();
        db.add_link("b", "c", LinkType::Sequence, None, now()).unwrap();
        // Unrelated non-sequence link must not join the run.
        db.add_link("a", "x", LinkType::Related, None, now()).unwrap();

        let all = vec![
            sample_memory("a"),
            sample_memory("b"),
            sample_memory("c"),
            sample_memory("x"),
        ];
        let sequences = db.memory_sequences(&all);
        assert_eq!(sequences.len(), 1);
        let ids: Vec<&str> = sequences[0].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_comment_lifecycle() {
        let (path, db) = open_temp("comments");
        let c = db.add_comment("m1", "nice shot", "You", now()).unwrap();
        assert!(!c.edited);
        assert_eq!(db.comment_count("m1"), 1);

        let later = now() + chrono::Duration::minutes(5);
        let edited = db.edit_comment(&c.id, "great shot", later).unwrap();
        assert!(edited.edited);
        assert_eq!(edited.edited_at, Some(later));
        assert_eq!(edited.text, "great shot");

        let stored = db.comments_for("m1");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "great shot");

        assert!(db.delete_comment(&c.id).unwrap());
        assert_eq!(db.comment_count("m1"), 0);

        match db.edit_comment("missing", "x", now()) {
            Err(VaultError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_purge_memory_refs() {
        let (path, db) = open_temp("purge");
        db.add_link("m1", "m2", LinkType::Related, None, now()).unwrap();
        db.add_link("m3", "m1", LinkType::Sequence, None, now()).unwrap();
        db.add_link("m2", "m3", LinkType::Related, None, now()).unwrap();
        db.add_comment("m1", "hello", "You", now()).unwrap();
        db.add_comment("m2", "other", "You", now()).unwrap();

        db.purge_memory_refs("m1").unwrap();
        assert!(db.links_for("m1").is_empty());
        assert!(db.comments_for("m1").is_empty());
        // Rows not touching m1 survive.
        assert_eq!(db.links_for("m2").len(), 1);
        assert_eq!(db.comment_count("m2"), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_suggest_links_scoring_and_threshold() {
        let mut target = sample_memory("target");
        target.date_created = now();
        target.location = Some("Lisbon".to_string());
        target.tags = vec!["beach".to_string(), "sunset".to_string()];
        target.metadata = Some(MemoryMeta {
            people: vec!["Alice".to_string()],
            rating: None,
        });

        // Same day + same place + shared person + shared tag + category.
        let mut strong = sample_memory("strong");
        strong.date_created = now() + chrono::Duration::hours(3);
        strong.location = Some("lisbon".to_string());
        strong.tags = vec!["beach".to_string()];
        strong.metadata = Some(MemoryMeta {
            people: vec!["Alice".to_string()],
            rating: None,
        });

        // Category only: 10 points, below threshold.
        let mut weak = sample_memory("weak");
        weak.date_created = now() - chrono::Duration::days(400);
        weak.tags = vec![];

        // Same place only, different day: 25 + category 10 = 35.
        let mut place_only = sample_memory("place");
        place_only.date_created = now() - chrono::Duration::days(30);
        place_only.location = Some("Lisbon".to_string());
        place_only.tags = vec![];

        let all = vec![target.clone(), strong, weak, place_only];
        let suggestions = suggest_links(&target, &all);

        let ids: Vec<&str> = suggestions.iter().map(|s| s.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["strong", "place"]);
        assert_eq!(suggestions[0].score, 30 + 25 + 15 + 10 + 10);
        assert_eq!(suggestions[0].suggested_link_type, LinkType::SameEvent);
        assert_eq!(suggestions[1].suggested_link_type, LinkType::SamePlace);
    }

    #[test]
    fn test_suggest_links_caps_at_five() {
        let mut target = sample_memory("target");
        target.date_created = now();
        let mut all = vec![target.clone()];
        for i in 0..8i64 {
            let mut m = sample_memory(&format!("m{i}"));
            m.date_created = now() + chrono::Duration::minutes(i);
            all.push(m);
        }
        let suggestions = suggest_links(&target, &all);
        assert_eq!(suggestions.len(), 5);
    }
}
