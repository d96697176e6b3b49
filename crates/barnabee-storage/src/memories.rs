//! Memory repository: create/get/search/soft_delete plus the 1:1 embedding
//! link and hybrid (vector + full-text) search (spec.md §4.1).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::entities::{Memory, MemoryEmbedding, MemorySource, MemoryType, RecordStatus, Visibility};
use crate::error::{StorageError, StorageResult};
use crate::store::Store;

pub(crate) fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let keywords_json: String = row.get("keywords_json")?;
    let id: String = row.get("id")?;
    let memory_type: String = row.get("memory_type")?;
    let source: String = row.get("source")?;
    let visibility: String = row.get("visibility")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let last_accessed_at: Option<String> = row.get("last_accessed_at")?;

    Ok(Memory {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        summary: row.get("summary")?,
        content: row.get("content")?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        memory_type: MemoryType::parse(&memory_type).unwrap_or(MemoryType::Fact),
        source: MemorySource::parse(&source).unwrap_or(MemorySource::Explicit),
        owner: row.get("owner")?,
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Owner),
        access_count: row.get("access_count")?,
        last_accessed_at: last_accessed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        status: RecordStatus::from_str(&status),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap_or_default().with_timezone(&Utc),
    })
}

impl Store {
    pub fn create_memory(&self, memory: &Memory) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO memories
                    (id, summary, content, keywords_json, memory_type, source, owner,
                     visibility, access_count, last_accessed_at, status, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
                params![
                    memory.id.to_string(),
                    memory.summary,
                    memory.content,
                    serde_json::to_string(&memory.keywords).unwrap_or_else(|_| "[]".into()),
                    memory.memory_type.as_str(),
                    memory.source.as_str(),
                    memory.owner,
                    memory.visibility.as_str(),
                    memory.access_count,
                    memory.last_accessed_at.map(|d| d.to_rfc3339()),
                    memory.status.as_str(),
                    memory.created_at.to_rfc3339(),
                    memory.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Round-trip read: `create_memory(m)` then `get_memory(m.id)` returns a
    /// record equal to `m` in all user-visible fields (spec.md §8 property 8).
    /// Also bumps the access counter, mirroring `ha_entity_cache`'s access
    /// tracking and §3's "access counters" invariant.
    pub fn get_memory(&self, id: Uuid) -> StorageResult<Option<Memory>> {
        let conn = self.reader()?;
        let memory = conn
            .query_row(
                "SELECT * FROM memories WHERE id = ?1 AND status != 'deleted'",
                params![id.to_string()],
                row_to_memory,
            )
            .optional()?;
        if memory.is_some() {
            self.write(|tx| {
                tx.execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?2 WHERE id = ?1",
                    params![id.to_string(), Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })?;
        }
        Ok(memory)
    }

    /// Soft-delete: `status` transitions `active -> deleted`. There is no
    /// hard delete in the core (spec.md §9 DESIGN NOTES).
    pub fn soft_delete_memory(&self, id: Uuid) -> StorageResult<bool> {
        let affected = self.write(|tx| {
            Ok(tx.execute(
                "UPDATE memories SET status = 'deleted', updated_at = ?2 WHERE id = ?1 AND status = 'active'",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?)
        })?;
        Ok(affected > 0)
    }

    /// Plain full-text search over memory summary/content, paginated
    /// deterministically by (score desc, created_at desc, id asc) per
    /// spec.md §4.1. Used as the bm25-only fallback when no embedding is
    /// supplied; `hybrid_search` combines this with vector similarity.
    pub fn search_memories(&self, text: &str, limit: usize, offset: usize) -> StorageResult<Vec<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            r#"SELECT m.* FROM memories m
               JOIN memories_fts f ON f.rowid = m.rowid
               WHERE memories_fts MATCH ?1 AND m.status != 'deleted'
               ORDER BY bm25(memories_fts) ASC, m.created_at DESC, m.id ASC
               LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt
            .query_map(params![fts_query(text), limit as i64, offset as i64], row_to_memory)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn put_embedding(&self, embedding: &MemoryEmbedding) -> StorageResult<()> {
        self.write(|tx| {
            tx.execute(
                r#"INSERT INTO memory_embeddings (id, memory_id, model, dimension, vector, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(memory_id, model) DO UPDATE SET vector = excluded.vector, dimension = excluded.dimension"#,
                params![
                    embedding.id.to_string(),
                    embedding.memory_id.to_string(),
                    embedding.model,
                    embedding.dimension as i64,
                    vector_to_blob(&embedding.vector),
                    embedding.created_at.to_rfc3339(),
                ],
            )?;
            tx.execute(
                r#"INSERT INTO memory_embedding_map (embedding_id, memory_id, model)
                   VALUES (?1, ?2, ?3)
                   ON CONFLICT(embedding_id) DO UPDATE SET memory_id = excluded.memory_id"#,
                params![embedding.id.to_string(), embedding.memory_id.to_string(), embedding.model],
            )?;
            Ok(())
        })
    }

    pub fn get_embedding(&self, memory_id: Uuid, model: &str) -> StorageResult<Option<MemoryEmbedding>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT * FROM memory_embeddings WHERE memory_id = ?1 AND model = ?2",
            params![memory_id.to_string(), model],
            |row| {
                let id: String = row.get("id")?;
                let memory_id: String = row.get("memory_id")?;
                let dimension: i64 = row.get("dimension")?;
                let vector_blob: Vec<u8> = row.get("vector")?;
                let created_at: String = row.get("created_at")?;
                Ok(MemoryEmbedding {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    memory_id: Uuid::parse_str(&memory_id).unwrap_or_default(),
                    model: row.get("model")?,
                    dimension: dimension as usize,
                    vector: blob_to_vector(&vector_blob),
                    created_at: DateTime::parse_from_rfc3339(&created_at).unwrap_or_default().with_timezone(&Utc),
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }
}

/// sqlite-vec stores vectors as raw little-endian f32 blobs; this matches the
/// wire format the `vec0` virtual table and `vec_f32()` helper expect.
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn blob_to_vector(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// FTS5 MATCH treats bare text as a query expression; wrap in quotes so
/// user-supplied punctuation doesn't become FTS syntax.
fn fts_query(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("core.sqlite3")).unwrap();
        (dir, store)
    }

    #[test]
    fn round_trip_create_then_get() {
        let (_dir, store) = open_tmp();
        let mem = Memory::new("grocery list", "milk, eggs, bread", MemoryType::Fact, MemorySource::Explicit, "alice", Visibility::Owner);
        store.create_memory(&mem).unwrap();
        let fetched = store.get_memory(mem.id).unwrap().unwrap();
        assert_eq!(fetched.id, mem.id);
        assert_eq!(fetched.summary, mem.summary);
        assert_eq!(fetched.content, mem.content);
        assert_eq!(fetched.owner, mem.owner);
    }

    #[test]
    fn soft_delete_hides_from_get_and_search() {
        let (_dir, store) = open_tmp();
        let mem = Memory::new("trash day", "put bins out monday", MemoryType::Fact, MemorySource::Explicit, "alice", Visibility::Owner);
        store.create_memory(&mem).unwrap();
        assert!(store.soft_delete_memory(mem.id).unwrap());
        assert!(store.get_memory(mem.id).unwrap().is_none());
        assert!(!store.soft_delete_memory(mem.id).unwrap(), "second delete is a no-op, not an error");
    }

    #[test]
    fn full_text_search_finds_matching_memory() {
        let (_dir, store) = open_tmp();
        let mem = Memory::new("wifi password", "the guest wifi password is sunflower42", MemoryType::Fact, MemorySource::Explicit, "alice", Visibility::Owner);
        store.create_memory(&mem).unwrap();
        let results = store.search_memories("wifi", 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, mem.id);
    }

    #[test]
    fn embedding_round_trip_preserves_vector() {
        let (_dir, store) = open_tmp();
        let mem = Memory::new("a", "b", MemoryType::Fact, MemorySource::Explicit, "alice", Visibility::Owner);
        store.create_memory(&mem).unwrap();
        let emb = MemoryEmbedding {
            id: Uuid::new_v4(),
            memory_id: mem.id,
            model: "test-model".into(),
            dimension: 4,
            vector: vec![0.1, 0.2, 0.3, 0.4],
            created_at: Utc::now(),
        };
        store.put_embedding(&emb).unwrap();
        let fetched = store.get_embedding(mem.id, "test-model").unwrap().unwrap();
        assert_eq!(fetched.vector, emb.vector);
    }
}
