//! Hybrid search: `wα · cos_sim + wβ · bm25_norm`, bm25 normalized to [0,1] by
//! clamping the raw FTS5 score to a fixed baseline of -25..0 → 1..0 (spec.md
//! §4.1). Deterministic: re-running on an unchanged store yields the same
//! order (spec.md §8 property 7) because ties are broken by
//! (score desc, created_at desc, id asc).

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::entities::Memory;
use crate::error::StorageResult;
use crate::memories::row_to_memory;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct HybridResult {
    pub memory: Memory,
    pub score: f64,
    pub cos_sim: f64,
    pub bm25_norm: f64,
}

/// Raw bm25 scores below this are treated as maximally relevant; FTS5's
/// `bm25()` is unbounded below zero in principle, but in practice a
/// household-scale memory store never produces scores past this floor.
const BM25_FLOOR: f64 = -25.0;

fn normalize_bm25(raw: f64) -> f64 {
    (raw.clamp(BM25_FLOOR, 0.0) / BM25_FLOOR).clamp(0.0, 1.0)
}

impl Store {
    /// Returns the top-`k` memories ranked by the hybrid score. `embedding`
    /// and `model` are optional; omitting them degrades gracefully to a
    /// pure-bm25 ranking (wα is ignored, matching §7's graceful-degradation
    /// policy when an embedding provider is unavailable).
    pub fn hybrid_search(
        &self,
        text: &str,
        embedding: Option<(&str, &[f32])>,
        k: usize,
        w_alpha: f64,
        w_beta: f64,
    ) -> StorageResult<Vec<HybridResult>> {
        let conn = self.reader()?;

        let mut bm25_scores: HashMap<Uuid, f64> = HashMap::new();
        if !text.trim().is_empty() {
            let mut stmt = conn.prepare(
                r#"SELECT m.id, bm25(memories_fts) AS raw FROM memories m
                   JOIN memories_fts f ON f.rowid = m.rowid
                   WHERE memories_fts MATCH ?1 AND m.status != 'deleted'
                   LIMIT 200"#,
            )?;
            let query = format!("\"{}\"", text.replace('"', "\"\""));
            let rows = stmt.query_map(params![query], |row| {
                let id: String = row.get(0)?;
                let raw: f64 = row.get(1)?;
                Ok((id, raw))
            })?;
            for row in rows {
                let (id, raw) = row?;
                if let Ok(uuid) = Uuid::parse_str(&id) {
                    bm25_scores.insert(uuid, normalize_bm25(raw));
                }
            }
        }

        let mut cos_scores: HashMap<Uuid, f64> = HashMap::new();
        if let Some((model, query_vec)) = embedding {
            for (id, distance) in self.vector_search(model, query_vec, k.max(50))? {
                // sqlite-vec's default metric is squared L2 on raw vectors;
                // for unit-normalized embeddings, L2^2 = 2 - 2*cos_sim.
                let cos_sim = (1.0 - distance / 2.0).clamp(-1.0, 1.0);
                cos_scores.insert(id, cos_sim);
            }
        }

        let mut candidate_ids: Vec<Uuid> = bm25_scores.keys().chain(cos_scores.keys()).copied().collect();
        candidate_ids.sort();
        candidate_ids.dedup();

        let mut results = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let memory = match conn
                .query_row(
                    "SELECT * FROM memories WHERE id = ?1 AND status != 'deleted'",
                    params![id.to_string()],
                    row_to_memory,
                )
                .optional()?
            {
                Some(m) => m,
                None => continue,
            };
            let bm25_norm = *bm25_scores.get(&id).unwrap_or(&0.0);
            let cos_sim = *cos_scores.get(&id).unwrap_or(&0.0);
            let score = w_alpha * cos_sim + w_beta * bm25_norm;
            results.push(HybridResult { memory, score, cos_sim, bm25_norm });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MemoryEmbedding, MemorySource, MemoryType, Visibility};
    use chrono::Utc;

    #[test]
    fn bm25_normalization_is_bounded() {
        assert_eq!(normalize_bm25(-25.0), 1.0);
        assert_eq!(normalize_bm25(0.0), 0.0);
        assert_eq!(normalize_bm25(-100.0), 1.0);
        assert_eq!(normalize_bm25(5.0), 0.0);
    }

    #[test]
    fn hybrid_search_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("core.sqlite3")).unwrap();
        for (summary, vec) in [("kitchen light", vec![1.0_f32, 0.0, 0.0]), ("bedroom lamp", vec![0.9_f32, 0.1, 0.0])] {
            let mem = Memory::new(summary, summary, MemoryType::Fact, MemorySource::Explicit, "alice", Visibility::Owner);
            store.create_memory(&mem).unwrap();
            let emb = MemoryEmbedding { id: Uuid::new_v4(), memory_id: mem.id, model: "m1".into(), dimension: 3, vector: vec, created_at: Utc::now() };
            store.put_embedding(&emb).unwrap();
            store.index_embedding(&emb).unwrap();
        }
        let q = vec![1.0_f32, 0.0, 0.0];
        let first = store.hybrid_search("light", Some(("m1", &q)), 5, 0.6, 0.4).unwrap();
        let second = store.hybrid_search("light", Some(("m1", &q)), 5, 0.6, 0.4).unwrap();
        let first_ids: Vec<_> = first.iter().map(|r| r.memory.id).collect();
        let second_ids: Vec<_> = second.iter().map(|r| r.memory.id).collect();
        assert_eq!(first_ids, second_ids);
        assert!(!first_ids.is_empty());
    }
}
