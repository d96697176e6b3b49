//! Per-model `vec0` virtual tables (sqlite-vec) for approximate nearest-
//! neighbor search, fixed dimension per model (spec.md §4.1, §3 invariant
//! "a memory has at most one embedding per active model").
//!
//! Grounded on `pagi-core::knowledge::vector_store`'s `VectorStore` trait
//! shape, swapped from an external Qdrant sidecar to the in-process sqlite
//! vector virtual table the storage engine already owns.

use rusqlite::params;

use crate::entities::MemoryEmbedding;
use crate::error::StorageResult;
use crate::memories::vector_to_blob;
use crate::store::Store;

fn table_name(model: &str) -> String {
    let sanitized: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("vec_memories_{sanitized}")
}

impl Store {
    /// Creates the per-model vector table the first time an embedding for
    /// that model is indexed. Idempotent: `CREATE VIRTUAL TABLE IF NOT EXISTS`.
    pub fn ensure_vector_table(&self, model: &str, dimension: usize) -> StorageResult<()> {
        let table = table_name(model);
        self.write(|tx| {
            tx.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(embedding float[{dimension}]);"
            ))?;
            Ok(())
        })
    }

    /// Indexes (or re-indexes) one memory's embedding into the model's vector
    /// table, keyed by the `memory_embedding_map.row_id` so the vector table
    /// rowid maps back to a memory id without duplicating the vector data.
    pub fn index_embedding(&self, embedding: &MemoryEmbedding) -> StorageResult<()> {
        self.ensure_vector_table(&embedding.model, embedding.dimension)?;
        let table = table_name(&embedding.model);
        let row_id: i64 = {
            let conn = self.reader()?;
            conn.query_row(
                "SELECT row_id FROM memory_embedding_map WHERE embedding_id = ?1",
                params![embedding.id.to_string()],
                |r| r.get(0),
            )?
        };
        self.write(|tx| {
            tx.execute(
                &format!("DELETE FROM {table} WHERE rowid = ?1"),
                params![row_id],
            )?;
            tx.execute(
                &format!("INSERT INTO {table}(rowid, embedding) VALUES (?1, ?2)"),
                params![row_id, vector_to_blob(&embedding.vector)],
            )?;
            Ok(())
        })
    }

    /// Approximate k-nearest-neighbor query against the model's vector table.
    /// Returns `(memory_id, distance)` pairs ordered nearest-first.
    pub fn vector_search(
        &self,
        model: &str,
        query: &[f32],
        k: usize,
    ) -> StorageResult<Vec<(uuid::Uuid, f64)>> {
        let table = table_name(model);
        let conn = self.reader()?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                params![table],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, distance FROM {table} WHERE embedding MATCH ?1 AND k = ?2 ORDER BY distance"
        ))?;
        let rows: Vec<(i64, f64)> = stmt
            .query_map(params![vector_to_blob(query), k as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (row_id, distance) in rows {
            let memory_id: Option<String> = conn
                .query_row(
                    "SELECT memory_id FROM memory_embedding_map WHERE row_id = ?1",
                    params![row_id],
                    |r| r.get(0),
                )
                .ok();
            if let Some(id) = memory_id.and_then(|s| uuid::Uuid::parse_str(&s).ok()) {
                out.push((id, distance));
            }
        }
        Ok(out)
    }
}
