//! Schema migrations. A `schema_version` table records applied migrations;
//! migrations are idempotent and ordered by integer version (spec.md §4.1).
//!
//! Grounded on `pagi-core::knowledge::store`'s per-slot tree initialization and
//! `pagi-mimir::storage::MeetingStorage::init()`, generalized from a sled
//! tree-per-slot layout to ordered SQL migrations against one sqlite file.

use rusqlite::Connection;

use crate::error::{StorageError, StorageResult};

/// One migration: applying it twice must have the same effect as applying it
/// once (spec.md §8 property 9).
struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core entity tables",
        sql: r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                content TEXT NOT NULL,
                keywords_json TEXT NOT NULL DEFAULT '[]',
                memory_type TEXT NOT NULL,
                source TEXT NOT NULL,
                owner TEXT NOT NULL,
                visibility TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed_at TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at);
            CREATE INDEX IF NOT EXISTS idx_memories_owner ON memories(owner);
            CREATE INDEX IF NOT EXISTS idx_memories_status ON memories(status);

            CREATE TABLE IF NOT EXISTS memory_embeddings (
                id TEXT PRIMARY KEY,
                memory_id TEXT NOT NULL REFERENCES memories(id),
                model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(memory_id, model)
            );

            CREATE TABLE IF NOT EXISTS memory_embedding_map (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                embedding_id TEXT NOT NULL UNIQUE,
                memory_id TEXT NOT NULL,
                model TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                summary, content, content='memories', content_rowid='rowid'
            );
        "#,
    },
    Migration {
        version: 2,
        description: "conversations and turns",
        sql: r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_device ON conversations(device_id);

            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                intent TEXT,
                confidence REAL,
                entities_json TEXT NOT NULL DEFAULT '{}',
                latency_ms INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, created_at);
        "#,
    },
    Migration {
        version: 3,
        description: "entity mirror snapshot + aliases",
        sql: r#"
            CREATE TABLE IF NOT EXISTS ha_entity_cache (
                entity_id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                state TEXT NOT NULL,
                attributes_json TEXT NOT NULL DEFAULT '{}',
                friendly_name TEXT NOT NULL,
                device_class TEXT,
                area TEXT,
                keywords_json TEXT NOT NULL DEFAULT '[]',
                last_changed TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_ha_entity_domain ON ha_entity_cache(domain);
            CREATE INDEX IF NOT EXISTS idx_ha_entity_area ON ha_entity_cache(area);

            CREATE TABLE IF NOT EXISTS entity_aliases (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL REFERENCES ha_entity_cache(entity_id),
                alias TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(entity_id, alias)
            );
            CREATE INDEX IF NOT EXISTS idx_entity_aliases_alias ON entity_aliases(alias);
        "#,
    },
    Migration {
        version: 4,
        description: "signals, improvements, golden cases",
        sql: r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                utterance TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                context_json TEXT NOT NULL DEFAULT '{}',
                expected_outcome TEXT,
                actual_outcome TEXT,
                stage_reached TEXT,
                confidence REAL,
                processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_processed ON signals(processed);
            CREATE INDEX IF NOT EXISTS idx_signals_kind ON signals(kind);

            CREATE TABLE IF NOT EXISTS pending_improvements (
                id TEXT PRIMARY KEY,
                improvement_type TEXT NOT NULL,
                tier INTEGER NOT NULL,
                target TEXT NOT NULL,
                current_value_json TEXT,
                proposed_value_json TEXT NOT NULL,
                rationale TEXT NOT NULL,
                contributing_signal_ids_json TEXT NOT NULL DEFAULT '[]',
                source TEXT NOT NULL,
                shadow_test_passed INTEGER,
                shadow_results_json TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                monitoring_start TEXT,
                monitoring_end TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_improvements_status ON pending_improvements(status);

            CREATE TABLE IF NOT EXISTS improvement_backups (
                id TEXT PRIMARY KEY,
                improvement_id TEXT NOT NULL REFERENCES pending_improvements(id),
                target TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                discarded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS improvement_audit (
                id TEXT PRIMARY KEY,
                improvement_id TEXT NOT NULL REFERENCES pending_improvements(id),
                event TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS golden_cases (
                id TEXT PRIMARY KEY,
                utterance TEXT NOT NULL,
                expected_intent TEXT NOT NULL,
                expected_entities_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 5,
        description: "operational logs and training examples",
        sql: r#"
            CREATE TABLE IF NOT EXISTS operational_logs (
                id TEXT PRIMARY KEY,
                component TEXT NOT NULL,
                trace_id TEXT,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                context_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_operational_logs_created_at ON operational_logs(created_at);

            CREATE TABLE IF NOT EXISTS training_examples (
                id TEXT PRIMARY KEY,
                intent TEXT NOT NULL,
                utterance TEXT NOT NULL,
                embedding_ref TEXT,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_training_examples_intent ON training_examples(intent);
        "#,
    },
    Migration {
        version: 6,
        description: "meetings full-text mirror",
        sql: r#"
            CREATE TABLE IF NOT EXISTS meetings (
                id TEXT PRIMARY KEY,
                memory_id TEXT REFERENCES memories(id),
                title TEXT NOT NULL,
                transcript TEXT NOT NULL DEFAULT '',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS meetings_fts USING fts5(
                title, transcript, content='meetings', content_rowid='rowid'
            );
        "#,
    },
];

/// Insert/update/delete triggers keeping `memories_fts`/`meetings_fts` in sync
/// with their content tables (spec.md §6). Kept separate from table creation
/// so they can be re-applied idempotently without touching table DDL.
const FTS_TRIGGERS_MEMORIES: &str = r#"
    CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
        INSERT INTO memories_fts(rowid, summary, content) VALUES (new.rowid, new.summary, new.content);
    END;
    CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
        INSERT INTO memories_fts(memories_fts, rowid, summary, content) VALUES('delete', old.rowid, old.summary, old.content);
    END;
    CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
        INSERT INTO memories_fts(memories_fts, rowid, summary, content) VALUES('delete', old.rowid, old.summary, old.content);
        INSERT INTO memories_fts(rowid, summary, content) VALUES (new.rowid, new.summary, new.content);
    END;
"#;

const FTS_TRIGGERS_MEETINGS: &str = r#"
    CREATE TRIGGER IF NOT EXISTS meetings_ai AFTER INSERT ON meetings BEGIN
        INSERT INTO meetings_fts(rowid, title, transcript) VALUES (new.rowid, new.title, new.transcript);
    END;
    CREATE TRIGGER IF NOT EXISTS meetings_ad AFTER DELETE ON meetings BEGIN
        INSERT INTO meetings_fts(meetings_fts, rowid, title, transcript) VALUES('delete', old.rowid, old.title, old.transcript);
    END;
    CREATE TRIGGER IF NOT EXISTS meetings_au AFTER UPDATE ON meetings BEGIN
        INSERT INTO meetings_fts(meetings_fts, rowid, title, transcript) VALUES('delete', old.rowid, old.title, old.transcript);
        INSERT INTO meetings_fts(rowid, title, transcript) VALUES (new.rowid, new.title, new.transcript);
    END;
"#;

/// Applies all migrations above the connection's current `schema_version` in
/// order, inside one transaction per migration. Safe to call on every boot.
pub fn run_migrations(conn: &mut Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);",
    )?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StorageError::Migration(migration.version, e))?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| StorageError::Migration(migration.version, e))?;
        tx.commit()?;
        tracing::info!(version = migration.version, description = migration.description, "applied migration");
    }

    // Triggers are separate from table creation so they can be reapplied even
    // if a future migration drops and recreates them; idempotent via IF NOT EXISTS.
    conn.execute_batch(FTS_TRIGGERS_MEMORIES)?;
    conn.execute_batch(FTS_TRIGGERS_MEETINGS)?;

    Ok(())
}

/// Target schema version after applying every migration above. Used by
/// `migrate <path> <N>` CLI subcommand validation.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
