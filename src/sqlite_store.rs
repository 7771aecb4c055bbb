//! SQLite-backed [`IndexStore`] implementation.
//!
//! The whole index lives in one SQLite file with two tables:
//!
//! - `index_meta` — a single row with the embedding model, dimensionality,
//!   passage count and save time
//! - `passages` — one row per passage, vector stored as a little-endian
//!   `f32` BLOB, `seq` preserving insertion order
//!
//! [`save`](IndexStore::save) creates the schema and rewrites every row in
//! one transaction. A file without the schema therefore means no save ever
//! committed, and loads as absent. A file SQLite cannot open at all is moved
//! aside to `<name>.corrupt-<timestamp>` by the next save, which then starts
//! from an empty database.

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::{IndexEntry, VectorIndex};
use docqa_core::models::Passage;
use docqa_core::store::IndexStore;
use docqa_core::{Error, Result};

use crate::db;

const CREATE_META: &str = r#"
    CREATE TABLE IF NOT EXISTS index_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        model TEXT NOT NULL,
        dims INTEGER NOT NULL,
        passage_count INTEGER NOT NULL,
        saved_at TEXT NOT NULL
    )
"#;

const CREATE_PASSAGES: &str = r#"
    CREATE TABLE IF NOT EXISTS passages (
        seq INTEGER PRIMARY KEY,
        id TEXT NOT NULL,
        source TEXT NOT NULL,
        page INTEGER NOT NULL,
        chunk_index INTEGER NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        text TEXT NOT NULL,
        vector BLOB NOT NULL
    )
"#;

/// SQLite result codes for a file that is not, or no longer, a database.
const SQLITE_CORRUPT: &str = "11";
const SQLITE_NOTADB: &str = "26";

fn is_unusable_file(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some(SQLITE_CORRUPT) | Some(SQLITE_NOTADB))
        }
        _ => false,
    })
}

pub struct SqliteIndexStore {
    path: PathBuf,
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: Mutex::new(None),
        }
    }

    async fn pool(&self) -> anyhow::Result<SqlitePool> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = db::connect(&self.path).await?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Close the underlying connection pool, if one was opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.path.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Move an unopenable index file and its WAL sidecars out of the way.
    async fn quarantine(&self) -> std::io::Result<PathBuf> {
        self.close().await;

        let target = self.with_suffix(&format!(
            ".corrupt-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        tokio::fs::rename(&self.path, &target).await?;

        for sidecar in ["-wal", "-shm"] {
            match tokio::fs::remove_file(self.with_suffix(sidecar)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(target)
    }

    async fn try_save(&self, index: &VectorIndex) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        self.save_inner(&pool, index).await?;
        Ok(())
    }

    async fn load_inner(&self, pool: &SqlitePool) -> std::result::Result<Option<VectorIndex>, String> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('index_meta', 'passages')",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| e.to_string())?;

        match tables.len() {
            0 => return Ok(None),
            2 => {}
            _ => return Err(format!("incomplete schema: found only {:?}", tables)),
        }

        let meta = sqlx::query("SELECT model, dims, passage_count FROM index_meta WHERE id = 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "missing index metadata".to_string())?;

        let model: String = meta.try_get("model").map_err(|e| e.to_string())?;
        let dims: i64 = meta.try_get("dims").map_err(|e| e.to_string())?;
        let expected: i64 = meta.try_get("passage_count").map_err(|e| e.to_string())?;
        let dims = usize::try_from(dims).map_err(|_| format!("invalid dims {}", dims))?;

        let rows = sqlx::query(
            r#"
            SELECT id, source, page, chunk_index, start_char, end_char, text, vector
            FROM passages
            ORDER BY seq
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(|e| e.to_string())?;

        if rows.len() as i64 != expected {
            return Err(format!(
                "metadata records {} passages but {} are stored",
                expected,
                rows.len()
            ));
        }

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(|e| e.to_string())?;
            let blob: Vec<u8> = row.try_get("vector").map_err(|e| e.to_string())?;
            let vector = blob_to_vec(&blob)
                .ok_or_else(|| format!("passage {} has a {}-byte vector blob", id, blob.len()))?;
            let page: i64 = row.try_get("page").map_err(|e| e.to_string())?;
            let chunk_index: i64 = row.try_get("chunk_index").map_err(|e| e.to_string())?;
            let start_char: i64 = row.try_get("start_char").map_err(|e| e.to_string())?;
            let end_char: i64 = row.try_get("end_char").map_err(|e| e.to_string())?;

            entries.push(IndexEntry {
                passage: Passage {
                    id,
                    text: row.try_get("text").map_err(|e| e.to_string())?,
                    source: row.try_get("source").map_err(|e| e.to_string())?,
                    page: u32::try_from(page).map_err(|_| format!("invalid page {}", page))?,
                    chunk_index: u32::try_from(chunk_index)
                        .map_err(|_| format!("invalid chunk index {}", chunk_index))?,
                    start_char: usize::try_from(start_char)
                        .map_err(|_| format!("invalid offset {}", start_char))?,
                    end_char: usize::try_from(end_char)
                        .map_err(|_| format!("invalid offset {}", end_char))?,
                },
                vector,
            });
        }

        VectorIndex::from_entries(model, dims, entries)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    async fn save_inner(&self, pool: &SqlitePool, index: &VectorIndex) -> sqlx::Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(CREATE_META).execute(&mut *tx).await?;
        sqlx::query(CREATE_PASSAGES).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM passages").execute(&mut *tx).await?;

        for (seq, entry) in index.entries().iter().enumerate() {
            let p = &entry.passage;
            sqlx::query(
                r#"
                INSERT INTO passages (seq, id, source, page, chunk_index, start_char, end_char, text, vector)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(seq as i64)
            .bind(&p.id)
            .bind(&p.source)
            .bind(p.page as i64)
            .bind(p.chunk_index as i64)
            .bind(p.start_char as i64)
            .bind(p.end_char as i64)
            .bind(&p.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO index_meta (id, model, dims, passage_count, saved_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                passage_count = excluded.passage_count,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(index.model())
        .bind(index.dims() as i64)
        .bind(index.len() as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn load(&self) -> Result<Option<VectorIndex>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let pool = self
            .pool()
            .await
            .map_err(|e| Error::IndexCorrupt(format!("{}: {:#}", self.path.display(), e)))?;
        self.load_inner(&pool)
            .await
            .map_err(|e| Error::IndexCorrupt(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, index: &VectorIndex) -> Result<()> {
        let result = match self.try_save(index).await {
            Err(e) if is_unusable_file(&e) => {
                let moved = self.quarantine().await?;
                let reason = format!("{:#}", e);
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %moved.display(),
                    error = %reason,
                    "index file is not a usable database; moved aside"
                );
                self.try_save(index).await
            }
            other => other,
        };
        result.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to save index to {}: {:#}",
                self.path.display(),
                e
            )))
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::embedding::HashEmbedder;
    use tempfile::TempDir;

    fn sample_index(texts: &[&str]) -> VectorIndex {
        let embedder = HashEmbedder::new(32);
        let mut index = VectorIndex::new("hash", 32);
        index
            .insert(texts.iter().enumerate().map(|(i, t)| IndexEntry {
                passage: Passage {
                    id: format!("id-{}", i),
                    text: t.to_string(),
                    source: "doc.pdf".to_string(),
                    page: 1 + i as u32 / 2,
                    chunk_index: i as u32,
                    start_char: i * 10,
                    end_char: i * 10 + t.chars().count(),
                },
                vector: embedder.embed_one(t),
            }))
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexStore::new(tmp.path().join("index.sqlite"));
        assert!(store.load().await.unwrap().is_none());
        assert!(!tmp.path().join("index.sqlite").exists());
    }

    #[tokio::test]
    async fn test_empty_file_loads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, b"").unwrap();
        let store = SqliteIndexStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_search_results() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/index.sqlite");
        let index = sample_index(&[
            "pumps need priming",
            "hens lay eggs",
            "seeds stay dry",
            "valves under the sink",
        ]);

        let store = SqliteIndexStore::new(&path);
        store.save(&index).await.unwrap();
        store.close().await;

        let reopened = SqliteIndexStore::new(&path);
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded, index);

        let q = HashEmbedder::new(32).embed_one("where do hens lay eggs");
        assert_eq!(loaded.search(&q, 3), index.search(&q, 3));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexStore::new(tmp.path().join("index.sqlite"));
        store.save(&sample_index(&["a", "b", "c"])).await.unwrap();
        store.save(&sample_index(&["d"])).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].passage.text, "d");
    }

    #[tokio::test]
    async fn test_empty_index_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexStore::new(tmp.path().join("index.sqlite"));
        store.save(&VectorIndex::new("hash", 8)).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dims(), 8);
    }

    #[tokio::test]
    async fn test_garbage_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, vec![0xABu8; 4096]).unwrap();
        let err = SqliteIndexStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[tokio::test]
    async fn test_count_mismatch_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let store = SqliteIndexStore::new(&path);
        store.save(&sample_index(&["a", "b"])).await.unwrap();
        sqlx::query("DELETE FROM passages WHERE seq = 0")
            .execute(&store.pool().await.unwrap())
            .await
            .unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[tokio::test]
    async fn test_bad_vector_blob_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexStore::new(tmp.path().join("index.sqlite"));
        store.save(&sample_index(&["a"])).await.unwrap();
        sqlx::query("UPDATE passages SET vector = x'010203'")
            .execute(&store.pool().await.unwrap())
            .await
            .unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[tokio::test]
    async fn test_save_over_garbage_file_moves_it_aside() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, vec![0xABu8; 4096]).unwrap();

        let store = SqliteIndexStore::new(&path);
        assert!(matches!(store.load().await, Err(Error::IndexCorrupt(_))));

        store.save(&sample_index(&["a", "b"])).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);

        let moved: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("index.sqlite.corrupt-"))
            .collect();
        assert_eq!(moved.len(), 1);
        let kept = std::fs::read(tmp.path().join(&moved[0])).unwrap();
        assert_eq!(kept, vec![0xABu8; 4096]);
    }
}
