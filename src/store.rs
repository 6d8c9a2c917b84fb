//! Vector store capability: the [`VectorStore`] trait and its two backends.
//!
//! - **flat** — a single JSON file holding `(chunk, embedding)` records with
//!   brute-force cosine search. Zero infrastructure; suits small corpora and
//!   offline runs.
//! - **sqlite** — chunk and vector-BLOB tables in a WAL-mode SQLite file,
//!   cosine computed in Rust over the stored blobs. Writes are staged in a
//!   single transaction committed by [`persist`]; an aborted rebuild rolls
//!   back and the previous index bytes stay intact.
//!
//! Both backends normalize to one canonical score polarity at this boundary:
//! cosine similarity, higher = better. The deduplicator never sees a
//! distance-flavored score. Hits are returned in a deterministic order
//! (similarity desc, then chunk id) so identical queries against an
//! unchanged index produce identical output.
//!
//! Switching backends requires a full rebuild; the builder clears the target
//! store before writing so backends never mix old and new embeddings.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, RetrievalHit, SourceType};

/// Capability interface over a persisted vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Insert or replace one chunk and its embedding.
    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()>;

    /// Up to `k` hits in canonical order: similarity desc, chunk id asc.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalHit>>;

    /// Remove every chunk and embedding. Rebuilds are always total
    /// replacement.
    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Flush buffered writes to durable storage. Called by the builder
    /// before the manifest is committed.
    async fn persist(&self) -> Result<()>;
}

/// Open the backend configured under `[store]`, creating the index
/// directory if needed.
pub async fn open_store(settings: &Settings) -> Result<Box<dyn VectorStore>> {
    let dir = &settings.index.dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    match settings.store.kind.as_str() {
        "flat" => Ok(Box::new(FlatStore::open(dir)?)),
        "sqlite" => Ok(Box::new(SqliteStore::open(dir).await?)),
        other => bail!("Unknown store kind: '{}'. Must be flat or sqlite.", other),
    }
}

fn sort_hits(hits: &mut Vec<RetrievalHit>, k: usize) {
    hits.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    hits.truncate(k);
}

// ============ Flat file backend ============

const FLAT_FILE: &str = "index.json";

#[derive(Serialize, Deserialize)]
struct FlatRecord {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// JSON-file backend: all records in memory, flushed on [`persist`].
///
/// [`persist`]: VectorStore::persist
pub struct FlatStore {
    path: PathBuf,
    records: Mutex<Vec<FlatRecord>>,
}

impl FlatStore {
    pub fn open(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(FLAT_FILE);
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read index: {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| "Failed to parse flat index")?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl VectorStore for FlatStore {
    fn kind(&self) -> &'static str {
        "flat"
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = FlatRecord {
            chunk: chunk.clone(),
            embedding: vector.to_vec(),
        };
        match records.iter_mut().find(|r| r.chunk.chunk_id == chunk.chunk_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let records = self.records.lock().await;
        let mut hits: Vec<RetrievalHit> = records
            .iter()
            .map(|r| RetrievalHit {
                chunk: r.chunk.clone(),
                raw_score: cosine_similarity(query, &r.embedding) as f64,
            })
            .collect();
        sort_hits(&mut hits, k);
        Ok(hits)
    }

    async fn clear(&self) -> Result<()> {
        self.records.lock().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.lock().await.len() as u64)
    }

    async fn persist(&self) -> Result<()> {
        let records = self.records.lock().await;
        let json = serde_json::to_string(&*records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write index: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to commit index: {}", self.path.display()))?;
        Ok(())
    }
}

// ============ SQLite backend ============

const SQLITE_FILE: &str = "index.sqlite";

const SEARCH_SQL: &str = r#"
    SELECT c.chunk_id, c.source_id, c.source_type, c.title, c.name,
           c.page, c.char_offset, c.ordinal, c.text, cv.embedding
    FROM chunk_vectors cv
    JOIN chunks c ON c.chunk_id = cv.chunk_id
"#;

/// SQLite backend. All mutations run inside one transaction opened lazily on
/// the first write and committed by [`persist`]; dropping the store without
/// persisting rolls the rebuild back, so a failed build never leaves a
/// half-written index behind a still-matching manifest.
///
/// [`persist`]: VectorStore::persist
pub struct SqliteStore {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteStore {
    pub async fn open(index_dir: &Path) -> Result<Self> {
        let db_path = index_dir.join(SQLITE_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            tx: Mutex::new(None),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Lock the write transaction, opening it on first use.
    async fn write_tx(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<Transaction<'static, Sqlite>>>> {
        let mut guard = self.tx.lock().await;
        if guard.is_none() {
            *guard = Some(self.pool.begin().await?);
        }
        Ok(guard)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_type TEXT NOT NULL,
                title TEXT,
                name TEXT,
                page INTEGER,
                char_offset INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        let mut guard = self.write_tx().await?;
        let Some(tx) = guard.as_mut() else {
            unreachable!()
        };

        sqlx::query(
            r#"
            INSERT INTO chunks (chunk_id, source_id, source_type, title, name, page, char_offset, ordinal, text)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                source_id = excluded.source_id,
                source_type = excluded.source_type,
                title = excluded.title,
                name = excluded.name,
                page = excluded.page,
                char_offset = excluded.char_offset,
                ordinal = excluded.ordinal,
                text = excluded.text
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.source_id)
        .bind(chunk.source_type.as_str())
        .bind(&chunk.title)
        .bind(&chunk.name)
        .bind(chunk.page)
        .bind(chunk.offset as i64)
        .bind(chunk.ordinal)
        .bind(&chunk.text)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, embedding)
            VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.chunk_id)
        .bind(vec_to_blob(vector))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        // Read through the open transaction so a mid-build search sees its
        // own writes; otherwise the committed state.
        let mut guard = self.tx.lock().await;
        let rows = match guard.as_mut() {
            Some(tx) => sqlx::query(SEARCH_SQL).fetch_all(&mut **tx).await?,
            None => sqlx::query(SEARCH_SQL).fetch_all(&self.pool).await?,
        };
        drop(guard);

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let source_type: String = row.get("source_type");
            let offset: i64 = row.get("char_offset");

            hits.push(RetrievalHit {
                chunk: Chunk {
                    chunk_id: row.get("chunk_id"),
                    source_id: row.get("source_id"),
                    source_type: parse_source_type(&source_type)?,
                    title: row.get("title"),
                    name: row.get("name"),
                    page: row.get("page"),
                    offset: offset as usize,
                    ordinal: row.get("ordinal"),
                    text: row.get("text"),
                },
                raw_score: cosine_similarity(query, &vector) as f64,
            });
        }

        sort_hits(&mut hits, k);
        Ok(hits)
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self.write_tx().await?;
        let Some(tx) = guard.as_mut() else {
            unreachable!()
        };

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut **tx).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let mut guard = self.tx.lock().await;
        let count: i64 = match guard.as_mut() {
            Some(tx) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                    .fetch_one(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    async fn persist(&self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}

fn parse_source_type(s: &str) -> Result<SourceType> {
    match s {
        "url" => Ok(SourceType::Url),
        "wiki" => Ok(SourceType::Wiki),
        "pdf" => Ok(SourceType::Pdf),
        other => bail!("Unknown source type in store: {}", other),
    }
}
