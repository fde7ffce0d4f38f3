//! SQLite-backed cache for oracle responses.
//!
//! Keys are content hashes over everything that determines a response plus
//! the caller-supplied cache key, so otherwise-identical stochastic calls
//! stay distinct when the caller asks for distinct samples.

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct ResponseCacheKey {
    /// "complete", "classify" or "answer".
    pub method: String,
    pub model: String,
    pub params_hash: String,
    pub prompt_hash: String,
    pub cache_key: Option<String>,
    pub key_hash: String,
}

impl ResponseCacheKey {
    /// `params` is a canonical rendering of the non-prompt request fields
    /// (temperature, stop, max tokens, choices).
    pub fn new(
        method: &str,
        model: &str,
        params: &str,
        prompt: &str,
        cache_key: Option<&str>,
    ) -> Self {
        let params_hash = hash_text(params);
        let prompt_hash = hash_text(prompt);
        let key_hash = hash_fields(&[
            method,
            model,
            &params_hash,
            &prompt_hash,
            cache_key.unwrap_or(""),
            if cache_key.is_some() { "k" } else { "-" },
        ]);

        Self {
            method: method.to_string(),
            model: model.to_string(),
            params_hash,
            prompt_hash,
            cache_key: cache_key.map(str::to_string),
            key_hash,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Raw completion text, or the JSON-encoded distribution for `classify`.
    pub payload: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub provider_cost_nanodollars: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<CachedResponse>, CacheError>;
    async fn put(&self, key: &ResponseCacheKey, value: &CachedResponse) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct SqliteResponseCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResponseCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS oracle_cache (\
               key_hash TEXT PRIMARY KEY,\
               method TEXT NOT NULL,\
               model TEXT NOT NULL,\
               params_hash TEXT NOT NULL,\
               prompt_hash TEXT NOT NULL,\
               cache_key TEXT,\
               payload TEXT NOT NULL,\
               input_tokens INTEGER,\
               output_tokens INTEGER,\
               provider_cost_nanodollars INTEGER,\
               created_at INTEGER NOT NULL,\
               updated_at INTEGER NOT NULL,\
               hit_count INTEGER NOT NULL DEFAULT 0\
             );",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("ORACLE_CACHE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".oracle_response_cache.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_exclusive(&self) -> Result<CacheLock, CacheError> {
        CacheLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<CachedResponse>, CacheError> {
        let key_hash = key.key_hash.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT payload, input_tokens, output_tokens, provider_cost_nanodollars \
                     FROM oracle_cache WHERE key_hash = ?1",
                )?;
                let mut rows = stmt.query(params![key_hash])?;
                if let Some(row) = rows.next()? {
                    let entry = CachedResponse {
                        payload: row.get(0)?,
                        input_tokens: row.get::<_, Option<i64>>(1)?.map(|v| v as u32),
                        output_tokens: row.get::<_, Option<i64>>(2)?.map(|v| v as u32),
                        provider_cost_nanodollars: row.get(3)?,
                    };
                    conn.execute(
                        "UPDATE oracle_cache \
                         SET hit_count = hit_count + 1, updated_at = ?1 \
                         WHERE key_hash = ?2",
                        params![now_epoch(), key_hash],
                    )?;
                    Ok(Some(entry))
                } else {
                    Ok(None)
                }
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn put(&self, key: &ResponseCacheKey, value: &CachedResponse) -> Result<(), CacheError> {
        let key = key.clone();
        let value = value.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let now = now_epoch();
                conn.execute(
                    "INSERT INTO oracle_cache (\
                        key_hash, method, model, params_hash, prompt_hash, cache_key,\
                        payload, input_tokens, output_tokens, provider_cost_nanodollars,\
                        created_at, updated_at\
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                     ON CONFLICT(key_hash) DO UPDATE SET \
                        payload = excluded.payload,\
                        input_tokens = excluded.input_tokens,\
                        output_tokens = excluded.output_tokens,\
                        provider_cost_nanodollars = excluded.provider_cost_nanodollars,\
                        updated_at = excluded.updated_at",
                    params![
                        key.key_hash,
                        key.method,
                        key.model,
                        key.params_hash,
                        key.prompt_hash,
                        key.cache_key,
                        value.payload,
                        value.input_tokens.map(|v| v as i64),
                        value.output_tokens.map(|v| v as i64),
                        value.provider_cost_nanodollars,
                        now,
                        now,
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

/// Advisory file lock held while maintenance commands rewrite the cache.
#[derive(Debug)]
pub struct CacheLock {
    _file: std::fs::File,
}

impl CacheLock {
    fn new(db_path: &Path) -> Result<Self, CacheError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Serialize)]
pub struct CacheExportRow {
    pub key_hash: String,
    pub method: String,
    pub model: String,
    pub params_hash: String,
    pub prompt_hash: String,
    pub cache_key: Option<String>,
    pub payload: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub provider_cost_nanodollars: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachePruneStats {
    pub deleted: usize,
    pub remaining: usize,
}

impl SqliteResponseCache {
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, model, params_hash, prompt_hash, cache_key,\
                            payload, input_tokens, output_tokens, provider_cost_nanodollars,\
                            created_at, updated_at, hit_count \
                     FROM oracle_cache ORDER BY updated_at DESC",
                )?;
                let mut rows = stmt.query([])?;
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                let mut written = 0usize;
                while let Some(row) = rows.next()? {
                    let record = CacheExportRow {
                        key_hash: row.get(0)?,
                        method: row.get(1)?,
                        model: row.get(2)?,
                        params_hash: row.get(3)?,
                        prompt_hash: row.get(4)?,
                        cache_key: row.get(5)?,
                        payload: row.get(6)?,
                        input_tokens: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                        output_tokens: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
                        provider_cost_nanodollars: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                        hit_count: row.get(12)?,
                    };
                    let line = serde_json::to_string(&record)
                        .map_err(|e| CacheError::Serde(e.to_string()))?;
                    writeln!(file, "{line}")?;
                    written += 1;
                }
                file.flush()?;
                Ok(written)
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub async fn prune(
        &self,
        max_age_days: Option<u64>,
        max_rows: Option<usize>,
    ) -> Result<CachePruneStats, CacheError> {
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let mut deleted: usize = 0;
                if let Some(days) = max_age_days {
                    let cutoff = now_epoch().saturating_sub((days as i64).saturating_mul(86_400));
                    let removed = conn.execute(
                        "DELETE FROM oracle_cache WHERE updated_at < ?1",
                        params![cutoff],
                    )?;
                    deleted = deleted.saturating_add(removed);
                }

                if let Some(max_rows) = max_rows {
                    let count: i64 =
                        conn.query_row("SELECT COUNT(*) FROM oracle_cache", [], |row| row.get(0))?;
                    let keep = max_rows as i64;
                    if count > keep {
                        let removed = conn.execute(
                            "DELETE FROM oracle_cache WHERE key_hash IN (\
                                SELECT key_hash FROM oracle_cache \
                                ORDER BY updated_at DESC LIMIT -1 OFFSET ?1\
                             )",
                            params![keep],
                        )?;
                        deleted = deleted.saturating_add(removed);
                    }
                }

                let remaining: i64 =
                    conn.query_row("SELECT COUNT(*) FROM oracle_cache", [], |row| row.get(0))?;
                Ok(CachePruneStats {
                    deleted,
                    remaining: remaining.max(0) as usize,
                })
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
