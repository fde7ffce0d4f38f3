use oracle_recipes::cache::{CachedResponse, ResponseCacheKey, SqliteResponseCache};
use oracle_recipes::ResponseCache;
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct ExportRow {
    key_hash: String,
    method: String,
    cache_key: Option<String>,
    hit_count: i64,
    payload: String,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    provider_cost_nanodollars: Option<i64>,
}

fn key(prompt: &str, sample: Option<&str>) -> ResponseCacheKey {
    ResponseCacheKey::new("complete", "openai/gpt-4o-mini", "t=0.7", prompt, sample)
}

fn response(payload: &str) -> CachedResponse {
    CachedResponse {
        payload: payload.to_string(),
        input_tokens: Some(10),
        output_tokens: Some(5),
        provider_cost_nanodollars: Some(123),
    }
}

#[tokio::test]
async fn sqlite_cache_put_get_and_export_increments_hit_count() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResponseCache::new(&db_path).unwrap();

    let key = key("Which of paragraphs A and B ...", Some("1"));
    cache.put(&key, &response(" A")).await.unwrap();

    let hit1 = cache.get(&key).await.unwrap().unwrap();
    assert_eq!(hit1.payload, " A");
    assert_eq!(hit1.input_tokens, Some(10));
    assert_eq!(hit1.output_tokens, Some(5));
    assert_eq!(hit1.provider_cost_nanodollars, Some(123));

    let _ = cache.get(&key).await.unwrap().unwrap();

    let export_path = dir.path().join("export.jsonl");
    let written = cache.export_jsonl(&export_path).await.unwrap();
    assert_eq!(written, 1);

    let raw = std::fs::read_to_string(&export_path).unwrap();
    let rows: Vec<ExportRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let row = rows
        .into_iter()
        .find(|r| r.key_hash == key.key_hash)
        .unwrap();

    assert_eq!(row.hit_count, 2);
    assert_eq!(row.method, "complete");
    assert_eq!(row.cache_key.as_deref(), Some("1"));
    assert_eq!(row.payload, " A");
    assert_eq!(row.input_tokens, Some(10));
    assert_eq!(row.output_tokens, Some(5));
    assert_eq!(row.provider_cost_nanodollars, Some(123));
}

#[tokio::test]
async fn sqlite_cache_keeps_samples_apart_and_overwrites_in_place() {
    let dir = tempdir().unwrap();
    let cache = SqliteResponseCache::new(dir.path().join("cache.sqlite")).unwrap();

    let first = key("turn prompt", Some("0"));
    let second = key("turn prompt", Some("1"));
    cache.put(&first, &response("one")).await.unwrap();
    cache.put(&second, &response("two")).await.unwrap();
    assert_eq!(cache.get(&first).await.unwrap().unwrap().payload, "one");
    assert_eq!(cache.get(&second).await.unwrap().unwrap().payload, "two");

    cache.put(&first, &response("uno")).await.unwrap();
    assert_eq!(cache.get(&first).await.unwrap().unwrap().payload, "uno");
    assert!(cache.get(&key("turn prompt", None)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_cache_prune_max_rows_keeps_most_recent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResponseCache::new(&db_path).unwrap();

    let old_key = key("old prompt", None);
    let new_key = key("new prompt", None);

    cache.put(&old_key, &response("old")).await.unwrap();
    cache.put(&new_key, &response("new")).await.unwrap();

    // Make the "old" row deterministically older so prune ordering is stable.
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE oracle_cache SET updated_at = 0 WHERE key_hash = ?1",
        rusqlite::params![old_key.key_hash],
    )
    .unwrap();

    let stats = cache.prune(None, Some(1)).await.unwrap();
    assert_eq!(stats.remaining, 1);
    assert_eq!(stats.deleted, 1);

    let export_path = dir.path().join("export.jsonl");
    cache.export_jsonl(&export_path).await.unwrap();

    let raw = std::fs::read_to_string(&export_path).unwrap();
    let rows: Vec<ExportRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key_hash, new_key.key_hash);
}

#[tokio::test]
async fn sqlite_cache_prune_by_age_drops_stale_rows() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResponseCache::new(&db_path).unwrap();

    let stale = key("stale", None);
    let fresh = key("fresh", None);
    cache.put(&stale, &response("s")).await.unwrap();
    cache.put(&fresh, &response("f")).await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE oracle_cache SET updated_at = 0 WHERE key_hash = ?1",
        rusqlite::params![stale.key_hash],
    )
    .unwrap();

    let stats = cache.prune(Some(30), None).await.unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.remaining, 1);
    assert!(cache.get(&stale).await.unwrap().is_none());
    assert!(cache.get(&fresh).await.unwrap().is_some());
}

#[test]
fn sqlite_cache_lock_does_not_truncate_lockfile() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.sqlite");
    let cache = SqliteResponseCache::new(&db_path).unwrap();

    let mut lock_path = db_path.clone();
    lock_path.set_extension("lock");
    std::fs::write(&lock_path, "keep").unwrap();

    let lock = cache.lock_exclusive().unwrap();
    drop(lock);

    let contents = std::fs::read_to_string(&lock_path).unwrap();
    assert_eq!(contents, "keep");
}
