//! SQLite-backed generation storage.
//!
//! Generations live in the `generations` table; entries reference their
//! generation with `ON DELETE CASCADE`, so dropping a generation row drops
//! everything stored under it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheDb;
use super::key::CacheKey;
use super::response::{ResponseType, StoredResponse};
use super::store::{CacheStore, GenerationInfo, GenerationStore};
use crate::Error;

fn generation_exists(conn: &rusqlite::Connection, tag: &str) -> Result<bool, Error> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM generations WHERE tag = ?1)",
        params![tag],
        |row| row.get(0),
    )?;
    Ok(exists)
}

impl CacheDb {
    /// Create a generation row if it does not exist yet.
    pub async fn create_generation(&self, tag: &str) -> Result<(), Error> {
        let tag = tag.to_string();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (tag, created_at) VALUES (?1, ?2)",
                    params![tag, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List generations, oldest first, with their entry counts.
    pub async fn list_generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.tag, COUNT(e.key_hash)
                     FROM generations g LEFT JOIN entries e ON e.generation = g.tag
                     GROUP BY g.tag
                     ORDER BY g.created_at ASC, g.tag ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(GenerationInfo { tag: row.get(0)?, entries: row.get::<_, i64>(1)? as u64 })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and, through the cascade, all of its entries.
    pub async fn delete_generation(&self, tag: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE tag = ?1", params![tag])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a stored response by generation and key.
    ///
    /// Returns None if the key doesn't exist in that generation.
    pub async fn get_entry(&self, tag: &str, key: &CacheKey) -> Result<Option<StoredResponse>, Error> {
        let tag = tag.to_string();
        let key_hash = key.digest();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let row = conn
                    .query_row(
                        "SELECT url, status_code, response_type, headers_json, body
                         FROM entries WHERE generation = ?1 AND key_hash = ?2",
                        params![tag, key_hash],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, Vec<u8>>(4)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((url, status, response_type, headers_json, body)) = row else {
                    return Ok(None);
                };

                let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status}")))?;
                let response_type = response_type.parse::<ResponseType>().map_err(Error::CorruptEntry)?;
                let headers: Vec<(String, String)> =
                    serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

                Ok(Some(StoredResponse { url, status, response_type, headers, body: Bytes::from(body) }))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite a batch of entries in one transaction.
    ///
    /// Fails with `GenerationMissing` (writing nothing) if the generation
    /// has been deleted.
    pub async fn put_entries(&self, tag: &str, entries: Vec<(CacheKey, StoredResponse)>) -> Result<(), Error> {
        let tag = tag.to_string();
        let stored_at = Utc::now().to_rfc3339();
        let mut rows = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let headers_json =
                serde_json::to_string(&response.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
            rows.push((key.digest(), key.as_str().to_string(), response, headers_json));
        }

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                if !generation_exists(&tx, &tag)? {
                    return Err(Error::GenerationMissing(tag));
                }
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO entries (
                            generation, key_hash, cache_key, url, status_code,
                            response_type, headers_json, body, stored_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                        ON CONFLICT(generation, key_hash) DO UPDATE SET
                            cache_key = excluded.cache_key,
                            url = excluded.url,
                            status_code = excluded.status_code,
                            response_type = excluded.response_type,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                    )?;
                    for (key_hash, cache_key, response, headers_json) in &rows {
                        stmt.execute(params![
                            &tag,
                            key_hash,
                            cache_key,
                            &response.url,
                            response.status as i64,
                            response.response_type.as_str(),
                            headers_json,
                            response.body.as_ref(),
                            &stored_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Cache keys stored under a generation, in key order.
    pub async fn entry_keys(&self, tag: &str) -> Result<Vec<CacheKey>, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CacheKey>, Error> {
                let mut stmt = conn.prepare("SELECT cache_key FROM entries WHERE generation = ?1 ORDER BY cache_key")?;
                let rows = stmt.query_map(params![tag], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(CacheKey::new(row?));
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of a generation, keeping the generation itself.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_generation(&self, tag: &str) -> Result<u64, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE generation = ?1", params![tag])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

/// Handle onto one generation of a [`CacheDb`].
#[derive(Clone, Debug)]
pub struct SqliteGeneration {
    db: CacheDb,
    tag: String,
}

#[async_trait]
impl CacheStore for CacheDb {
    type Generation = SqliteGeneration;

    async fn open(&self, tag: &str) -> Result<SqliteGeneration, Error> {
        self.create_generation(tag).await?;
        Ok(SqliteGeneration { db: self.clone(), tag: tag.to_string() })
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.list_generations().await
    }

    async fn delete(&self, tag: &str) -> Result<bool, Error> {
        self.delete_generation(tag).await
    }
}

#[async_trait]
impl GenerationStore for SqliteGeneration {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredResponse>, Error> {
        self.db.get_entry(&self.tag, key).await
    }

    async fn put_all(&self, entries: Vec<(CacheKey, StoredResponse)>) -> Result<(), Error> {
        self.db.put_entries(&self.tag, entries).await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, Error> {
        self.db.entry_keys(&self.tag).await
    }

    async fn delete_all(&self) -> Result<u64, Error> {
        self.db.clear_generation(&self.tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str, body: &'static str) -> StoredResponse {
        StoredResponse {
            url: url.to_string(),
            status: 200,
            response_type: ResponseType::Basic,
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generation = db.open("v1").await.unwrap();
        let key = CacheKey::new("/app/index.html");

        generation.put(key.clone(), response("https://example.com/app/", "<html>")).await.unwrap();

        let stored = generation.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"<html>"));
        assert_eq!(stored.content_type(), Some("text/html"));
        assert_eq!(stored.response_type, ResponseType::Basic);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generation = db.open("v1").await.unwrap();
        assert!(generation.get(&CacheKey::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open("v1").await.unwrap();
        let v2 = db.open("v2").await.unwrap();
        let key = CacheKey::new("https://example.com/app/app.js");

        v1.put(key.clone(), response("https://example.com/app/app.js", "old")).await.unwrap();

        assert!(v2.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generation = db.open("v1").await.unwrap();
        let key = CacheKey::new("https://example.com/app/app.js");

        generation.put(key.clone(), response("https://example.com/app/app.js", "one")).await.unwrap();
        generation.put(key.clone(), response("https://example.com/app/app.js", "two")).await.unwrap();

        let stored = generation.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"two"));
        assert_eq!(generation.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open("v1").await.unwrap();
        v1.put(CacheKey::new("a"), response("https://example.com/a", "a")).await.unwrap();
        v1.put(CacheKey::new("b"), response("https://example.com/b", "b")).await.unwrap();

        assert!(db.delete("v1").await.unwrap());
        assert!(!db.delete("v1").await.unwrap());
        assert!(db.generations().await.unwrap().is_empty());

        let orphaned: i64 = db
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(orphaned, 0);
    }

    #[tokio::test]
    async fn test_put_into_deleted_generation_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open("v1").await.unwrap();
        db.delete("v1").await.unwrap();

        let result = v1.put(CacheKey::new("a"), response("https://example.com/a", "a")).await;
        assert!(matches!(result, Err(Error::GenerationMissing(tag)) if tag == "v1"));
        assert!(db.generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_listing_counts_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open("v1").await.unwrap();
        db.open("v2").await.unwrap();
        v1.put_all(vec![
            (CacheKey::new("a"), response("https://example.com/a", "a")),
            (CacheKey::new("b"), response("https://example.com/b", "b")),
        ])
        .await
        .unwrap();

        let generations = db.generations().await.unwrap();
        let v1_info = generations.iter().find(|g| g.tag == "v1").unwrap();
        let v2_info = generations.iter().find(|g| g.tag == "v2").unwrap();
        assert_eq!(v1_info.entries, 2);
        assert_eq!(v2_info.entries, 0);
    }

    #[tokio::test]
    async fn test_delete_all_keeps_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open("v1").await.unwrap();
        v1.put(CacheKey::new("a"), response("https://example.com/a", "a")).await.unwrap();

        assert_eq!(v1.delete_all().await.unwrap(), 1);
        assert!(v1.keys().await.unwrap().is_empty());
        assert_eq!(db.generations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.open("v1").await.unwrap();
        first.put(CacheKey::new("a"), response("https://example.com/a", "a")).await.unwrap();

        let second = db.open("v1").await.unwrap();
        assert!(second.get(&CacheKey::new("a")).await.unwrap().is_some());
        assert_eq!(db.generations().await.unwrap().len(), 1);
    }
}
