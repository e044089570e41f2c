//! Cache entry reads and writes.
//!
//! Entries are keyed by request identity within a generation. Writes are
//! independent per key; a second write to the same key replaces the first.

use super::connection::CacheDb;
use super::generations::GenerationHandle;
use super::hash::request_key;
use crate::Error;
use crate::model::{ProxyRequest, ResponseSnapshot};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, types::Type};

/// A stored response together with the request identity it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub response: ResponseSnapshot,
}

impl CacheEntry {
    pub fn new(request: &ProxyRequest, response: ResponseSnapshot) -> Self {
        Self {
            key: request_key(request),
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
            response,
        }
    }
}

fn conversion_error<E>(column: usize, kind: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, kind, Box::new(err))
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let headers_json: String = row.get(4)?;
    let headers: Vec<(String, String)> =
        serde_json::from_str(&headers_json).map_err(|e| conversion_error(4, Type::Text, e))?;

    let captured_at: String = row.get(6)?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at)
        .map_err(|e| conversion_error(6, Type::Text, e))?
        .with_timezone(&Utc);

    Ok(CacheEntry {
        key: row.get(0)?,
        method: row.get(1)?,
        url: row.get(2)?,
        response: ResponseSnapshot {
            status: row.get(3)?,
            headers,
            body: Bytes::from(row.get::<_, Vec<u8>>(5)?),
            captured_at,
        },
    })
}

impl CacheDb {
    /// Store an entry, replacing any previous entry for the same key.
    ///
    /// # Errors
    ///
    /// - [`Error::NotCacheable`] if the response status is not 2xx
    /// - [`Error::GenerationClosed`] if the generation no longer exists
    pub async fn put_entry(&self, generation: &GenerationHandle, entry: &CacheEntry) -> Result<(), Error> {
        if !entry.response.is_success() {
            return Err(Error::NotCacheable(entry.response.status));
        }

        let name = generation.name().to_string();
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.response.headers)
            .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;
        let captured_at = entry.response.captured_at.to_rfc3339();

        let written = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let written = conn.execute(
                    "INSERT INTO entries (generation, key, method, url, status, headers_json, body, captured_at)
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                    WHERE EXISTS (SELECT 1 FROM generations WHERE name = ?1)
                    ON CONFLICT(generation, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        captured_at = excluded.captured_at",
                    params![
                        &name,
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.response.status,
                        &headers_json,
                        &entry.response.body[..],
                        &captured_at,
                    ],
                )?;
                Ok(written)
            })
            .await
            .map_err(Error::from)?;

        if written == 0 {
            return Err(Error::GenerationClosed(generation.name().to_string()));
        }

        Ok(())
    }

    /// Look up an entry by key. Never touches the network.
    pub async fn get_entry(&self, generation: &GenerationHandle, key: &str) -> Result<Option<CacheEntry>, Error> {
        let name = generation.name().to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, method, url, status, headers_json, body, captured_at
                    FROM entries WHERE generation = ?1 AND key = ?2",
                )?;

                match stmt.query_row(params![name, key], row_to_entry) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry answering `request`.
    pub async fn match_request(
        &self, generation: &GenerationHandle, request: &ProxyRequest,
    ) -> Result<Option<CacheEntry>, Error> {
        self.get_entry(generation, &request_key(request)).await
    }

    /// Whether an entry exists for the key.
    pub async fn has_entry(&self, generation: &GenerationHandle, key: &str) -> Result<bool, Error> {
        let name = generation.name().to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM entries WHERE generation = ?1 AND key = ?2)",
                    params![name, key],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries stored in a generation.
    pub async fn count_entries(&self, generation: &GenerationHandle) -> Result<u64, Error> {
        let name = generation.name().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
