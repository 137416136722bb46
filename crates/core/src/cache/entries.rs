//! Cache entry CRUD operations.
//!
//! Entries are keyed by `(tier, url)`. Writing the same key twice replaces
//! the stored response in place, so re-caching a URL never grows the table.

use super::connection::StoreDb;
use super::tier::Tier;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached response body with enough metadata to replay it.
///
/// Opaque entries come from cross-origin fetches: the body is stored but
/// the headers were never visible, so `headers` is None and replaying one
/// reproduces only status and bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Option<Vec<(String, String)>>,
    pub body: Vec<u8>,
    pub opaque: bool,
}

impl StoredResponse {
    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref()?.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) { Some(v.as_str()) } else { None }
        })
    }
}

impl StoreDb {
    /// Insert or replace the entry for a URL within a tier.
    ///
    /// Uses UPSERT semantics: the `(tier, url)` pair stays unique and a
    /// second write overwrites the first.
    pub async fn put_entry(&self, tier: &Tier, url: &str, response: &StoredResponse) -> Result<(), Error> {
        let tier = tier.name();
        let url = url.to_string();
        let headers_json = match &response.headers {
            Some(headers) => Some(
                serde_json::to_string(headers)
                    .map_err(|e| Error::InvalidInput(format!("headers not serializable: {e}")))?,
            ),
            None => None,
        };
        let status = i64::from(response.status);
        let body = response.body.clone();
        let opaque = response.opaque;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (tier, url, status, headers_json, body, opaque)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(tier, url) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        opaque = excluded.opaque",
                    params![tier, url, status, headers_json, body, opaque as i32],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a URL within a tier.
    ///
    /// Returns None on a cache miss.
    pub async fn match_entry(&self, tier: &Tier, url: &str) -> Result<Option<StoredResponse>, Error> {
        let tier = tier.name();
        let url = url.to_string();

        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body, opaque FROM cache_entries
                     WHERE tier = ?1 AND url = ?2",
                    params![tier, url],
                    |row| {
                        let status: i64 = row.get(0)?;
                        let headers_json: Option<String> = row.get(1)?;
                        let body: Vec<u8> = row.get(2)?;
                        let opaque: i32 = row.get(3)?;
                        Ok((status, headers_json, body, opaque))
                    },
                );

                match result {
                    Ok((status, headers_json, body, opaque)) => Ok(Some(StoredResponse {
                        status: status as u16,
                        headers: headers_json.and_then(|json| serde_json::from_str(&json).ok()),
                        body,
                        opaque: opaque == 1,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry in the named tier. Returns the number removed.
    pub async fn delete_tier(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn
                    .execute("DELETE FROM cache_entries WHERE tier = ?1", params![name])
                    .map_err(Error::from)?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// List the distinct tier names currently holding entries.
    pub async fn list_tiers(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT tier FROM cache_entries ORDER BY tier")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Count the entries in the named tier.
    pub async fn count_entries(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM cache_entries WHERE tier = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every cache entry in every tier. Returns the number removed.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM cache_entries", []).map_err(Error::from)?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }
}
