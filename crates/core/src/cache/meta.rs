//! Last-cached timestamps for freshness decisions.
//!
//! Timestamps live in the meta tier of the same `cache_entries` table. Each
//! record body is the epoch-milliseconds instant as a decimal string, so a
//! generation sweep that drops `meta-<version>` drops the bookkeeping along
//! with the content it described.

use super::connection::StoreDb;
use super::entries::StoredResponse;
use super::tier::{Tier, TierKind};
use crate::Error;

impl StoreDb {
    /// Record when a URL was last cached.
    ///
    /// Writing the same URL again replaces the previous instant.
    pub async fn set_timestamp(&self, meta_tier: &Tier, url: &str, millis: i64) -> Result<(), Error> {
        debug_assert_eq!(meta_tier.kind(), TierKind::Meta);
        let record = StoredResponse {
            status: 200,
            headers: None,
            body: millis.to_string().into_bytes(),
            opaque: false,
        };
        self.put_entry(meta_tier, url, &record).await
    }

    /// Read back when a URL was last cached.
    ///
    /// Returns None when no record exists or the stored body does not parse
    /// as an integer; callers treat both the same way.
    pub async fn get_timestamp(&self, meta_tier: &Tier, url: &str) -> Result<Option<i64>, Error> {
        debug_assert_eq!(meta_tier.kind(), TierKind::Meta);
        let Some(record) = self.match_entry(meta_tier, url).await? else {
            return Ok(None);
        };

        let parsed = std::str::from_utf8(&record.body)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok());
        if parsed.is_none() {
            tracing::debug!(tier = %meta_tier, url, "unreadable timestamp record, treating as absent");
        }
        Ok(parsed)
    }
}
