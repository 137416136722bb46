//! Age-based freshness checks over cached entries.

use super::connection::StoreDb;
use super::entries::StoredResponse;
use super::tier::Tier;
use crate::Error;
use std::time::Duration;

/// Return the cached entry for a URL only if it is still fresh.
///
/// An entry is fresh when its recorded age is at most `max_age`. An entry
/// with no timestamp record is treated as fresh: a board that cannot judge
/// age keeps serving what it has rather than refusing to display.
///
/// Returns None on a miss or when the entry is stale.
pub async fn fresh_entry(
    store: &StoreDb,
    tier: &Tier,
    url: &str,
    max_age: Duration,
) -> Result<Option<StoredResponse>, Error> {
    let Some(entry) = store.match_entry(tier, url).await? else {
        return Ok(None);
    };

    let Some(cached_at) = store.get_timestamp(&tier.meta_peer(), url).await? else {
        tracing::debug!(%tier, url, "no timestamp record, assuming fresh");
        return Ok(Some(entry));
    };

    let age_ms = chrono::Utc::now().timestamp_millis().saturating_sub(cached_at);
    if age_ms <= max_age.as_millis() as i64 {
        Ok(Some(entry))
    } else {
        tracing::debug!(%tier, url, age_ms, max_age_ms = max_age.as_millis() as u64, "entry is stale");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tier::TierKind;

    fn entry() -> StoredResponse {
        StoredResponse {
            status: 200,
            headers: Some(vec![("content-type".into(), "application/json".into())]),
            body: b"{}".to_vec(),
            opaque: false,
        }
    }

    async fn seed(db: &StoreDb, tier: &Tier, url: &str, age: Option<Duration>) {
        db.put_entry(tier, url, &entry()).await.unwrap();
        if let Some(age) = age {
            let cached_at = chrono::Utc::now().timestamp_millis() - age.as_millis() as i64;
            db.set_timestamp(&tier.meta_peer(), url, cached_at).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fresh_within_window() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let tier = Tier::new(TierKind::Runtime, "v1");
        let url = "https://board.example/data";
        seed(&db, &tier, url, Some(Duration::from_secs(60))).await;

        let got = fresh_entry(&db, &tier, url, Duration::from_secs(7200)).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn test_stale_beyond_window() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let tier = Tier::new(TierKind::Runtime, "v1");
        let url = "https://board.example/data";
        seed(&db, &tier, url, Some(Duration::from_secs(3 * 3600))).await;

        let got = fresh_entry(&db, &tier, url, Duration::from_secs(7200)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_missing_timestamp_counts_as_fresh() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let tier = Tier::new(TierKind::Static, "v1");
        let url = "https://board.example/app.css";
        seed(&db, &tier, url, None).await;

        let got = fresh_entry(&db, &tier, url, Duration::from_secs(1)).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn test_miss_stays_a_miss() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let tier = Tier::new(TierKind::Static, "v1");

        let got = fresh_entry(&db, &tier, "https://board.example/absent", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_future_timestamp_is_fresh() {
        let db = StoreDb::open_in_memory().await.unwrap();
        let tier = Tier::new(TierKind::Runtime, "v1");
        let url = "https://board.example/clock-skew";
        db.put_entry(&tier, url, &entry()).await.unwrap();
        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        db.set_timestamp(&tier.meta_peer(), url, future).await.unwrap();

        let got = fresh_entry(&db, &tier, url, Duration::from_secs(1)).await.unwrap();
        assert!(got.is_some());
    }
}
