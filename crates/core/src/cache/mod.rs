//! SQLite-backed response cache for the display board.
//!
//! This module provides persistent, tiered response storage using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Versioned tiers (`static-v1`, `runtime-v1`, `meta-v1`) for generational
//!   rollover
//! - Last-cached timestamps stored alongside the content they describe
//! - Age-based freshness checks that fail open when bookkeeping is missing
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod freshness;
pub mod meta;
pub mod migrations;
pub mod tier;

pub use crate::Error;

pub use connection::StoreDb;
pub use entries::StoredResponse;
pub use freshness::fresh_entry;
pub use tier::{Tier, TierKind, live_tier_names};

/// Store a response and stamp its last-cached instant in one step.
///
/// The entry write must succeed; a failed timestamp write is logged and
/// swallowed, leaving the entry without an age record, which later freshness
/// checks treat as fresh.
pub async fn put_response(
    store: &StoreDb,
    tier: &Tier,
    url: &str,
    response: &StoredResponse,
) -> Result<(), Error> {
    store.put_entry(tier, url, response).await?;

    let now = chrono::Utc::now().timestamp_millis();
    if let Err(err) = store.set_timestamp(&tier.meta_peer(), url, now).await {
        tracing::debug!(%tier, url, error = %err, "timestamp write failed, entry kept without age");
    }
    Ok(())
}
