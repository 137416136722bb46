//! Retrieval strategies composed from the tiered store and the upstream.
//!
//! Three policies cover every cacheable request:
//!
//! - **cache-first**: fresh hit wins; a stale hit is served immediately
//!   while a refresh runs in the background; a miss blocks on the network.
//! - **stale-while-revalidate**: the same branching, with the background
//!   refresh and the blocking fetch sharing one path ([`fetch_and_cache`]).
//! - **network-first**: the network wins; any cached copy, fresh or not, is
//!   the fallback when the network is down.
//!
//! Whatever the policy, only 200s and opaque cross-origin responses are
//! ever persisted.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use shulboard_core::{Error, StoreDb, StoredResponse, Tier, fresh_entry, put_response};

use crate::fetch::Upstream;
use crate::revalidate::RefreshHandle;

/// Fetch a URL from upstream, persist it when allowed, and return it.
///
/// The cache key is the requested URL, not the post-redirect one. A store
/// failure after a successful fetch is logged and the live response served
/// anyway.
pub async fn fetch_and_cache(
    store: &StoreDb,
    upstream: &dyn Upstream,
    tier: &Tier,
    url: &Url,
) -> Result<StoredResponse, Error> {
    let response = upstream.fetch(url).await?;
    let stored = response.to_stored();

    if response.is_storable() {
        if let Err(err) = put_response(store, tier, url.as_str(), &stored).await {
            tracing::debug!(%tier, %url, error = %err, "store write failed, serving live response");
        }
    } else {
        tracing::debug!(%tier, %url, status = stored.status, "response not storable, passing through");
    }

    Ok(stored)
}

/// The strategy dispatcher handed to the router.
///
/// Holds the store, the upstream seam and the background-refresh queue;
/// cloning is cheap and every request handler gets its own copy.
#[derive(Clone)]
pub struct CacheEngine {
    store: StoreDb,
    upstream: Arc<dyn Upstream>,
    refresh: RefreshHandle,
}

impl CacheEngine {
    pub fn new(store: StoreDb, upstream: Arc<dyn Upstream>, refresh: RefreshHandle) -> Self {
        Self { store, upstream, refresh }
    }

    pub fn store(&self) -> &StoreDb {
        &self.store
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Serve from cache when possible, refreshing stale entries behind the
    /// response.
    pub async fn cache_first(
        &self,
        tier: &Tier,
        url: &Url,
        max_age: Duration,
    ) -> Result<StoredResponse, Error> {
        if let Some(entry) = fresh_entry(&self.store, tier, url.as_str(), max_age).await? {
            tracing::debug!(%tier, %url, "cache-first: fresh hit");
            return Ok(entry);
        }

        if let Some(stale) = self.store.match_entry(tier, url.as_str()).await? {
            tracing::debug!(%tier, %url, "cache-first: stale hit, refreshing in background");
            self.refresh.enqueue(tier, url);
            return Ok(stale);
        }

        tracing::debug!(%tier, %url, "cache-first: miss, fetching");
        fetch_and_cache(&self.store, self.upstream.as_ref(), tier, url).await
    }

    /// Serve any cached copy immediately and revalidate it in the
    /// background; block on the network only for a complete miss.
    pub async fn stale_while_revalidate(
        &self,
        tier: &Tier,
        url: &Url,
        max_age: Duration,
    ) -> Result<StoredResponse, Error> {
        if let Some(entry) = fresh_entry(&self.store, tier, url.as_str(), max_age).await? {
            tracing::debug!(%tier, %url, "swr: fresh hit");
            return Ok(entry);
        }

        if let Some(stale) = self.store.match_entry(tier, url.as_str()).await? {
            tracing::debug!(%tier, %url, "swr: stale hit, revalidating in background");
            self.refresh.enqueue(tier, url);
            return Ok(stale);
        }

        tracing::debug!(%tier, %url, "swr: miss, fetching");
        fetch_and_cache(&self.store, self.upstream.as_ref(), tier, url).await
    }

    /// Try the network first; fall back to any cached copy, however old,
    /// when the fetch fails.
    pub async fn network_first(&self, tier: &Tier, url: &Url) -> Result<StoredResponse, Error> {
        match fetch_and_cache(&self.store, self.upstream.as_ref(), tier, url).await {
            Ok(response) => Ok(response),
            Err(err) => {
                if let Some(cached) = self.store.match_entry(tier, url.as_str()).await? {
                    tracing::warn!(%tier, %url, error = %err, "network-first: upstream down, serving cached copy");
                    Ok(cached)
                } else {
                    tracing::warn!(%tier, %url, error = %err, "network-first: upstream down, nothing cached");
                    Err(err)
                }
            }
        }
    }
}
