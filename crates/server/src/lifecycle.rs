//! Gateway lifecycle: install, activate, supersede.
//!
//! The gateway generation is defined by the configured cache version tag.
//! Install primes the app shell, activation sweeps tiers left behind by
//! older version tags, and supersession marks the process as retired during
//! shutdown. The listener only starts accepting once activation has
//! finished, so the first request a page makes after boot is always handled
//! by the new generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use url::Url;

use shulboard_client::{Upstream, fetch_and_cache};
use shulboard_core::{Error, StoreDb, Tier, TierKind, live_tier_names};

/// Where the gateway is in its generational handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    Activated,
    Superseded,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Activated => "activated",
            LifecycleState::Superseded => "superseded",
        }
    }
}

/// Drives the install/activate/supersede transitions over the store.
pub struct Lifecycle {
    store: StoreDb,
    upstream: Arc<dyn Upstream>,
    version: String,
    board_origin: Url,
    shell_routes: Vec<String>,
    state: RwLock<LifecycleState>,
}

impl Lifecycle {
    pub fn new(
        store: StoreDb,
        upstream: Arc<dyn Upstream>,
        version: &str,
        board_origin: Url,
        shell_routes: Vec<String>,
    ) -> Self {
        Self {
            store,
            upstream,
            version: version.to_string(),
            board_origin,
            shell_routes,
            state: RwLock::new(LifecycleState::Installing),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Prime the static tier with the configured shell routes.
    ///
    /// Priming is best-effort: a route that fails to fetch or store is
    /// logged and skipped, since some deployments do not serve every shell
    /// path until later. Returns the number of routes primed.
    pub async fn install(&self) -> usize {
        let tier = Tier::new(TierKind::Static, &self.version);
        let mut primed = 0;

        for route in &self.shell_routes {
            let url = match self.board_origin.join(route) {
                Ok(url) => url,
                Err(err) => {
                    tracing::warn!(route, error = %err, "shell route does not resolve, skipping");
                    continue;
                }
            };
            match fetch_and_cache(&self.store, self.upstream.as_ref(), &tier, &url).await {
                Ok(response) if response.status == 200 => {
                    tracing::info!(%url, "shell route primed");
                    primed += 1;
                }
                Ok(response) => {
                    tracing::warn!(%url, status = response.status, "shell route not primed");
                }
                Err(err) => {
                    tracing::warn!(%url, error = %err, "shell route fetch failed, skipping");
                }
            }
        }

        primed
    }

    /// Evict every tier that does not belong to the current version, then
    /// mark the gateway activated.
    ///
    /// There is no multi-version coexistence: activation runs immediately
    /// after install, before the listener accepts its first request.
    pub async fn activate(&self) -> Result<(), Error> {
        let live = live_tier_names(&self.version);
        let tiers = self.store.list_tiers().await?;

        for name in tiers {
            if !live.contains(&name) {
                let removed = self.store.delete_tier(&name).await?;
                tracing::info!(tier = %name, removed, "evicted stale tier");
            }
        }

        *self.state.write().await = LifecycleState::Activated;
        tracing::info!(version = %self.version, "gateway activated");
        Ok(())
    }

    /// Drop every cache entry in every tier, current version included.
    ///
    /// The board sends this signal when an operator wants a guaranteed
    /// clean slate; the next round of requests repopulates the tiers.
    pub async fn clear_caches(&self) -> Result<u64, Error> {
        let removed = self.store.clear_all().await?;
        tracing::info!(removed, "cleared all cache tiers");
        Ok(removed)
    }

    /// Mark the gateway retired. Called during graceful shutdown, after the
    /// listener has stopped accepting.
    pub async fn supersede(&self) {
        *self.state.write().await = LifecycleState::Superseded;
        tracing::info!(version = %self.version, "gateway superseded");
    }

    /// Tier/entry counts for the status endpoint.
    pub async fn tier_summary(&self) -> Result<Vec<(String, u64)>, Error> {
        let mut summary = Vec::new();
        for name in self.store.list_tiers().await? {
            let entries = self.store.count_entries(&name).await?;
            summary.push((name, entries));
        }
        Ok(summary)
    }
}

/// The max-age table the router dispatches with.
///
/// These mirror the board's request classes: images turn over weekly,
/// static assets monthly, data every couple of hours.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub board_origin: Url,
    pub version: String,
    pub shell_root: String,
    pub max_age_image: Duration,
    pub max_age_static: Duration,
    pub max_age_data: Duration,
}

impl RoutePolicy {
    pub fn from_config(config: &shulboard_core::AppConfig) -> Result<Self, Error> {
        let board_origin = Url::parse(&config.upstream_origin)
            .map_err(|e| Error::InvalidUrl(format!("upstream_origin: {e}")))?;
        Ok(Self {
            board_origin,
            version: config.cache_version.clone(),
            shell_root: config.shell_root().to_string(),
            max_age_image: config.max_age_image(),
            max_age_static: config.max_age_static(),
            max_age_data: config.max_age_data(),
        })
    }

    pub fn static_tier(&self) -> Tier {
        Tier::new(TierKind::Static, &self.version)
    }

    pub fn runtime_tier(&self) -> Tier {
        Tier::new(TierKind::Runtime, &self.version)
    }

    /// Absolute URL of the navigation fallback page.
    pub fn shell_url(&self) -> Result<Url, Error> {
        self.board_origin
            .join(&self.shell_root)
            .map_err(|e| Error::InvalidUrl(format!("shell root: {e}")))
    }
}
