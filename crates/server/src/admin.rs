//! Operator surface: clear signal, status, warm-up.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use shulboard_core::Error;

use crate::router::{GatewayState, error_response};

#[derive(Debug, Serialize)]
pub struct TierStatus {
    pub name: String,
    pub entries: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    pub version: String,
    pub tiers: Vec<TierStatus>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

#[derive(Debug, Deserialize)]
pub struct WarmRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WarmResponse {
    pub warmed: usize,
    pub failed: usize,
}

/// Lifecycle state plus per-tier entry counts.
pub async fn status(State(gateway): State<GatewayState>) -> Response {
    let tiers = match gateway.lifecycle.tier_summary().await {
        Ok(summary) => summary
            .into_iter()
            .map(|(name, entries)| TierStatus { name, entries })
            .collect(),
        Err(err) => return error_response(&err),
    };

    let body = StatusResponse {
        state: gateway.lifecycle.state().await.as_str(),
        version: gateway.lifecycle.version().to_string(),
        tiers,
    };
    Json(body).into_response()
}

/// The board's "clear all caches" signal.
pub async fn clear_caches(State(gateway): State<GatewayState>) -> Response {
    match gateway.lifecycle.clear_caches().await {
        Ok(removed) => Json(ClearResponse { removed }).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Pull a list of asset URLs into the static tier ahead of need.
///
/// Relative paths are resolved against the board origin. Each URL goes
/// through the cache-first policy, so already-fresh assets cost nothing.
pub async fn warm(
    State(gateway): State<GatewayState>,
    Json(request): Json<WarmRequest>,
) -> Response {
    let tier = gateway.policy.static_tier();
    let max_age = gateway.policy.max_age_static;
    let mut warmed = 0;
    let mut failed = 0;

    for raw in &request.urls {
        let url = match resolve_warm_url(&gateway.policy.board_origin, raw) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(url = %raw, error = %err, "warm target rejected");
                failed += 1;
                continue;
            }
        };
        match gateway.engine.cache_first(&tier, &url, max_age).await {
            Ok(_) => warmed += 1,
            Err(err) => {
                tracing::warn!(%url, error = %err, "warm fetch failed");
                failed += 1;
            }
        }
    }

    let status = if failed > 0 && warmed == 0 {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (status, Json(WarmResponse { warmed, failed })).into_response()
}

fn resolve_warm_url(board_origin: &Url, raw: &str) -> Result<Url, Error> {
    let url = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?
    } else {
        board_origin.join(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?
    };
    Ok(url)
}
