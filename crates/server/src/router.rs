//! Request routing for the gateway.
//!
//! Every request that is not an admin call lands in the fallback handler
//! here. The handler resolves the target URL (origin-form paths are rebased
//! onto the board origin, absolute-form URLs pass through), guards method
//! and scheme, and dispatches:
//!
//! - non-GET: forwarded upstream untouched, never cached
//! - page navigations: network first, falling back to the cached app shell
//! - everything else: classified by declared resource kind and served
//!   stale-while-revalidate from the matching tier

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use url::Url;

use shulboard_client::{CacheEngine, HttpUpstream, fetch_and_cache};
use shulboard_core::{Error, StoredResponse};

use crate::admin;
use crate::lifecycle::{Lifecycle, RoutePolicy};
use crate::proxy;

/// Declared resource kind of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Script,
    Style,
    Font,
    Image,
    Fetch,
    Other,
}

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: CacheEngine,
    pub http: Arc<HttpUpstream>,
    pub lifecycle: Arc<Lifecycle>,
    pub policy: RoutePolicy,
}

/// Assemble the gateway router: admin surface plus the catch-all handler.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/admin/status", get(admin::status))
        .route("/admin/clear-caches", post(admin::clear_caches))
        .route("/admin/warm", post(admin::warm))
        .fallback(handle)
        .with_state(state)
}

/// Catch-all request handler.
pub async fn handle(State(gateway): State<GatewayState>, request: Request) -> Response {
    match dispatch(&gateway, request).await {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

async fn dispatch(gateway: &GatewayState, request: Request) -> Result<Response, Error> {
    let (parts, body) = request.into_parts();
    let target = resolve_target(&gateway.policy.board_origin, &parts.uri)?;

    // Only reads are cacheable; everything else goes straight upstream.
    if parts.method != Method::GET {
        return proxy::passthrough(gateway, parts.method, &target, &parts.headers, body).await;
    }

    let kind = classify(&parts.headers, &target);
    tracing::debug!(%target, ?kind, "dispatching");

    match kind {
        ResourceKind::Document => navigate(gateway, &target).await,
        ResourceKind::Image => {
            let tier = gateway.policy.runtime_tier();
            let served = gateway
                .engine
                .stale_while_revalidate(&tier, &target, gateway.policy.max_age_image)
                .await?;
            Ok(stored_to_response(&served))
        }
        ResourceKind::Script | ResourceKind::Style | ResourceKind::Font => {
            let tier = gateway.policy.static_tier();
            let served = gateway
                .engine
                .stale_while_revalidate(&tier, &target, gateway.policy.max_age_static)
                .await?;
            Ok(stored_to_response(&served))
        }
        ResourceKind::Fetch | ResourceKind::Other => {
            let tier = gateway.policy.runtime_tier();
            let served = gateway
                .engine
                .stale_while_revalidate(&tier, &target, gateway.policy.max_age_data)
                .await?;
            Ok(stored_to_response(&served))
        }
    }
}

/// Resolve the request URI to the absolute URL used as the cache key.
///
/// Origin-form URIs (plain paths) are rebased onto the board origin.
/// Absolute-form URIs are taken as-is, which is how cross-origin resources
/// reach the gateway. Anything that is not http(s) is refused.
pub fn resolve_target(board_origin: &Url, uri: &Uri) -> Result<Url, Error> {
    if let Some(scheme) = uri.scheme_str() {
        if scheme != "http" && scheme != "https" {
            return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}")));
        }
        return Url::parse(&uri.to_string())
            .map_err(|e| Error::InvalidUrl(format!("{uri}: {e}")));
    }

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    board_origin
        .join(path)
        .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
}

/// Classify a request by its declared resource kind.
///
/// `Sec-Fetch-Mode: navigate` and `Sec-Fetch-Dest` are authoritative when
/// the kiosk browser sends them; the `Accept` header and the URL extension
/// cover clients that do not.
pub fn classify(headers: &HeaderMap, url: &Url) -> ResourceKind {
    if let Some(mode) = header_str(headers, "sec-fetch-mode")
        && mode == "navigate"
    {
        return ResourceKind::Document;
    }

    if let Some(dest) = header_str(headers, "sec-fetch-dest") {
        return match dest {
            "document" => ResourceKind::Document,
            "script" => ResourceKind::Script,
            "style" => ResourceKind::Style,
            "font" => ResourceKind::Font,
            "image" => ResourceKind::Image,
            "empty" => ResourceKind::Fetch,
            _ => ResourceKind::Other,
        };
    }

    if let Some(accept) = header_str(headers, "accept") {
        if accept.contains("text/html") {
            return ResourceKind::Document;
        }
        if accept.contains("application/json") {
            return ResourceKind::Fetch;
        }
        if accept.contains("image/") {
            return ResourceKind::Image;
        }
        if accept.contains("text/css") {
            return ResourceKind::Style;
        }
    }

    match extension(url) {
        Some("js") | Some("mjs") => ResourceKind::Script,
        Some("css") => ResourceKind::Style,
        Some("woff") | Some("woff2") | Some("ttf") | Some("otf") | Some("eot") => ResourceKind::Font,
        Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("webp") | Some("svg")
        | Some("ico") | Some("avif") => ResourceKind::Image,
        Some("json") => ResourceKind::Fetch,
        _ => ResourceKind::Other,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn extension(url: &Url) -> Option<&str> {
    let path = url.path();
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext) }
}

/// Page navigation: the network wins, the cached shell keeps the board
/// alive when the network is gone.
///
/// A live response is returned whatever its status; only a 200 lands in
/// the static tier. A transport failure falls back to the cached shell
/// root page.
async fn navigate(gateway: &GatewayState, target: &Url) -> Result<Response, Error> {
    let tier = gateway.policy.static_tier();

    match fetch_and_cache(gateway.engine.store(), gateway.engine.upstream().as_ref(), &tier, target)
        .await
    {
        Ok(live) => Ok(stored_to_response(&live)),
        Err(err) => {
            tracing::warn!(%target, error = %err, "navigation fetch failed, serving shell");
            let shell_url = gateway.policy.shell_url()?;
            match gateway.engine.store().match_entry(&tier, shell_url.as_str()).await? {
                Some(shell) => Ok(stored_to_response(&shell)),
                None => Err(Error::ShellUnavailable(format!("no cached shell at {shell_url}"))),
            }
        }
    }
}

/// Replay a stored response over HTTP.
///
/// Opaque entries have no headers to replay; they come back as status plus
/// bytes. A header pair that no longer parses is skipped rather than
/// failing the whole replay.
pub fn stored_to_response(stored: &StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(stored.body.clone()));
    *response.status_mut() = status;

    if let Some(headers) = &stored.headers {
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>())
            {
                response.headers_mut().append(name, value);
            }
        }
    }

    response
}

/// Map a gateway error onto a status the kiosk can act on.
pub fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::InvalidInput(_) | Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::UpstreamUnreachable(_) | Error::FetchTooLarge(_) => StatusCode::BAD_GATEWAY,
        Error::ShellUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Store(_) | Error::MigrationFailed(_) | Error::CorruptDocument(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }

    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = status;
    response
}

/// Read a request body with the configured size cap.
pub async fn read_body(body: Body, limit: usize) -> Result<bytes::Bytes, Error> {
    to_bytes(body, limit)
        .await
        .map_err(|e| Error::FetchTooLarge(format!("request body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use shulboard_client::{Revalidator, Upstream, UpstreamConfig, UpstreamResponse};
    use shulboard_core::{StoreDb, Tier, TierKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct StubUpstream {
        calls: AtomicUsize,
        status: StatusCode,
        cross_origin: bool,
        fail: bool,
    }

    impl StubUpstream {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: StatusCode::OK,
                cross_origin: false,
                fail: false,
            })
        }

        fn with_status(status: StatusCode) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), status, cross_origin: false, fail: false })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: StatusCode::OK,
                cross_origin: false,
                fail: true,
            })
        }

        fn cross_origin() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: StatusCode::OK,
                cross_origin: true,
                fail: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::UpstreamUnreachable("stub: network down".into()));
            }
            Ok(UpstreamResponse {
                url: url.clone(),
                final_url: url.clone(),
                status: self.status,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"live content"),
                cross_origin: self.cross_origin,
                fetch_ms: 1,
            })
        }
    }

    struct Harness {
        router: Router,
        store: StoreDb,
        revalidator: Revalidator,
    }

    async fn harness(upstream: Arc<StubUpstream>) -> Harness {
        let store = StoreDb::open_in_memory().await.unwrap();
        let revalidator = Revalidator::spawn(store.clone(), upstream.clone());
        let engine = CacheEngine::new(store.clone(), upstream.clone(), revalidator.handle());

        // The harness board origin is a port with nothing listening, so a
        // forwarded request fails fast with a connection error. Cached paths
        // never reach it; they go through the stub.
        let config = shulboard_core::AppConfig {
            upstream_origin: "http://127.0.0.1:19".into(),
            ..Default::default()
        };
        let http = Arc::new(
            HttpUpstream::new(UpstreamConfig {
                board_origin: Url::parse(&config.upstream_origin).unwrap(),
                timeout: std::time::Duration::from_millis(500),
                ..UpstreamConfig::default()
            })
            .unwrap(),
        );

        let policy = RoutePolicy::from_config(&config).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(
            store.clone(),
            upstream,
            &config.cache_version,
            policy.board_origin.clone(),
            config.shell_routes.clone(),
        ));

        let router =
            build_router(GatewayState { engine, http, lifecycle, policy });
        Harness { router, store, revalidator }
    }

    fn get(uri: &str) -> Request {
        Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with(uri: &str, header: (&str, &str)) -> Request {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header.0, header.1)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_resolve_target_rebases_paths() {
        let origin = Url::parse("http://127.0.0.1:9090").unwrap();
        let uri: Uri = "/api/messages?limit=5".parse().unwrap();
        let target = resolve_target(&origin, &uri).unwrap();
        assert_eq!(target.as_str(), "http://127.0.0.1:9090/api/messages?limit=5");
    }

    #[test]
    fn test_resolve_target_keeps_absolute_urls() {
        let origin = Url::parse("http://127.0.0.1:9090").unwrap();
        let uri: Uri = "https://cdn.example/pic.png".parse().unwrap();
        let target = resolve_target(&origin, &uri).unwrap();
        assert_eq!(target.as_str(), "https://cdn.example/pic.png");
    }

    #[test]
    fn test_resolve_target_refuses_non_network_schemes() {
        let origin = Url::parse("http://127.0.0.1:9090").unwrap();
        let uri: Uri = "ftp://files.example/logo.png".parse().unwrap();
        assert!(matches!(resolve_target(&origin, &uri), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_classify_navigate_mode_wins() {
        let url = Url::parse("http://127.0.0.1:9090/x").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", "navigate".parse().unwrap());
        assert_eq!(classify(&headers, &url), ResourceKind::Document);

        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", "cors".parse().unwrap());
        headers.insert("sec-fetch-dest", "image".parse().unwrap());
        assert_eq!(classify(&headers, &url), ResourceKind::Image);
    }

    #[test]
    fn test_classify_by_sec_fetch_dest() {
        let url = Url::parse("http://127.0.0.1:9090/x").unwrap();
        let cases = [
            ("document", ResourceKind::Document),
            ("script", ResourceKind::Script),
            ("style", ResourceKind::Style),
            ("font", ResourceKind::Font),
            ("image", ResourceKind::Image),
            ("empty", ResourceKind::Fetch),
            ("audio", ResourceKind::Other),
        ];
        for (dest, expected) in cases {
            let mut headers = HeaderMap::new();
            headers.insert("sec-fetch-dest", dest.parse().unwrap());
            assert_eq!(classify(&headers, &url), expected, "dest {dest}");
        }
    }

    #[test]
    fn test_classify_falls_back_to_accept_then_extension() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", "application/json, text/plain".parse().unwrap());
        let url = Url::parse("http://127.0.0.1:9090/api/messages").unwrap();
        assert_eq!(classify(&headers, &url), ResourceKind::Fetch);

        let headers = HeaderMap::new();
        let script = Url::parse("http://127.0.0.1:19/assets/app.js").unwrap();
        assert_eq!(classify(&headers, &script), ResourceKind::Script);
        let font = Url::parse("http://127.0.0.1:9090/fonts/frank.woff2").unwrap();
        assert_eq!(classify(&headers, &font), ResourceKind::Font);
        let plain = Url::parse("http://127.0.0.1:9090/something").unwrap();
        assert_eq!(classify(&headers, &plain), ResourceKind::Other);
    }

    #[tokio::test]
    async fn test_navigation_success_is_stored_in_static_tier() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;

        let response = h
            .router
            .clone()
            .oneshot(get_with("/", ("sec-fetch-dest", "document")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tier = Tier::new(TierKind::Static, "v1");
        let cached = h.store.match_entry(&tier, "http://127.0.0.1:19/").await.unwrap();
        assert!(cached.is_some());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_navigation_error_status_is_returned_but_not_stored() {
        let upstream = StubUpstream::with_status(StatusCode::INTERNAL_SERVER_ERROR);
        let h = harness(upstream.clone()).await;

        let response = h
            .router
            .clone()
            .oneshot(get_with("/broken", ("sec-fetch-dest", "document")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let tier = Tier::new(TierKind::Static, "v1");
        let cached = h.store.match_entry(&tier, "http://127.0.0.1:19/broken").await.unwrap();
        assert!(cached.is_none());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_navigation_offline_serves_cached_shell() {
        let upstream = StubUpstream::failing();
        let h = harness(upstream.clone()).await;

        // Shell primed by an earlier generation of the process.
        let tier = Tier::new(TierKind::Static, "v1");
        let shell = StoredResponse {
            status: 200,
            headers: Some(vec![("content-type".into(), "text/html".into())]),
            body: b"<html>shell</html>".to_vec(),
            opaque: false,
        };
        h.store.put_entry(&tier, "http://127.0.0.1:19/", &shell).await.unwrap();

        let response = h
            .router
            .clone()
            .oneshot(get_with("/some/page", ("sec-fetch-dest", "document")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>shell</html>");
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_navigation_offline_without_shell_is_503() {
        let upstream = StubUpstream::failing();
        let h = harness(upstream.clone()).await;

        let response = h
            .router
            .clone()
            .oneshot(get_with("/some/page", ("sec-fetch-dest", "document")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_image_served_and_stored_in_runtime_tier() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;

        let response = h
            .router
            .clone()
            .oneshot(get_with("/media/logo.png", ("sec-fetch-dest", "image")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tier = Tier::new(TierKind::Runtime, "v1");
        let cached =
            h.store.match_entry(&tier, "http://127.0.0.1:19/media/logo.png").await.unwrap();
        assert!(cached.is_some());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_image_three_days_old_is_still_fresh() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;
        let tier = Tier::new(TierKind::Runtime, "v1");
        let url = "http://127.0.0.1:19/media/logo.png";

        h.router
            .clone()
            .oneshot(get_with("/media/logo.png", ("sec-fetch-dest", "image")))
            .await
            .unwrap();
        let aged = chrono::Utc::now().timestamp_millis() - 3 * 24 * 3600 * 1000;
        h.store.set_timestamp(&tier.meta_peer(), url, aged).await.unwrap();

        h.router
            .clone()
            .oneshot(get_with("/media/logo.png", ("sec-fetch-dest", "image")))
            .await
            .unwrap();

        h.revalidator.shutdown().await;
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_script_goes_to_static_tier() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;

        h.router.clone().oneshot(get("/assets/app.js")).await.unwrap();

        let static_tier = Tier::new(TierKind::Static, "v1");
        let runtime_tier = Tier::new(TierKind::Runtime, "v1");
        let url = "http://127.0.0.1:19/assets/app.js";
        assert!(h.store.match_entry(&static_tier, url).await.unwrap().is_some());
        assert!(h.store.match_entry(&runtime_tier, url).await.unwrap().is_none());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_cross_origin_response_stored_opaque() {
        let upstream = StubUpstream::cross_origin();
        let h = harness(upstream.clone()).await;

        let response = h
            .router
            .clone()
            .oneshot(get_with("https://cdn.example/pic.png", ("sec-fetch-dest", "image")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tier = Tier::new(TierKind::Runtime, "v1");
        let cached = h.store.match_entry(&tier, "https://cdn.example/pic.png").await.unwrap().unwrap();
        assert!(cached.opaque);
        assert!(cached.headers.is_none());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_network_scheme_is_rejected() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;

        let response =
            h.router.clone().oneshot(get("ftp://files.example/logo.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_post_bypasses_cache_and_fails_upstream() {
        let upstream = StubUpstream::ok();
        let h = harness(upstream.clone()).await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/messages")
            .header("content-type", "application/json")
            .body(Body::from("{\"title\":\"x\"}"))
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();

        // The stub engine was never consulted and the real forwarder found
        // nothing listening on the board origin.
        assert_eq!(upstream.calls(), 0);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(h.store.list_tiers().await.unwrap().is_empty());
        h.revalidator.shutdown().await;
    }

    #[tokio::test]
    async fn test_stored_headers_are_replayed() {
        let upstream = StubUpstream::failing();
        let h = harness(upstream.clone()).await;
        let tier = Tier::new(TierKind::Runtime, "v1");
        let entry = StoredResponse {
            status: 200,
            headers: Some(vec![("content-type".into(), "application/json".into())]),
            body: b"[]".to_vec(),
            opaque: false,
        };
        h.store.put_entry(&tier, "http://127.0.0.1:19/api/messages", &entry).await.unwrap();

        let response = h
            .router
            .clone()
            .oneshot(get_with("/api/messages", ("accept", "application/json")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap().to_str().unwrap(),
            "application/json"
        );
        h.revalidator.shutdown().await;
    }
}
