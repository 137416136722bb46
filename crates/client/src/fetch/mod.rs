//! HTTP upstream access for the gateway.
//!
//! ### Origin tracking
//! - Requests carry absolute URLs; responses record the final URL after
//!   redirects.
//! - A response whose final URL sits on a different origin than the board
//!   origin is **opaque**: its body is kept but its headers are not
//!   replayed, mirroring how cross-origin fetches hide their metadata.
//!
//! ### Safety limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Per-request timeout (configurable; a hung upstream never blocks a
//!   strategy indefinitely)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, Method, StatusCode, header};
use std::time::{Duration, Instant};

use shulboard_core::{Error, StoredResponse};

/// Request headers that never survive proxying.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// User agent string (default: "shulboard-gateway/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Origin the board is served from; responses that end up elsewhere
    /// after redirects are treated as opaque.
    pub board_origin: Url,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: "shulboard-gateway/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            board_origin: Url::parse("http://127.0.0.1:9090").expect("static URL"),
        }
    }
}

impl UpstreamConfig {
    /// Build an upstream config from the application config.
    pub fn from_app(config: &shulboard_core::AppConfig) -> Result<Self, Error> {
        let board_origin = Url::parse(&config.upstream_origin)
            .map_err(|e| Error::InvalidUrl(format!("upstream_origin: {e}")))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.fetch_timeout(),
            board_origin,
            ..Self::default()
        })
    }
}

/// Response from an upstream fetch.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// The original URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub body: Bytes,
    /// Whether the final URL left the board origin
    pub cross_origin: bool,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl UpstreamResponse {
    /// Whether a strategy may persist this response.
    ///
    /// Only 200s and opaque cross-origin responses are cached; errors and
    /// redirect leftovers never poison a tier.
    pub fn is_storable(&self) -> bool {
        self.status == StatusCode::OK || self.cross_origin
    }

    /// Convert into the persistent form.
    ///
    /// Opaque responses drop their headers entirely. Same-origin responses
    /// keep everything except hop-by-hop and body-encoding headers, which
    /// describe the original transfer rather than the stored bytes.
    pub fn to_stored(&self) -> StoredResponse {
        let headers = if self.cross_origin {
            None
        } else {
            Some(
                self.headers
                    .iter()
                    .filter_map(|(name, value)| {
                        let name = name.as_str();
                        if HOP_BY_HOP.contains(&name)
                            || name == "content-length"
                            || name == "content-encoding"
                        {
                            return None;
                        }
                        let value = value.to_str().ok()?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect(),
            )
        };

        StoredResponse {
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
            opaque: self.cross_origin,
        }
    }
}

/// Fetching seam between strategies and the network.
///
/// The production implementation is [`HttpUpstream`]; tests substitute
/// counting stubs to observe exactly when strategies reach for the network.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a URL, returning body bytes and metadata.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only
    /// transport problems (connect, timeout, oversize body) fail.
    async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, Error>;
}

/// HTTP upstream client backed by reqwest.
pub struct HttpUpstream {
    http: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    /// Create a new upstream client with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::UpstreamUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Forward an arbitrary request upstream without any cache involvement.
    ///
    /// Used for the write-through half of the gateway: POST/PUT/DELETE and
    /// anything else the router declines to cache.
    pub async fn forward(
        &self,
        method: Method,
        url: &Url,
        headers: &[(String, String)],
        body: Bytes,
    ) -> Result<UpstreamResponse, Error> {
        let start = Instant::now();
        let mut request = self.http.request(method, url.clone());
        for (name, value) in headers {
            if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            request = request.header(name, value);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| classify_send_error(url, e))?;
        self.read_response(url.clone(), response, start).await
    }

    async fn read_response(
        &self,
        url: Url,
        response: reqwest::Response,
        start: Instant,
    ) -> Result<UpstreamResponse, Error> {
        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnreachable(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_bytes
            )));
        }

        let cross_origin = final_url.origin() != self.config.board_origin.origin();
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes, status {})",
            url,
            final_url,
            fetch_ms,
            body.len(),
            status.as_u16()
        );

        Ok(UpstreamResponse { url, final_url, status, headers, body, cross_origin, fetch_ms })
    }
}

fn classify_send_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::UpstreamUnreachable(format!("timeout fetching {url}: {err}"))
    } else {
        Error::UpstreamUnreachable(format!("network error fetching {url}: {err}"))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, Error> {
        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_send_error(url, e))?;
        self.read_response(url.clone(), response, start).await
    }
}
