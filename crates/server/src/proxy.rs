//! Write-through proxying for requests the cache never touches.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use url::Url;

use shulboard_client::UpstreamResponse;
use shulboard_core::Error;

use crate::router::{GatewayState, read_body};

/// Forward a request to the board origin and relay the answer verbatim.
///
/// POST/PUT/DELETE traffic (the content API, mostly) flows through here.
/// The Host header is rewritten by the upstream client from the target URL;
/// everything else survives except hop-by-hop noise.
pub async fn passthrough(
    gateway: &GatewayState,
    method: Method,
    target: &Url,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, Error> {
    let limit = gateway.http.config().max_bytes;
    let body = read_body(body, limit).await?;

    let forwarded: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str() != "host")
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect();

    tracing::debug!(%method, %target, "forwarding upstream");
    let response = gateway.http.forward(method, target, &forwarded, body).await?;
    Ok(upstream_to_response(&response))
}

/// Relay a live upstream response without storing it.
pub fn upstream_to_response(upstream: &UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body.clone()));
    *response.status_mut() = upstream.status;

    for (name, value) in upstream.headers.iter() {
        let name = name.as_str();
        if name == "content-length" || name == "content-encoding" || name == "transfer-encoding"
            || name == "connection"
        {
            continue;
        }
        if let (Ok(name), Ok(value)) =
            (name.parse::<HeaderName>(), HeaderValue::from_bytes(value.as_bytes()))
        {
            response.headers_mut().append(name, value);
        }
    }

    response
}
