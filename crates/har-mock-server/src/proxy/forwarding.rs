//! Request forwarding to the upstream API.
//!
//! Requests no capture entry answers are streamed to the upstream as-is;
//! only the `Host` header is dropped so the client derives it from the
//! upstream URL.

use super::client::HttpClient;
use crate::dispatch::{full_body, ForwardError, Forwarded, Forwarder, ProxyBody};
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Request, Response, StatusCode, Uri};
use tracing::debug;

/// Helper function to create a JSON error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("application/json"));
    response
}

/// Join the upstream base URL with the inbound path and query.
pub fn upstream_uri(upstream: &str, uri: &Uri) -> Result<Uri, ForwardError> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = format!("{upstream}{path}");
    target.parse().map_err(|e: hyper::http::uri::InvalidUri| ForwardError::InvalidUri {
        uri: target.clone(),
        reason: e.to_string(),
    })
}

/// [`Forwarder`] backed by the pooled hyper client.
pub struct HyperForwarder {
    client: HttpClient,
}

impl HyperForwarder {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(&self, request: Request<ProxyBody>, upstream: &str) -> Forwarded {
        let (mut parts, body) = request.into_parts();

        let target = match upstream_uri(upstream, &parts.uri) {
            Ok(target) => target,
            Err(e) => {
                return Forwarded {
                    response: error_response(StatusCode::BAD_GATEWAY, "Bad Gateway"),
                    error: Some(e),
                }
            }
        };
        debug!("Forwarding {} {} to {}", parts.method, parts.uri, target);

        parts.headers.remove(HOST);
        let mut upstream_req = Request::new(body);
        *upstream_req.method_mut() = parts.method;
        *upstream_req.uri_mut() = target;
        *upstream_req.headers_mut() = parts.headers;

        match self.client.request(upstream_req).await {
            Ok(upstream_response) => Forwarded::ok(upstream_response.map(BoxBody::new)),
            Err(e) => Forwarded {
                response: error_response(StatusCode::BAD_GATEWAY, "Bad Gateway"),
                error: Some(ForwardError::Transport(e.to_string())),
            },
        }
    }
}
