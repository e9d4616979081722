//! Per-request dispatch: replay a captured response or forward upstream.

use crate::har::HarEntry;
use crate::metrics;
use crate::proxy::headers::apply_recorded_headers;
use crate::resolver::resolve;
use crate::store::TraceStore;
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Body type shared by inbound requests, mock responses and forwarded responses.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Transport failure reported by a [`Forwarder`].
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// Outcome of forwarding one request.
///
/// `response` is always returned to the client unchanged; `error` carries
/// failure detail for logging when the forwarder had to synthesize it.
pub struct Forwarded {
    pub response: Response<ProxyBody>,
    pub error: Option<ForwardError>,
}

impl Forwarded {
    pub fn ok(response: Response<ProxyBody>) -> Self {
        Self {
            response,
            error: None,
        }
    }
}

/// Passthrough transport for requests no capture entry answers.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Relay `request` to `upstream` (a base URL without trailing slash).
    async fn forward(&self, request: Request<ProxyBody>, upstream: &str) -> Forwarded;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request cancelled before the mock response was written")]
    Cancelled,
}

/// Wrap a complete in-memory body as a [`ProxyBody`].
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

/// Resolves each request against the loaded captures and falls back to the forwarder.
pub struct Dispatcher {
    store: Arc<TraceStore>,
    forwarder: Arc<dyn Forwarder>,
    upstream: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<TraceStore>,
        forwarder: Arc<dyn Forwarder>,
        upstream: impl Into<String>,
    ) -> Self {
        Self {
            store,
            forwarder,
            upstream: upstream.into(),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Handle one request.
    ///
    /// `cancel` aborts the replayed latency wait; nothing is written once it fires.
    pub async fn dispatch(
        &self,
        request: Request<ProxyBody>,
        cancel: &CancellationToken,
    ) -> Result<Response<ProxyBody>, DispatchError> {
        let mock = {
            let snapshot = self.store.snapshot();
            resolve(&snapshot, request.uri().path()).map(|found| {
                info!(
                    "Mocking API {}, Status {} ({})",
                    request.uri().path(),
                    found.entry.response.status,
                    found.file
                );
                (found.entry.timings.wait_duration(), mock_response(found.entry))
            })
        };

        match mock {
            Some((wait, response)) => {
                metrics::record_mock_hit();
                replay_wait(wait, cancel).await?;
                Ok(response)
            }
            None => {
                metrics::record_forwarded();
                let Forwarded { response, error } =
                    self.forwarder.forward(request, &self.upstream).await;
                if let Some(err) = error {
                    metrics::record_forward_error();
                    error!("{}", err);
                }
                Ok(response)
            }
        }
    }
}

/// Suspend for the recorded latency without holding a worker thread.
async fn replay_wait(wait: Duration, cancel: &CancellationToken) -> Result<(), DispatchError> {
    if cancel.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }
    if wait.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DispatchError::Cancelled),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}

/// Build the synthesized response for a captured entry.
fn mock_response(entry: &HarEntry) -> Response<ProxyBody> {
    let recorded = entry.response.status;
    let status = u16::try_from(recorded)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or_else(|| {
            warn!(
                "Captured status {} is not a valid HTTP status, replaying as 500",
                recorded
            );
            StatusCode::INTERNAL_SERVER_ERROR
        });

    let body = entry.response.content.text.clone().unwrap_or_default();
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    apply_recorded_headers(response.headers_mut(), &entry.response.headers);
    response
}
