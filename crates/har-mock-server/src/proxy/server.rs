//! ProxyServer struct and main run loop.
//!
//! This module contains the ProxyServer struct which owns the dispatcher,
//! the accept loop that serves each connection on its own task, and the
//! optional Prometheus metrics listener.

use super::client::create_http_client;
use super::forwarding::{error_response, HyperForwarder};
use crate::config::Config;
use crate::dispatch::{DispatchError, Dispatcher, ProxyBody};
use crate::metrics;
use crate::store::TraceStore;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The mock/forwarding HTTP server.
pub struct ProxyServer {
    dispatcher: Arc<Dispatcher>,
    listen_addr: SocketAddr,
}

impl ProxyServer {
    /// Build the upstream client and dispatcher from configuration.
    pub fn new(config: &Config, store: Arc<TraceStore>) -> Result<Self, anyhow::Error> {
        let client = create_http_client(&config.connection_pool, config.upstream.tls_skip_verify)?;
        let forwarder = Arc::new(HyperForwarder::new(client));
        let dispatcher = Dispatcher::new(store, forwarder, config.api_url()?);
        Ok(Self::with_dispatcher(dispatcher, config.listen.socket_addr()?))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, listen_addr: SocketAddr) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            listen_addr,
        }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {e}", self.listen_addr))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown` is cancelled.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        info!("Listening on http://{}", listener.local_addr()?);
        info!("Forwarding unmatched requests to {}", self.dispatcher.upstream());

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Accept error: {}", e);
                        continue;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Server shutting down");
                    return Ok(());
                }
            };

            let server = Arc::clone(&server);
            let cancel = shutdown.child_token();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let request_cancel = cancel.clone();
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    let cancel = request_cancel.clone();
                    async move { server.handle_request(req, &cancel).await }
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(err) = result {
                    debug!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
        cancel: &CancellationToken,
    ) -> Result<Response<ProxyBody>, Infallible> {
        match self.dispatcher.dispatch(req.map(BoxBody::new), cancel).await {
            Ok(response) => Ok(response),
            Err(DispatchError::Cancelled) => Ok(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down",
            )),
        }
    }
}

/// Serve `GET /metrics` in the Prometheus text format until `shutdown` is cancelled.
pub async fn serve_metrics(
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    info!("Metrics available at http://{}/metrics", listener.local_addr()?);

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Metrics accept error: {}", e);
                    continue;
                }
            },
            _ = shutdown.cancelled() => return Ok(()),
        };

        tokio::spawn(async move {
            let service = service_fn(|req: Request<Incoming>| async move {
                Ok::<_, Infallible>(metrics_response(req.method(), req.uri().path()))
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Error serving metrics connection: {}", err);
            }
        });
    }
}

fn metrics_response(method: &Method, path: &str) -> Response<ProxyBody> {
    if method != Method::GET || path != "/metrics" {
        return error_response(StatusCode::NOT_FOUND, "Not Found");
    }
    let mut response = Response::new(crate::dispatch::full_body(metrics::collect_metrics()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_listener_serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(serve_metrics(listener, shutdown.clone()));

        metrics::record_mock_hit();
        for _ in 0..2 {
            let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
            assert_eq!(response.status(), 200);
            assert!(response.text().await.unwrap().contains("har_mock_requests_total"));
        }

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn test_metrics_response_routes() {
        assert_eq!(
            metrics_response(&Method::GET, "/metrics").status(),
            StatusCode::OK
        );
        assert_eq!(
            metrics_response(&Method::GET, "/other").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            metrics_response(&Method::POST, "/metrics").status(),
            StatusCode::NOT_FOUND
        );
    }
}
