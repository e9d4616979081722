//! HTTP client creation and configuration.
//!
//! Builds the pooled client the forwarder uses to reach the upstream API.

use super::tls::NoVerifier;
use crate::config::ConnectionPoolConfig;
use crate::dispatch::ProxyBody;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tracing::{info, warn};

/// Type alias for the HTTP client used by the forwarder.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ProxyBody>;

/// Create a shared HTTP client with connection pooling.
///
/// Redirects are never followed and bodies are never decompressed: the
/// client relays exactly what the upstream sends.
pub fn create_http_client(
    pool: &ConnectionPoolConfig,
    skip_tls_verify: bool,
) -> Result<HttpClient, anyhow::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    // Another component may already have installed a process default
    let _ = provider.as_ref().clone().install_default();

    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(pool.keepalive()));
    http_connector.set_connect_timeout(Some(pool.connect_timeout()));
    http_connector.enforce_http(false);

    let https_connector = if skip_tls_verify {
        warn!("TLS certificate verification DISABLED for the upstream (development/testing only)");
        let tls = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new(provider)))
            .with_no_client_auth();
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    } else {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| anyhow::anyhow!("Failed to load native root certificates: {e}"))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    };

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool.idle_timeout())
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    info!(
        "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s",
        pool.max_idle_per_host, pool.idle_timeout_secs, pool.keepalive_timeout_secs
    );

    Ok(http_client)
}
