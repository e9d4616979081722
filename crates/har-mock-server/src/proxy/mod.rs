//! HTTP host around the mock engine.
//!
//! This module provides:
//! - The accept loop serving every path and method through the `Dispatcher`
//! - A hyper-backed `Forwarder` that relays unmatched requests upstream
//! - Header handling for replayed captures
//! - An optional Prometheus metrics listener
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and main run loop
//! - `forwarding` - Request forwarding to the upstream API
//! - `client` - HTTP client creation and configuration
//! - `headers` - Replay header deny-list and copying
//! - `tls` - Upstream certificate verification override

mod client;
mod forwarding;
pub mod headers;
mod server;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{error_response, upstream_uri, HyperForwarder};
pub use server::{serve_metrics, ProxyServer};
