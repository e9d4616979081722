//! HAR mock server: replays responses captured in HAR files and forwards
//! everything else to the real API.
//!
//! ## Module Structure
//!
//! - `har`: capture file model and decoder
//! - `store`: concurrent, snapshot-based store of loaded captures
//! - `watcher`: directory scan and hot reload of capture files
//! - `resolver`: path matching against a store snapshot
//! - `dispatch`: per-request replay-or-forward decision and the `Forwarder` seam
//! - `proxy`: HTTP server, upstream client and hyper-backed forwarder
//! - `config`: YAML/CLI configuration
//! - `metrics`: Prometheus counters

pub mod config;
pub mod dispatch;
pub mod har;
pub mod metrics;
pub mod proxy;
pub mod resolver;
pub mod store;
pub mod watcher;

pub use dispatch::{DispatchError, Dispatcher, ForwardError, Forwarded, Forwarder, ProxyBody};
pub use har::{parse_har, HarError, HarFile};
pub use resolver::{resolve, MockMatch};
pub use store::{Snapshot, TraceStore};
pub use watcher::{ReloadSupervisor, WatchError};
