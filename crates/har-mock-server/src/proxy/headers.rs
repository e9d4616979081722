//! Header handling for replayed responses.
//!
//! Captured headers are copied onto mock responses except for a small
//! deny-list: framing headers the transport recomputes for the body we
//! actually send, and request-scoped trace context.

use crate::har::HarHeader;
use hyper::header::{Entry, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Recorded response headers never replayed (compared case-insensitively).
pub const REPLAY_DENYLIST: [&str; 4] = [
    "content-length",
    "content-encoding",
    "traceparent",
    "tracestate",
];

pub fn is_denied(name: &str) -> bool {
    REPLAY_DENYLIST
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(name))
}

/// Copy recorded headers into `headers`.
///
/// The first value seen for a name wins. Headers without a name, deny-listed
/// headers, and names/values that are not valid HTTP are skipped.
pub fn apply_recorded_headers(headers: &mut HeaderMap, recorded: &[HarHeader]) {
    for header in recorded {
        let Some(name) = header.name.as_deref() else {
            continue;
        };
        if is_denied(name) {
            continue;
        }

        let value = header.value.as_deref().unwrap_or("");
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            debug!("Skipping recorded header that is not valid HTTP: {}", name);
            continue;
        };

        if let Entry::Vacant(slot) = headers.entry(name) {
            slot.insert(value);
        }
    }
}
