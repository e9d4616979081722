//! Path matching against loaded capture entries.
//!
//! Matching is path-only: method, query string, headers and body of the
//! inbound request are ignored. The first eligible entry in snapshot order
//! wins.

use crate::har::HarEntry;
use crate::store::Snapshot;

/// `_error` value browsers record for requests cancelled before completion.
pub const ABORTED_SENTINEL: &str = "net::ERR_ABORTED";

/// An entry selected to answer a request.
#[derive(Debug, Clone, Copy)]
pub struct MockMatch<'a> {
    /// Key of the capture file the entry came from.
    pub file: &'a str,
    pub entry: &'a HarEntry,
}

/// Find the first entry whose absolute URL path equals `request_path`, ignoring case.
pub fn resolve<'a>(snapshot: &'a Snapshot, request_path: &str) -> Option<MockMatch<'a>> {
    let wanted = request_path.to_lowercase();
    snapshot
        .entries()
        .find(|(_, entry)| is_eligible(entry, &wanted))
        .map(|(file, entry)| MockMatch { file, entry })
}

fn is_eligible(entry: &HarEntry, wanted: &str) -> bool {
    entry.match_path() == Some(wanted)
        && entry.response.error.as_deref() != Some(ABORTED_SENTINEL)
}
