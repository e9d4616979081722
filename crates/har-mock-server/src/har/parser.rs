//! Capture file decoding.

use super::types::HarFile;
use serde_json::{Map, Value};
use std::path::Path;

/// Errors produced while loading a capture file.
#[derive(Debug, thiserror::Error)]
pub enum HarError {
    /// The file could not be read (missing, locked, or still being written).
    #[error("failed to read HAR file: {0}")]
    Io(#[from] std::io::Error),
    /// The payload is not a structurally valid HAR document.
    #[error("invalid HAR document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid HAR document: top-level value must be a JSON object")]
    NotAnObject,
}

impl HarError {
    /// I/O failures are expected while a file is mid-copy and are retried by a later event.
    pub fn is_transient(&self) -> bool {
        matches!(self, HarError::Io(_))
    }
}

/// Decode a capture file from raw bytes.
///
/// Field names are matched case-insensitively. Each entry's match path is
/// computed here so that lookups never have to parse URLs.
pub fn parse_har(bytes: &[u8]) -> Result<HarFile, HarError> {
    let mut document: Value = serde_json::from_slice(bytes)?;
    if !document.is_object() {
        return Err(HarError::NotAnObject);
    }
    fold_keys(&mut document);

    let mut file: HarFile = serde_json::from_value(document)?;
    for entry in &mut file.log.entries {
        entry.match_path = entry.request.absolute_path().map(|p| p.to_lowercase());
    }
    Ok(file)
}

/// Read and decode a capture file from disk.
pub fn load_har_file(path: &Path) -> Result<HarFile, HarError> {
    let bytes = std::fs::read(path)?;
    parse_har(&bytes)
}

/// Lower-case every object key, recursively. Values are left untouched.
fn fold_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let folded: Map<String, Value> = std::mem::take(map)
                .into_iter()
                .map(|(key, mut child)| {
                    fold_keys(&mut child);
                    (key.to_lowercase(), child)
                })
                .collect();
            *map = folded;
        }
        Value::Array(items) => items.iter_mut().for_each(fold_keys),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "log": {
            "version": "1.2",
            "creator": { "name": "WebInspector", "version": "537.36" },
            "entries": [
                {
                    "startedDateTime": "2024-01-01T00:00:00.000Z",
                    "request": {
                        "method": "POST",
                        "url": "https://api.example.com/v1/Login?next=home",
                        "headers": [{ "name": "Accept", "value": "application/json" }]
                    },
                    "response": {
                        "status": 200,
                        "headers": [
                            { "name": "Content-Type", "value": "application/json" },
                            { "name": "Content-Length", "value": "11" }
                        ],
                        "content": { "size": 11, "mimeType": "application/json", "text": "{\"ok\":true}" }
                    },
                    "timings": { "blocked": -1, "wait": 50.25 }
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_sample_entry() {
        let file = parse_har(SAMPLE.as_bytes()).unwrap();
        assert_eq!(file.log.entries.len(), 1);

        let entry = &file.log.entries[0];
        assert_eq!(entry.request.method.as_deref(), Some("POST"));
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.headers.len(), 2);
        assert_eq!(
            entry.response.content.mime_type.as_deref(),
            Some("application/json")
        );
        assert_eq!(entry.response.content.text.as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(entry.timings.wait, 50.25);
        assert_eq!(entry.match_path(), Some("/v1/login"));
    }

    #[test]
    fn test_field_names_are_case_insensitive() {
        let raw = r#"{
            "LOG": { "Entries": [ {
                "Request": { "URL": "http://h/a" },
                "RESPONSE": { "Status": 404, "_ERROR": "net::ERR_ABORTED",
                              "Content": { "TEXT": "gone" } },
                "Timings": { "Wait": 5 }
            } ] }
        }"#;
        let file = parse_har(raw.as_bytes()).unwrap();
        let entry = &file.log.entries[0];
        assert_eq!(entry.request.url.as_deref(), Some("http://h/a"));
        assert_eq!(entry.response.status, 404);
        assert_eq!(entry.response.error.as_deref(), Some("net::ERR_ABORTED"));
        assert_eq!(entry.response.content.text.as_deref(), Some("gone"));
        assert_eq!(entry.timings.wait, 5.0);
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let file = parse_har(br#"{ "log": { "entries": [ {}, { "request": null, "response": { "headers": null, "content": null } } ] } }"#).unwrap();
        assert_eq!(file.log.entries.len(), 2);
        for entry in &file.log.entries {
            assert!(entry.request.url.is_none());
            assert!(entry.response.headers.is_empty());
            assert!(entry.response.content.text.is_none());
            assert_eq!(entry.response.status, 0);
            assert!(entry.match_path().is_none());
        }

        let empty = parse_har(b"{}").unwrap();
        assert!(empty.log.entries.is_empty());
        let null_log = parse_har(br#"{ "log": null }"#).unwrap();
        assert!(null_log.log.entries.is_empty());
    }

    #[test]
    fn test_relative_or_malformed_urls_have_no_match_path() {
        let raw = r#"{ "log": { "entries": [
            { "request": { "url": "/v1/relative" } },
            { "request": { "url": "not a url" } },
            { "request": { "url": "https://example.com" } }
        ] } }"#;
        let file = parse_har(raw.as_bytes()).unwrap();
        assert_eq!(file.log.entries[0].match_path(), None);
        assert_eq!(file.log.entries[1].match_path(), None);
        assert_eq!(file.log.entries[2].match_path(), Some("/"));
    }

    #[test]
    fn test_query_and_fragment_do_not_affect_match_path() {
        let long_query = format!("https://api.test/v1/long?q={}", "a".repeat(70_000));
        let file = parse_har(
            serde_json::json!({ "log": { "entries": [
                { "request": { "url": long_query } },
                { "request": { "url": "https://api.test/v1/search?filter={\"a\":1}" } },
                { "request": { "url": "https://api.test/v1/items?tag=a b" } },
                { "request": { "url": "https://api.test/v1/Docs#section|2" } }
            ] } })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let paths: Vec<_> = file.log.entries.iter().map(|e| e.match_path()).collect();
        assert_eq!(
            paths,
            vec![
                Some("/v1/long"),
                Some("/v1/search"),
                Some("/v1/items"),
                Some("/v1/docs"),
            ]
        );
    }

    #[test]
    fn test_dot_segments_are_resolved() {
        let raw = r#"{ "log": { "entries": [
            { "request": { "url": "https://h/v1/a/../login" } },
            { "request": { "url": "https://h/v1/./b/./c" } },
            { "request": { "url": "https://h/../../root" } },
            { "request": { "url": "https://h/v1/a/.." } },
            { "request": { "url": "https://h/v1/%2e%2e/raw" } }
        ] } }"#;
        let file = parse_har(raw.as_bytes()).unwrap();
        let paths: Vec<_> = file.log.entries.iter().map(|e| e.match_path()).collect();
        assert_eq!(
            paths,
            vec![
                Some("/v1/login"),
                Some("/v1/b/c"),
                Some("/root"),
                Some("/v1/"),
                Some("/v1/%2e%2e/raw"),
            ]
        );
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(matches!(parse_har(b""), Err(HarError::Parse(_))));
        assert!(matches!(
            parse_har(br#"{ "log": { "entries": [ { "request""#),
            Err(HarError::Parse(_))
        ));
        assert!(matches!(
            parse_har(br#"{ "log": { "entries": {} } }"#),
            Err(HarError::Parse(_))
        ));
        assert!(matches!(parse_har(b"[]"), Err(HarError::NotAnObject)));
        assert!(matches!(parse_har(b"null"), Err(HarError::NotAnObject)));
    }

    #[test]
    fn test_load_missing_file_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_har_file(&dir.path().join("missing.har")).unwrap_err();
        assert!(err.is_transient());
        assert!(!HarError::NotAnObject.is_transient());
    }
}
