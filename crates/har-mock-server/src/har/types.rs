//! Typed HAR (HTTP Archive) document model.
//!
//! Only the subset of the format the mock server consumes is modelled.
//! Every field tolerates being absent or `null` in the source document;
//! unknown fields are ignored.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// A parsed capture file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarFile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub log: HarLog,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarLog {
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<HarEntry>,
}

/// One captured request/response pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub request: HarRequest,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: HarResponse,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timings: HarTimings,
    /// Lower-cased absolute path of `request.url`, computed at load time.
    /// `None` when the URL is missing or not absolute.
    #[serde(skip)]
    pub(crate) match_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<HarHeader>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: HarContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,
    /// Browser-specific failure marker, e.g. `net::ERR_ABORTED`.
    #[serde(default, rename = "_error")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<HarHeader>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: HarContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarHeader {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarContent {
    #[serde(default, rename = "mimetype")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarTimings {
    /// Time spent waiting for the first response byte, in milliseconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub wait: f64,
}

impl HarEntry {
    /// The path this entry answers for, already case-folded.
    pub fn match_path(&self) -> Option<&str> {
        self.match_path.as_deref()
    }
}

impl HarRequest {
    /// Path component of `url` when it is an absolute URL (scheme and authority present),
    /// with `.` and `..` segments resolved.
    ///
    /// Query and fragment are cut off before parsing; they never take part in
    /// matching, and recorded queries are often too long or too loosely
    /// escaped for a strict URI parser.
    pub fn absolute_path(&self) -> Option<String> {
        let url = self.url.as_deref()?;
        let end = url.find(['?', '#']).unwrap_or(url.len());
        let uri: hyper::Uri = url[..end].parse().ok()?;
        uri.scheme()?;
        uri.authority()?;
        Some(remove_dot_segments(uri.path()))
    }
}

/// Resolve `.` and `..` segments of an absolute path (RFC 3986, section 5.2.4).
fn remove_dot_segments(path: &str) -> String {
    if !path.split('/').any(|segment| segment == "." || segment == "..") {
        return path.to_string();
    }

    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    let mut output: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.into_iter().enumerate() {
        match segment {
            "." => {}
            ".." => {
                output.pop();
            }
            other => output.push(other),
        }
        // A trailing dot segment leaves the path ending in '/'
        if i == last && (segment == "." || segment == "..") {
            output.push("");
        }
    }
    format!("/{}", output.join("/"))
}

impl HarTimings {
    /// Recorded wait as a duration. Negative or non-finite values mean "not applicable".
    pub fn wait_duration(&self) -> Duration {
        if self.wait.is_finite() && self.wait > 0.0 {
            Duration::try_from_secs_f64(self.wait / 1000.0).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
