//! HAR capture files: typed model and decoder.
//!
//! ## Module Structure
//!
//! - `types`: serde model of the consumed HAR subset
//! - `parser`: case-insensitive decoding and load-time path indexing

mod parser;
mod types;

pub use parser::{load_har_file, parse_har, HarError};
pub use types::{
    HarContent, HarEntry, HarFile, HarHeader, HarLog, HarRequest, HarResponse, HarTimings,
};
