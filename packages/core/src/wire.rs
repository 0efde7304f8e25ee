//! JSON bodies carried inside bus message payloads.
//!
//! These are the only two shapes that cross the wire between `server` and
//! `worker`; HTTP never sees them directly.

use serde::{Deserialize, Serialize};

use crate::object::RequestKind;

/// Body of a request message published to `compress_request` or
/// `decompress_request`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RequestBody {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
}

/// Body of a reply message published to `compression_response` or
/// `decompression_response`.
///
/// `result_type = "FS"` indicates `result_address` is a filesystem path
/// readable by the frontend (the only result type this rewrite produces).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ReplyBody {
    pub bucket: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub result_type: String,
    #[serde(default)]
    pub result_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyBody {
    pub const RESULT_TYPE_FS: &'static str = "FS";

    /// Build a success reply pointing at a filesystem path.
    pub fn fs_result(bucket: impl Into<String>, key: impl Into<String>, kind: RequestKind, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            kind,
            result_type: Self::RESULT_TYPE_FS.to_string(),
            result_address: path.into(),
            error: None,
        }
    }

    /// Build an error reply carrying no result.
    pub fn error(bucket: impl Into<String>, key: impl Into<String>, kind: RequestKind, message: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            kind,
            result_type: String::new(),
            result_address: String::new(),
            error: Some(message.into()),
        }
    }
}
