//! Core data model: the identity of a blob, the kind of work requested on
//! it, and the in-memory shape of a single archive member.

use std::fmt;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifies a blob in the object store by `(bucket, key)`.
///
/// Keys are expected to end in `.tar`; callers should validate this with
/// [`ObjectRef::has_tar_extension`] before using an `ObjectRef` in the
/// pipeline.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{bucket}/{key}")]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// True if `key` ends in `.tar`, the only extension the pipeline accepts.
    pub fn has_tar_extension(&self) -> bool {
        self.key.ends_with(".tar")
    }

    /// The `ObjectRef` naming the compressed form of this object: stored at
    /// `(bucket + "-compressed", key + ".gz")`.
    pub fn compressed(&self) -> ObjectRef {
        ObjectRef::new(format!("{}-compressed", self.bucket), format!("{}.gz", self.key))
    }
}

/// One member of a tar archive, held fully in memory.
///
/// `name` is a relative path inside the archive; `body` is the member's raw
/// content. Members carry no mtime, ownership, or extended attributes — see
/// the `archive` module for the on-wire header shape.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FileEntry {
    pub name: String,
    pub body: Vec<u8>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.body.len())
    }
}

/// The kind of work a request asks the worker to perform.
///
/// Serializes to the lowercase strings used on the wire (`"compress"` /
/// `"decompress"`), matching `RequestBody::kind` and the bus routing keys in
/// the `bus` crate.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[display("compress")]
    Compress,
    #[display("decompress")]
    Decompress,
}

impl RequestKind {
    /// The AMQP routing key a request of this kind is published under.
    pub const fn routing_key(self) -> &'static str {
        match self {
            RequestKind::Compress => "compress",
            RequestKind::Decompress => "decompress",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compressed_object_ref_shape() {
        let object = ObjectRef::new("audio", "bundle.tar");
        let compressed = object.compressed();
        assert_eq!(compressed.bucket, "audio-compressed");
        assert_eq!(compressed.key, "bundle.tar.gz");
    }

    #[test]
    fn tar_extension_check() {
        assert!(ObjectRef::new("audio", "bundle.tar").has_tar_extension());
        assert!(!ObjectRef::new("audio", "bundle.zip").has_tar_extension());
    }

    #[test]
    fn request_kind_wire_format() {
        assert_eq!(serde_json::to_string(&RequestKind::Compress).unwrap(), "\"compress\"");
        assert_eq!(serde_json::to_string(&RequestKind::Decompress).unwrap(), "\"decompress\"");
    }
}
