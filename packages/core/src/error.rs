//! Error kinds surfaced by the core pipeline and archive codecs.
//!
//! Unlike the ambient CLI/HTTP glue (which reports failures as
//! `color_eyre::Report`), the pipeline needs a typed error so callers can
//! make ack/reject and retry decisions without string-matching.

use derive_more::{Display, Error};

use crate::object::ObjectRef;

/// A typed failure from the archive pipeline or blob store.
#[derive(Debug, Display, Error)]
pub enum CoreError {
    /// `key` does not end in `.tar`. Non-retryable in every path.
    #[display("key does not end in .tar: {key}")]
    InvalidKeyExtension { key: String },

    /// The named object does not exist in the store. Non-retryable.
    #[display("object not found: {object}")]
    NotFound { object: ObjectRef },

    /// Bus or blob-store I/O failure. Retryable in the compression path,
    /// non-retryable (surfaced to the caller) in the decompression path.
    #[display("transport error: {message}")]
    Transport { message: String },

    /// Malformed archive bytes or malformed message body. Non-retryable.
    #[display("decode error: {message}")]
    Decode { message: String },

    /// The frontend waiter exceeded its deadline without a reply.
    #[display("timed out waiting for a reply")]
    Timeout,

    /// The reply carried a non-null `error` field; propagated verbatim.
    #[display("{message}")]
    Remote { message: String },
}

impl CoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        CoreError::Transport { message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        CoreError::Decode { message: message.into() }
    }

    /// Whether this error should cause a requeue (reject-requeue) when it
    /// occurs in the compression pipeline. Only transport failures are
    /// retried; extension, not-found, and decode errors are never retried.
    pub fn retryable_in_compress(&self) -> bool {
        matches!(self, CoreError::Transport { .. })
    }
}

/// The `(error, should_retry)` pair the pipeline returns to the bus adapter
/// for the compression path, per the component design.
pub type Outcome<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable_in_compress() {
        assert!(CoreError::transport("boom").retryable_in_compress());
        assert!(!CoreError::InvalidKeyExtension { key: "a.zip".into() }.retryable_in_compress());
        assert!(!CoreError::NotFound { object: ObjectRef::new("b", "k.tar") }.retryable_in_compress());
        assert!(!CoreError::decode("bad tar header").retryable_in_compress());
    }
}
