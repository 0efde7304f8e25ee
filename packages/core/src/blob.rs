//! The object store abstraction: a byte-keyed KV with `download`/`upload`.
//!
//! The pipeline never talks to S3 directly; it goes through [`BlobStore`] so
//! tests can swap in [`InMemoryBlobStore`] without a live MinIO/S3 endpoint.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::CoreError;
use crate::object::ObjectRef;

/// An S3-compatible byte-keyed object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of `object`. A missing object is a
    /// non-retryable [`CoreError::NotFound`]; any other failure is a
    /// retryable [`CoreError::Transport`].
    async fn download(&self, object: &ObjectRef) -> Result<Vec<u8>, CoreError>;

    /// Write `bytes` to `object`, replacing any existing content.
    async fn upload(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), CoreError>;
}

/// [`BlobStore`] backed by an S3-compatible endpoint.
///
/// Credentials, region, and endpoint resolution are the caller's
/// responsibility: construct the [`aws_sdk_s3::Client`] with
/// `aws_config::load_defaults` plus whatever static override the deployment
/// needs (the source points its client at a local MinIO instance), then wrap
/// it here.
#[derive(Clone, Debug)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[tracing::instrument(name = "S3BlobStore::download", skip(self))]
    async fn download(&self, object: &ObjectRef) -> Result<Vec<u8>, CoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(SdkError::ServiceError(err)) if matches!(err.err(), GetObjectError::NoSuchKey(_)) => {
                return Err(CoreError::NotFound { object: object.clone() });
            }
            Err(err) => return Err(CoreError::transport(format!("download {object}: {err}"))),
        };

        output
            .body
            .collect()
            .await
            .map(|bytes| bytes.into_bytes().to_vec())
            .map_err(|err| CoreError::transport(format!("read download body for {object}: {err}")))
    }

    #[tracing::instrument(name = "S3BlobStore::upload", skip(self, bytes))]
    async fn upload(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), CoreError> {
        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| CoreError::transport(format!("upload {object}: {err}")))?;
        Ok(())
    }
}

/// An in-memory [`BlobStore`] double for tests.
///
/// Exercises the same coalescing and pipeline code paths the real S3 adapter
/// does, without a live broker or object store.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing `upload`.
    pub fn seed(&self, object: &ObjectRef, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .expect("in-memory blob store mutex poisoned")
            .insert((object.bucket.clone(), object.key.clone()), bytes.into());
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.objects
            .lock()
            .expect("in-memory blob store mutex poisoned")
            .contains_key(&(object.bucket.clone(), object.key.clone()))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn download(&self, object: &ObjectRef) -> Result<Vec<u8>, CoreError> {
        self.objects
            .lock()
            .expect("in-memory blob store mutex poisoned")
            .get(&(object.bucket.clone(), object.key.clone()))
            .cloned()
            .ok_or_else(|| CoreError::NotFound { object: object.clone() })
    }

    async fn upload(&self, object: &ObjectRef, bytes: Vec<u8>) -> Result<(), CoreError> {
        self.objects
            .lock()
            .expect("in-memory blob store mutex poisoned")
            .insert((object.bucket.clone(), object.key.clone()), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_upload_and_download() {
        let store = InMemoryBlobStore::new();
        let object = ObjectRef::new("audio", "bundle.tar");

        store.upload(&object, b"hello".to_vec()).await.expect("upload");
        let bytes = store.download(&object).await.expect("download");

        assert_eq!(bytes, b"hello");
        assert!(store.contains(&object));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = InMemoryBlobStore::new();
        let err = store
            .download(&ObjectRef::new("audio", "missing.tar"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
