//! The archive transformation pipeline: `fetch blob → extract → [transform]
//! → re-encode → deliver`, shared by the compress and decompress flows.
//!
//! Grounded on the source's `CompressionUsecase.DoCompression` /
//! `DoDecompression` (`internal/compression/usecase.go`): same five-step
//! shape, same retryability contract. Unlike the source, every invocation
//! here allocates fresh buffers for both flows — the source's buffer reuse
//! for compress is an optimization, not a correctness requirement, and
//! reuse across concurrent invocations on one worker is unsafe (see design
//! notes).

use std::path::Path;

use uuid::Uuid;

use crate::archive::{Archiver, TarArchiver, TarGzArchiver};
use crate::blob::BlobStore;
use crate::error::CoreError;
use crate::object::{FileEntry, ObjectRef};

/// The wav↔flac transcode hook from the source
/// (`pkg/audio_converter/audio_converter.go`). A documented no-op: every
/// member passes through unchanged. This is the single seam a real
/// transcode would slot into without touching the surrounding pipeline.
fn transcode(entries: Vec<FileEntry>) -> Vec<FileEntry> {
    entries
}

/// Runs the compress and decompress flows against a [`BlobStore`], using a
/// plain tar codec for the uncompressed side and a tar+gzip codec for the
/// compressed side.
pub struct Pipeline<S> {
    store: S,
    tar: TarArchiver,
    targz: TarGzArchiver,
}

impl<S: BlobStore> Pipeline<S> {
    pub fn new(store: S) -> Self {
        Self { store, tar: TarArchiver::new(), targz: TarGzArchiver::new() }
    }

    /// The underlying blob store, for callers (tests, the worker binary)
    /// that need to inspect or share it directly.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compress `object` (an uncompressed `.tar`) and upload the tar+gzip
    /// result to its compressed counterpart (`bucket + "-compressed"`,
    /// `key + ".gz"`).
    ///
    /// Returns `(error, should_retry)` on failure, matching the source's
    /// `(error, bool)` contract — the bus adapter decides ack vs. reject
    /// from `should_retry`.
    #[tracing::instrument(name = "Pipeline::compress", skip(self), fields(%object))]
    pub async fn compress(&self, object: &ObjectRef) -> Result<(), (CoreError, bool)> {
        if !object.has_tar_extension() {
            return Err((CoreError::InvalidKeyExtension { key: object.key.clone() }, false));
        }

        let bytes = self.store.download(object).await.map_err(|err| {
            let retry = err.retryable_in_compress();
            (err, retry)
        })?;

        let entries = self.tar.extract(&bytes).await.map_err(|err| (err, false))?;
        let entries = transcode(entries);
        let encoded = self.targz.compress(&entries).await.map_err(|err| (err, true))?;

        let destination = object.compressed();
        self.store.upload(&destination, encoded).await.map_err(|err| (err, true))?;

        Ok(())
    }

    /// Decompress `object`'s compressed counterpart and write the
    /// re-encoded plain-tar result to a fresh temp file under `work_dir`.
    /// Returns the temp file's path.
    #[tracing::instrument(name = "Pipeline::decompress", skip(self), fields(%object))]
    pub async fn decompress(&self, object: &ObjectRef, work_dir: &Path) -> Result<String, CoreError> {
        if !object.has_tar_extension() {
            return Err(CoreError::InvalidKeyExtension { key: object.key.clone() });
        }

        let source = object.compressed();
        let bytes = self.store.download(&source).await?;

        let entries = self.targz.extract(&bytes).await?;
        let entries = transcode(entries);
        let encoded = self.tar.compress(&entries).await?;

        write_temp_file(work_dir, &encoded).await
    }
}

/// Write `bytes` to a fresh file named `decompressed_audio_<uuid>.tar` in
/// `dir`, mirroring the source's `os.CreateTemp(".", "decompressed_audio_*.tar")`.
async fn write_temp_file(dir: &Path, bytes: &[u8]) -> Result<String, CoreError> {
    let path = dir.join(format!("decompressed_audio_{}.tar", Uuid::new_v4()));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| CoreError::transport(format!("write temp file {path:?}: {err}")))?;
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::blob::InMemoryBlobStore;

    fn sample_archive() -> Vec<u8> {
        let bytes = futures::executor::block_on(TarArchiver::new().compress(&[FileEntry::new("a.wav", vec![0u8; 1024])]));
        bytes.expect("build sample tar")
    }

    #[tokio::test]
    async fn compress_uploads_tar_gz_to_the_compressed_object() {
        let store = InMemoryBlobStore::new();
        let object = ObjectRef::new("audio", "bundle.tar");
        store.seed(&object, sample_archive());

        let pipeline = Pipeline::new(store);
        pipeline.compress(&object).await.expect("compress");

        let compressed = object.compressed();
        assert!(pipeline.store.contains(&compressed));

        let bytes = pipeline.store.download(&compressed).await.expect("download compressed");
        let entries = TarGzArchiver::new().extract(&bytes).await.expect("extract");
        assert_eq!(entries, vec![FileEntry::new("a.wav", vec![0u8; 1024])]);
    }

    #[tokio::test]
    async fn compress_rejects_non_tar_keys_without_touching_the_store() {
        let store = InMemoryBlobStore::new();
        let pipeline = Pipeline::new(store);
        let object = ObjectRef::new("audio", "bundle.zip");

        let (err, should_retry) = pipeline.compress(&object).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidKeyExtension { .. }));
        assert!(!should_retry);
        assert!(!pipeline.store.contains(&object.compressed()));
    }

    #[tokio::test]
    async fn compress_missing_object_is_not_retryable() {
        let store = InMemoryBlobStore::new();
        let pipeline = Pipeline::new(store);
        let object = ObjectRef::new("audio", "missing.tar");

        let (err, should_retry) = pipeline.compress(&object).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(!should_retry);
    }

    #[tokio::test]
    async fn decompress_round_trips_through_tar_gz_and_back_to_plain_tar() {
        let store = InMemoryBlobStore::new();
        let object = ObjectRef::new("audio", "bundle.tar");
        let entries = vec![FileEntry::new("a.wav", vec![0u8; 1024])];
        let gz = TarGzArchiver::new().compress(&entries).await.expect("build compressed sample");
        store.seed(&object.compressed(), gz);

        let pipeline = Pipeline::new(store);
        let work_dir = std::env::temp_dir().join(format!("pipeline-test-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await.expect("create work dir");

        let path = pipeline.decompress(&object, &work_dir).await.expect("decompress");
        assert!(path.starts_with(work_dir.to_string_lossy().as_ref()));
        assert!(path.contains("decompressed_audio_"));

        let written = tokio::fs::read(&path).await.expect("read temp file");
        let round_tripped = TarArchiver::new().extract(&written).await.expect("extract written tar");
        assert_eq!(round_tripped, entries);
    }
}
