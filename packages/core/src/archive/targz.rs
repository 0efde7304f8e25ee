use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use super::tar::{read_members, write_member};
use super::Archiver;
use crate::error::CoreError;
use crate::object::FileEntry;

/// `ustar` tar wrapped in gzip, at the `async-compression` default level.
///
/// `async_tar` speaks futures-io; `async_compression`'s tokio encoders speak
/// tokio-io. We bridge the two with `tokio_util::compat`, the same pattern
/// used for the CAS client's archive streaming.
#[derive(Clone, Copy, Debug, Default)]
pub struct TarGzArchiver;

impl TarGzArchiver {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Archiver for TarGzArchiver {
    async fn compress(&self, entries: &[FileEntry]) -> Result<Vec<u8>, CoreError> {
        let encoder = GzipEncoder::new(Vec::new());
        let mut builder = async_tar::Builder::new(encoder.compat_write());
        for entry in entries {
            write_member(&mut builder, entry).await?;
        }

        let mut encoder = builder
            .into_inner()
            .await
            .map_err(|err| CoreError::decode(format!("finish tar layer: {err}")))?
            .into_inner();

        encoder
            .shutdown()
            .await
            .map_err(|err| CoreError::decode(format!("finish gzip layer: {err}")))?;

        Ok(encoder.into_inner())
    }

    async fn extract(&self, bytes: &[u8]) -> Result<Vec<FileEntry>, CoreError> {
        let reader = BufReader::new(std::io::Cursor::new(bytes));
        let decoder = GzipDecoder::new(reader);
        let archive = async_tar::Archive::new(decoder.compat());
        read_members(&archive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn round_trips_entries_in_order() {
        let archiver = TarGzArchiver::new();
        let entries = vec![
            FileEntry::new("a.wav", vec![3u8; 4096]),
            FileEntry::new("nested/b.wav", vec![9u8; 64]),
        ];

        let bytes = archiver.compress(&entries).await.expect("compress");
        assert_eq!(&bytes[0..2], &[0x1f, 0x8b], "gzip magic bytes");

        let round_tripped = archiver.extract(&bytes).await.expect("extract");
        assert_eq!(round_tripped, entries);
    }

    #[tokio::test]
    async fn rejects_non_gzip_input() {
        let archiver = TarGzArchiver::new();
        let err = archiver.extract(b"not a gzip stream").await.unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }
}
