use async_trait::async_trait;
use futures::io::Cursor as FuturesCursor;
use futures::stream::StreamExt;
use futures::AsyncReadExt;

use super::{Archiver, MEMBER_MODE};
use crate::error::CoreError;
use crate::object::FileEntry;

/// Plain `ustar` tar, no compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct TarArchiver;

impl TarArchiver {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn compress(&self, entries: &[FileEntry]) -> Result<Vec<u8>, CoreError> {
        let mut builder = async_tar::Builder::new(FuturesCursor::new(Vec::new()));
        for entry in entries {
            write_member(&mut builder, entry).await?;
        }
        let cursor = builder
            .into_inner()
            .await
            .map_err(|err| CoreError::decode(format!("finish tar archive: {err}")))?;
        Ok(cursor.into_inner())
    }

    async fn extract(&self, bytes: &[u8]) -> Result<Vec<FileEntry>, CoreError> {
        let archive = async_tar::Archive::new(FuturesCursor::new(bytes));
        read_members(&archive).await
    }
}

/// Write one member's `ustar` header and body into `builder`.
///
/// Shared between the plain and gzip-wrapped tar codecs since the tar layer
/// itself is identical either way.
pub(super) async fn write_member<W>(builder: &mut async_tar::Builder<W>, entry: &FileEntry) -> Result<(), CoreError>
where
    W: futures::io::AsyncWrite + Unpin + Send,
{
    let mut header = async_tar::Header::new_ustar();
    header.set_mode(MEMBER_MODE);
    header.set_size(entry.body.len() as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, entry.name.as_str(), entry.body.as_slice())
        .await
        .map_err(|err| CoreError::decode(format!("write tar member {:?}: {err}", entry.name)))
}

/// Read every member out of `archive` into memory, preserving order.
pub(super) async fn read_members<R>(archive: &async_tar::Archive<R>) -> Result<Vec<FileEntry>, CoreError>
where
    R: futures::io::AsyncRead + Unpin + Send + Sync,
{
    let mut entries = archive
        .entries()
        .map_err(|err| CoreError::decode(format!("read tar entries: {err}")))?;

    let mut out = Vec::new();
    while let Some(entry) = entries.next().await {
        let mut entry = entry.map_err(|err| CoreError::decode(format!("read tar entry: {err}")))?;
        let name = entry
            .path()
            .map_err(|err| CoreError::decode(format!("read tar entry path: {err}")))?
            .to_string_lossy()
            .into_owned();

        let mut body = Vec::new();
        entry
            .read_to_end(&mut body)
            .await
            .map_err(|err| CoreError::decode(format!("read tar entry body {name:?}: {err}")))?;

        out.push(FileEntry::new(name, body));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn round_trips_entries_in_order() {
        let archiver = TarArchiver::new();
        let entries = vec![
            FileEntry::new("a.wav", vec![0u8; 1024]),
            FileEntry::new("nested/b.wav", vec![7u8; 32]),
        ];

        let bytes = archiver.compress(&entries).await.expect("compress");
        let round_tripped = archiver.extract(&bytes).await.expect("extract");

        assert_eq!(round_tripped, entries);
    }

    #[tokio::test]
    async fn extract_empty_archive_yields_no_entries() {
        let archiver = TarArchiver::new();
        let bytes = archiver.compress(&[]).await.expect("compress");
        let entries = archiver.extract(&bytes).await.expect("extract");
        assert!(entries.is_empty());
    }
}
