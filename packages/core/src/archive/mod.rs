//! Archive codecs: tar and tar+gzip, each implementing the same
//! [`Archiver`] interface.
//!
//! Both codecs are stateless: they never touch the blob store and never
//! allocate temp files. They operate entirely on in-memory buffers, per the
//! pipeline's deliberate non-streaming design.

mod tar;
mod targz;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::object::FileEntry;

pub use tar::TarArchiver;
pub use targz::TarGzArchiver;

/// A stateless archive codec.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Encode `entries` into the archive's on-wire byte representation.
    async fn compress(&self, entries: &[FileEntry]) -> Result<Vec<u8>, CoreError>;

    /// Decode `bytes` into its member entries, in archive order.
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<FileEntry>, CoreError>;
}

/// The tar header mode every member is written with. The source never sets
/// ownership or mtime, and neither do we.
const MEMBER_MODE: u32 = 0o600;
