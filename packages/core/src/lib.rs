//! Shared data model, archive codecs, blob storage client, and the
//! request-coalescing dispatch fabric for the audio compression service:
//! the frontend's [`registry::PendingRequestRegistry`], the worker's
//! [`cache::DecompressionCache`], and the [`pipeline::Pipeline`] that ties
//! archive codecs to blob I/O.
//!
//! This crate has no opinion about transport: it is used by both the
//! `server` (frontend) and `worker` binaries, and knows nothing about HTTP or
//! AMQP. See the `bus` crate for the message transport abstraction.

pub mod archive;
pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod object;
pub mod pipeline;
pub mod registry;
pub mod wire;

pub use archive::{Archiver, TarArchiver, TarGzArchiver};
pub use blob::{BlobStore, InMemoryBlobStore, S3BlobStore};
pub use cache::DecompressionCache;
pub use config::AppConfig;
pub use error::{CoreError, Outcome};
pub use object::{FileEntry, ObjectRef, RequestKind};
pub use pipeline::Pipeline;
pub use registry::{PendingRequest, PendingRequestRegistry};
pub use wire::{ReplyBody, RequestBody};
