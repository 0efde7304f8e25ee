//! The worker binary's library surface: the compress and decompress consumer
//! loops, split out of `main` so they can be driven in tests against an
//! in-memory bus and blob store.

pub mod compress;
pub mod decompress;
pub mod health;

pub use compress::run_compress_consumer;
pub use decompress::run_decompress_consumer;
