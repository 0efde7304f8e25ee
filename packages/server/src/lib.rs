//! The frontend binary's library surface: HTTP routes, shared state, and the
//! bus reply listener, split out of `main` so integration tests can build a
//! router against an in-memory bus without a live broker.

pub mod reply_listener;
pub mod routes;
pub mod state;

pub use state::AppState;
