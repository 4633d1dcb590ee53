//! Crack manager library.
//!
//! Exposes the coordinator building blocks (config, state, error handling,
//! routes, the dispatch engine and background loops) so integration tests
//! and the binary entrypoint can both access them.

pub mod background;
pub mod client;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod pool;
pub mod router;
pub mod routes;
pub mod state;
