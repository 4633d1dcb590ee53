//! Crack worker library.
//!
//! The task executor, its result sinks, the loops that feed it and the
//! HTTP surface the manager probes.

pub mod config;
pub mod error;
pub mod executor;
pub mod router;
pub mod routes;
pub mod runner;
pub mod sink;
pub mod state;
