//! Domain core for the distributed hash-cracking services.
//!
//! Holds everything both the manager and the workers agree on: the
//! keyspace partitioning, digest functions, the request lifecycle, the
//! wire messages, and the store / queue seams with their in-process
//! implementations.

pub mod digest;
pub mod error;
pub mod partition;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod request;
pub mod retry;
pub mod status;
pub mod store;
pub mod types;
pub mod validation;
