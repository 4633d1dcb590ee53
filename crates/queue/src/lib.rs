//! In-process implementation of the at-least-once queue contract.
//!
//! [`MemoryQueue`] backs the intake channel of a single manager in direct
//! mode and wires manager and workers together in integration tests. The
//! durable, cross-process implementation lives in `crackhash-db`.

pub mod memory;

pub use memory::{MemoryQueue, DEFAULT_VISIBILITY_TIMEOUT};
