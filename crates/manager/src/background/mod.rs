//! Background tasks.
//!
//! Each submodule provides a long-running async loop intended to be
//! spawned via `tokio::spawn`. All loops accept a [`CancellationToken`]
//! for graceful shutdown.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod health_monitor;
pub mod result_consumer;
pub mod timeout_sweep;
