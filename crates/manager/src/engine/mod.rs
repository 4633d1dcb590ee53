//! Request execution engine.
//!
//! Contains the intake dispatcher, worker probes, progress polling and
//! result ingestion.

pub mod dispatcher;
pub mod health;
pub mod progress;
pub mod results;
