//! Request progress aggregation.
//!
//! Worker progress endpoints report the fraction of their *current or last*
//! scan, so a worker whose part already finished keeps reporting `1.0`.
//! Subtracting the received part count removes those stale contributions
//! and the `R / P` term adds the completed share back on the request's own
//! scale:
//!
//! ```text
//! progress% = ((Σ f_i − R) / N + R / P) × 100
//! ```
//!
//! `N` is the number of workers queried. The formula assumes `N == P`;
//! resizing the pool while a request is in flight is unsupported.

use crate::request::CrackRequest;
use crate::status::RequestStatus;

/// Combine worker fractions with completion accounting into a percentage
/// in `0.0..=100.0`.
pub fn aggregate_percent(worker_fractions: &[f64], parts_received: u32, part_count: u32) -> f64 {
    if part_count == 0 {
        return 0.0;
    }
    let received = f64::from(parts_received);
    let completed_share = received / f64::from(part_count);
    if worker_fractions.is_empty() {
        return (completed_share * 100.0).clamp(0.0, 100.0);
    }

    let sum: f64 = worker_fractions.iter().map(|f| f.clamp(0.0, 1.0)).sum();
    let in_flight = (sum - received) / worker_fractions.len() as f64;
    ((in_flight + completed_share) * 100.0).clamp(0.0, 100.0)
}

/// Percentage for a request, given the fractions polled from the pool.
///
/// Fractions are only consulted for IN_PROGRESS requests; NEW and ERROR
/// report `0`, READY reports `100`.
pub fn request_percent(request: &CrackRequest, worker_fractions: &[f64]) -> f64 {
    match request.status {
        RequestStatus::New | RequestStatus::Error => 0.0,
        RequestStatus::Ready => 100.0,
        RequestStatus::InProgress => {
            aggregate_percent(worker_fractions, request.parts_received(), request.part_count)
        }
    }
}

/// Render a percentage as `"<int>%"`.
pub fn format_percent(percent: f64) -> String {
    format!("{:.0}%", percent)
}

/// Parse a worker's textual progress answer. Garbage counts as no progress.
pub fn parse_fraction(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}
