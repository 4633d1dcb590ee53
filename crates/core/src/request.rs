//! The crack request record and its state machine.
//!
//! Both store implementations load a [`CrackRequest`], apply one of the
//! mutations below under their per-record lock, and write it back, so the
//! lifecycle rules live in exactly one place.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::protocol::ResultReport;
use crate::status::{RequestStatus, TransitionError};
use crate::types::{RequestId, Timestamp};

/// Input for creating a request.
#[derive(Debug, Clone)]
pub struct NewCrackRequest {
    pub request_id: RequestId,
    pub hash: String,
    pub max_length: u32,
    /// Worker pool size captured at creation; never changes afterwards.
    pub part_count: u32,
    pub timeout_secs: u64,
}

/// Snapshot of a request's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrackRequest {
    pub request_id: RequestId,
    pub hash: String,
    pub max_length: u32,
    pub status: RequestStatus,
    pub part_count: u32,
    /// Distinct part numbers whose final report has been counted.
    pub received_parts: BTreeSet<u32>,
    pub results: BTreeSet<String>,
    pub start_time: Timestamp,
    pub timeout_secs: u64,
}

/// Result of an explicit status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// Result of applying a [`ResultReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Results merged. `counted` is true when a final report advanced
    /// `parts_received`; `completed` when that made the request READY.
    Applied { counted: bool, completed: bool },
    /// Final report for a part that was already counted (redelivery).
    DuplicatePart,
    /// Report does not match the request's partitioning.
    PartMismatch,
    /// Request is not accepting results in this status.
    Ignored(RequestStatus),
    /// No request with this id.
    UnknownRequest,
}

impl CrackRequest {
    pub fn new(input: NewCrackRequest, now: Timestamp) -> Self {
        Self {
            request_id: input.request_id,
            hash: input.hash,
            max_length: input.max_length,
            status: RequestStatus::New,
            part_count: input.part_count,
            received_parts: BTreeSet::new(),
            results: BTreeSet::new(),
            start_time: now,
            timeout_secs: input.timeout_secs,
        }
    }

    pub fn parts_received(&self) -> u32 {
        self.received_parts.len() as u32
    }

    /// Apply an explicit status change (see [`RequestStatus::check_transition`]).
    pub fn transition(&mut self, to: RequestStatus) -> Result<Transition, TransitionError> {
        if self.status.check_transition(to)? {
            self.status = to;
            Ok(Transition::Applied)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    /// Merge a worker report. Only IN_PROGRESS requests accept results.
    pub fn apply_report(&mut self, report: &ResultReport) -> UpdateOutcome {
        if self.status != RequestStatus::InProgress {
            return UpdateOutcome::Ignored(self.status);
        }
        if report.part_count != self.part_count || report.part_number >= self.part_count {
            return UpdateOutcome::PartMismatch;
        }

        self.results.extend(report.results.iter().cloned());

        if report.partial {
            return UpdateOutcome::Applied {
                counted: false,
                completed: false,
            };
        }
        if !self.received_parts.insert(report.part_number) {
            return UpdateOutcome::DuplicatePart;
        }

        let completed = self.parts_received() == self.part_count;
        if completed {
            self.status = RequestStatus::Ready;
        }
        UpdateOutcome::Applied {
            counted: true,
            completed,
        }
    }

    /// Whether the request has been running longer than its timeout.
    pub fn is_timed_out(&self, now: Timestamp) -> bool {
        let elapsed = now - self.start_time;
        elapsed.num_milliseconds() > (self.timeout_secs as i64).saturating_mul(1000)
    }

    /// Move a timed-out IN_PROGRESS request to ERROR. Returns whether it changed.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        if self.status == RequestStatus::InProgress && self.is_timed_out(now) {
            self.status = RequestStatus::Error;
            true
        } else {
            false
        }
    }

    /// Force a non-terminal request to ERROR.
    pub fn fail(&mut self) -> Transition {
        if self.status.is_terminal() {
            Transition::Unchanged
        } else {
            self.status = RequestStatus::Error;
            Transition::Applied
        }
    }
}
