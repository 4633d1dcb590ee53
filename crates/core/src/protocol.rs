//! Wire messages exchanged between the manager, the workers and the queues.
//!
//! [`ResultReport`] keeps the field names of the original result protocol
//! (`RequestId`, `PartNumber`, `PartCount`, `Results`, `Partial`) and encodes
//! the `Partial` flag as the literal strings `"True"` / `"False"`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::partition::{self, PartitionError};
use crate::types::RequestId;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Client-facing submission endpoint (manager).
pub const MANAGER_CRACK_PATH: &str = "/api/hash/crack";
/// Client-facing status endpoint (manager).
pub const MANAGER_STATUS_PATH: &str = "/api/hash/status";
/// Result ingestion endpoint (manager, called by workers in direct mode).
pub const MANAGER_RESULT_PATH: &str = "/internal/api/manager/hash/crack/request";
/// Task delivery endpoint (worker, called by the manager in direct mode).
pub const WORKER_TASK_PATH: &str = "/internal/api/worker/hash/crack/task";
/// Liveness / current assignment probe (worker).
pub const WORKER_HEALTH_PATH: &str = "/health";
/// Scan progress fraction (worker).
pub const WORKER_PROGRESS_PATH: &str = "/progress";

/// Submitted requests awaiting dispatch (queue mode).
pub const INTAKE_QUEUE: &str = "intake";
/// Task assignments awaiting an idle worker (queue mode).
pub const TASK_QUEUE: &str = "tasks";
/// Result reports awaiting ingestion (queue mode).
pub const RESULT_QUEUE: &str = "results";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One partition of a request, delivered to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub request_id: RequestId,
    pub hash: String,
    pub max_length: u32,
    pub part_number: u32,
    pub part_count: u32,
}

impl TaskAssignment {
    /// Check the part indices and length against the partition rules.
    pub fn validate(&self) -> Result<(), PartitionError> {
        partition::part_range(self.part_number, self.part_count, 1)?;
        partition::keyspace_size(self.max_length)?;
        Ok(())
    }
}

/// Message on the intake queue: a submitted request awaiting dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeMessage {
    pub request_id: RequestId,
    pub hash: String,
    pub max_length: u32,
}

/// Candidates found by a worker for one part of a request.
///
/// A partial report announces a match while the scan continues; the final
/// report closes the part and is the only kind that advances completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultReport {
    pub request_id: RequestId,
    pub part_number: u32,
    pub part_count: u32,
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(with = "flag_literal")]
    pub partial: bool,
}

impl ResultReport {
    pub fn partial(assignment: &TaskAssignment, results: Vec<String>) -> Self {
        Self::for_assignment(assignment, results, true)
    }

    pub fn final_report(assignment: &TaskAssignment, results: Vec<String>) -> Self {
        Self::for_assignment(assignment, results, false)
    }

    fn for_assignment(assignment: &TaskAssignment, results: Vec<String>, partial: bool) -> Self {
        Self {
            request_id: assignment.request_id.clone(),
            part_number: assignment.part_number,
            part_count: assignment.part_count,
            results,
            partial,
        }
    }

    pub fn is_final(&self) -> bool {
        !self.partial
    }

    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self)
            .map_err(|e| CoreError::Internal(format!("Failed to encode result report: {e}")))
    }

    pub fn decode(payload: &str) -> Result<Self, CoreError> {
        let report: Self = serde_json::from_str(payload)
            .map_err(|e| CoreError::Validation(format!("Malformed result report: {e}")))?;
        if report.request_id.is_empty() {
            return Err(CoreError::Validation(
                "Result report is missing RequestId".to_string(),
            ));
        }
        if report.part_count == 0 || report.part_number >= report.part_count {
            return Err(CoreError::Validation(format!(
                "Result report part {} is out of range for {} parts",
                report.part_number, report.part_count
            )));
        }
        Ok(report)
    }
}

/// Worker answer to a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerHealth {
    Idle,
    Busy { assignment: TaskAssignment },
}

impl WorkerHealth {
    pub fn assignment(&self) -> Option<&TaskAssignment> {
        match self {
            WorkerHealth::Idle => None,
            WorkerHealth::Busy { assignment } => Some(assignment),
        }
    }
}

/// Serde adapter for the `"True"` / `"False"` flag encoding.
pub mod flag_literal {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "True" } else { "False" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("\"True\" or \"False\"")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v {
                "True" | "true" => Ok(true),
                "False" | "false" => Ok(false),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
