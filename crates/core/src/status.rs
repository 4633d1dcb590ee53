//! Crack request lifecycle status.
//!
//! Transitions only move forward: `NEW -> IN_PROGRESS -> {READY | ERROR}`,
//! plus `NEW -> ERROR`. `READY` is reached exclusively through completion
//! accounting, never through an explicit status change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    New,
    InProgress,
    Ready,
    Error,
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("request is in terminal status {0}")]
    Terminal(RequestStatus),

    #[error("cannot move request from {from} to {to}")]
    Backward { from: RequestStatus, to: RequestStatus },

    #[error("READY can only be reached by receiving every part")]
    ReadyByAccounting,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::New => "NEW",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Ready => "READY",
            RequestStatus::Error => "ERROR",
        }
    }

    /// `READY` and `ERROR` accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Ready | RequestStatus::Error)
    }

    /// Validate an explicit status change.
    ///
    /// Returns `Ok(false)` when `to` equals the current status (no-op),
    /// `Ok(true)` when the change is allowed.
    pub fn check_transition(self, to: RequestStatus) -> Result<bool, TransitionError> {
        if self == to {
            return Ok(false);
        }
        if self.is_terminal() {
            return Err(TransitionError::Terminal(self));
        }
        match (self, to) {
            (_, RequestStatus::Ready) => Err(TransitionError::ReadyByAccounting),
            (RequestStatus::New, RequestStatus::InProgress)
            | (RequestStatus::New, RequestStatus::Error)
            | (RequestStatus::InProgress, RequestStatus::Error) => Ok(true),
            (from, to) => Err(TransitionError::Backward { from, to }),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(RequestStatus::New),
            "IN_PROGRESS" => Ok(RequestStatus::InProgress),
            "READY" => Ok(RequestStatus::Ready),
            "ERROR" => Ok(RequestStatus::Error),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert_eq!(RequestStatus::New.check_transition(RequestStatus::InProgress), Ok(true));
        assert_eq!(RequestStatus::New.check_transition(RequestStatus::Error), Ok(true));
        assert_eq!(RequestStatus::InProgress.check_transition(RequestStatus::Error), Ok(true));
    }

    #[test]
    fn same_status_is_noop() {
        assert_eq!(
            RequestStatus::InProgress.check_transition(RequestStatus::InProgress),
            Ok(false)
        );
        assert_eq!(RequestStatus::Error.check_transition(RequestStatus::Error), Ok(false));
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        for terminal in [RequestStatus::Ready, RequestStatus::Error] {
            for to in [RequestStatus::New, RequestStatus::InProgress] {
                assert_matches!(terminal.check_transition(to), Err(TransitionError::Terminal(_)));
            }
        }
        assert_matches!(
            RequestStatus::Ready.check_transition(RequestStatus::Error),
            Err(TransitionError::Terminal(RequestStatus::Ready))
        );
    }

    #[test]
    fn ready_requires_accounting() {
        assert_matches!(
            RequestStatus::InProgress.check_transition(RequestStatus::Ready),
            Err(TransitionError::ReadyByAccounting)
        );
    }

    #[test]
    fn backward_rejected() {
        assert_matches!(
            RequestStatus::InProgress.check_transition(RequestStatus::New),
            Err(TransitionError::Backward { .. })
        );
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&RequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!("READY".parse::<RequestStatus>().unwrap(), RequestStatus::Ready);
    }
}
