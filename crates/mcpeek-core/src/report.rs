//! Ordered result of one inspection run.

use crate::capability::CapabilitySet;
use crate::descriptor::TransportDescriptor;
use crate::error::McpeekError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a server produced no capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt failed with a transient error.
    Exhausted,
    /// An attempt failed with a non-retryable error.
    Permanent,
    /// The run was cancelled.
    Cancelled,
    /// The per-server timeout elapsed.
    DeadlineExceeded,
    /// The inspection task panicked or was aborted.
    Aborted,
}

/// Connection failure recorded for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Connection attempts made before giving up (0 if unknown).
    pub attempts: u32,
    /// Rendered error.
    pub message: String,
}

impl ConnectionFailure {
    /// Categorize an error returned by the connection path.
    pub fn from_error(err: &McpeekError) -> Self {
        let kind = match err {
            McpeekError::RetriesExhausted { .. } => FailureKind::Exhausted,
            McpeekError::Cancelled => FailureKind::Cancelled,
            McpeekError::DeadlineExceeded(_) => FailureKind::DeadlineExceeded,
            _ => FailureKind::Permanent,
        };
        Self {
            kind,
            attempts: err.attempts().unwrap_or(0),
            message: err.to_string(),
        }
    }

    /// Failure for a unit that never reported back.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Aborted,
            attempts: 0,
            message: message.into(),
        }
    }
}

/// Outcome of inspecting one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InspectionOutcome {
    /// Connected and probed.
    Capabilities(CapabilitySet),
    /// Could not connect.
    ConnectionFailed(ConnectionFailure),
}

/// One server's slot in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Server that was inspected.
    pub descriptor: TransportDescriptor,
    /// What happened.
    pub outcome: InspectionOutcome,
    /// Wall time spent on this server.
    pub elapsed_ms: u64,
}

impl ReportEntry {
    /// Capabilities, if the server connected.
    pub fn capabilities(&self) -> Option<&CapabilitySet> {
        match &self.outcome {
            InspectionOutcome::Capabilities(set) => Some(set),
            InspectionOutcome::ConnectionFailed(_) => None,
        }
    }

    /// Connection failure, if the server did not connect.
    pub fn failure(&self) -> Option<&ConnectionFailure> {
        match &self.outcome {
            InspectionOutcome::ConnectionFailed(f) => Some(f),
            InspectionOutcome::Capabilities(_) => None,
        }
    }
}

/// Results for every inspected server, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// One entry per inspected descriptor.
    pub entries: Vec<ReportEntry>,
}

impl InspectionReport {
    /// Entry for the named server.
    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    /// Number of servers that connected.
    pub fn connected(&self) -> usize {
        self.entries.iter().filter(|e| e.capabilities().is_some()).count()
    }

    /// Number of servers that failed to connect.
    pub fn failed(&self) -> usize {
        self.entries.len() - self.connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_exhausted() {
        let err = McpeekError::RetriesExhausted {
            server: "db".into(),
            attempts: 3,
            source: Box::new(McpeekError::Timeout("initialize".into())),
        };
        let f = ConnectionFailure::from_error(&err);
        assert_eq!(f.kind, FailureKind::Exhausted);
        assert_eq!(f.attempts, 3);
    }

    #[test]
    fn test_failure_from_cancellation() {
        let f = ConnectionFailure::from_error(&McpeekError::Cancelled);
        assert_eq!(f.kind, FailureKind::Cancelled);
        assert_eq!(f.attempts, 0);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let entry = ReportEntry {
            descriptor: TransportDescriptor::stdio("fs", "mcp-fs", Vec::<String>::new()),
            outcome: InspectionOutcome::ConnectionFailed(ConnectionFailure::aborted("panicked")),
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["outcome"]["status"], "connection_failed");
        assert_eq!(json["outcome"]["kind"], "aborted");
        assert_eq!(json["descriptor"]["name"], "fs");
    }

    #[test]
    fn test_counts() {
        let ok = ReportEntry {
            descriptor: TransportDescriptor::stdio("a", "a", Vec::<String>::new()),
            outcome: InspectionOutcome::Capabilities(CapabilitySet::default()),
            elapsed_ms: 0,
        };
        let bad = ReportEntry {
            descriptor: TransportDescriptor::stdio("b", "b", Vec::<String>::new()),
            outcome: InspectionOutcome::ConnectionFailed(ConnectionFailure::aborted("x")),
            elapsed_ms: 0,
        };
        let report = InspectionReport {
            started_at: Utc::now(),
            entries: vec![ok, bad],
        };
        assert_eq!(report.connected(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.entry("b").unwrap().failure().is_some());
    }
}
