use std::fmt;

use audit_core::{AnalysisReport, InputError, RankedIssue, Screenshot, StageEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ticket identifying one run started through the engine handle.
pub type RunTicket = u64;

/// Why a single remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidEndpoint,
    HttpStatus(u16),
    Timeout,
    Network,
    /// The body could not be read as the expected JSON shape.
    Decode,
    /// The stream itself reported an error event.
    Protocol,
}

impl FailureKind {
    /// Failures that indicate the backend could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Network)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidEndpoint => write!(f, "invalid endpoint"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "unreadable response"),
            FailureKind::Protocol => write!(f, "stream error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Coarse category of a fatal run failure, for targeted remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    InvalidInput,
    CaptureExhausted,
    InsufficientContent,
    Connectivity,
    Finalization,
    Cancelled,
}

/// Conditions that end a run without a report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditError {
    #[error("invalid audit input: {0}")]
    InvalidInput(#[from] InputError),
    #[error("capture failed for all {attempted} tasks; no data acquired, cannot proceed with audit")]
    NoDataAcquired { attempted: usize },
    #[error(
        "capture succeeded but only {chars} characters of text were extracted (minimum {minimum}); \
         the page may be empty or need interaction to load"
    )]
    InsufficientContent { chars: usize, minimum: usize },
    #[error("could not reach the analysis service: {0}")]
    Connectivity(String),
    #[error("failed to finalize report: {0}")]
    Finalization(String),
    #[error("audit cancelled")]
    Cancelled,
}

impl AuditError {
    pub fn category(&self) -> FailureCategory {
        match self {
            AuditError::InvalidInput(_) => FailureCategory::InvalidInput,
            AuditError::NoDataAcquired { .. } => FailureCategory::CaptureExhausted,
            AuditError::InsufficientContent { .. } => FailureCategory::InsufficientContent,
            AuditError::Connectivity(_) => FailureCategory::Connectivity,
            AuditError::Finalization(_) => FailureCategory::Finalization,
            AuditError::Cancelled => FailureCategory::Cancelled,
        }
    }
}

/// Status text plus the structured event it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub event: StageEvent,
    pub message: String,
    pub progress: u8,
}

/// Durable identifiers returned by the finalization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedRun {
    #[serde(rename = "auditId")]
    pub run_id: String,
    #[serde(rename = "screenshotUrl", default)]
    pub screenshot_url: Option<String>,
}

/// Ordered list of top issues for the finished report.
#[derive(Debug, Clone, PartialEq)]
pub enum TopIssues {
    /// Result of the cross-expert ranking call, stored in the report.
    Contextual(Value),
    Fallback(Vec<RankedIssue>),
}

/// Everything a successful run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub finalized: FinalizedRun,
    pub display_identity: String,
    pub report: AnalysisReport,
    pub screenshots: Vec<Screenshot>,
    pub aggregated_text: String,
    pub captures_succeeded: usize,
    pub captures_attempted: usize,
    pub top_issues: TopIssues,
}

/// Owned form of every observer callback, for channel delivery.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ScrapeComplete {
        screenshots: Vec<Screenshot>,
        mime_type: String,
    },
    PerformanceWarning(String),
    Status(StatusUpdate),
    Data {
        key: String,
        data: Value,
    },
    Complete(Box<RunOutcome>),
    Error(AuditError),
    Closed,
}
