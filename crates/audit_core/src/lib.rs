//! Audit core: pure input, progress, report and run-state logic.
mod input;
mod progress;
mod report;
mod state;

pub use input::{
    normalize_url, plan_capture, validate_inputs, AuditInput, CaptureStep, CaptureTask,
    InputError, MobilePolicy, DEFAULT_MAX_INPUTS,
};
pub use progress::{estimate, StageEvent, PROGRESS_COMPLETE};
pub use report::{
    fallback_ranking, overall_score, AnalysisReport, ExpertKey, RankedIssue, FALLBACK_TOP_N,
    RANKING_KEY,
};
pub use state::{RunState, Screenshot, TextSection};
