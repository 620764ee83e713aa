use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::report::ExpertKey;

pub const PROGRESS_COMPLETE: u8 = 100;

const INITIATING: u8 = 5;
const CAPTURE_BASE: u8 = 5;
const CAPTURE_SPAN: f64 = 25.0;
const CAPTURE_COMPLETE: u8 = 30;
const PERFORMANCE_STARTED: u8 = 35;
const CONTENT_AGGREGATED: u8 = 40;
const EXPERT_BASE: usize = 40;
const EXPERT_SPAN: usize = 44;
const RANKING_STARTED: u8 = 85;
const ALL_COMPLETE: u8 = 95;

static CAPTURE_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)capture task\s+(\d+)\s*/\s*(\d+)").expect("static capture task pattern")
});

/// Something that happened in a run, reported to the caller as status.
///
/// The human-readable text is derived from the variant; progress
/// checkpoints come from the variant, not from parsing that text.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Initiating,
    /// 1-based capture step `index` of `total`.
    CaptureTask {
        index: usize,
        total: usize,
        label: String,
    },
    CaptureTaskFailed {
        index: usize,
        total: usize,
        reason: String,
    },
    CaptureComplete {
        succeeded: usize,
        attempted: usize,
    },
    PerformanceStarted,
    ContentAggregated,
    /// 0-based expert `index` of `total`.
    ExpertStarted {
        expert: ExpertKey,
        index: usize,
        total: usize,
    },
    ExpertCompleted {
        expert: ExpertKey,
        index: usize,
        total: usize,
    },
    ExpertSkipped {
        expert: ExpertKey,
        reason: String,
    },
    RankingStarted,
    RankingFallback {
        reason: String,
    },
    AllAnalysesComplete,
    /// Free-text status forwarded from the analysis backend.
    Remote(String),
}

impl StageEvent {
    /// Progress value this event corresponds to, if it marks a checkpoint.
    pub fn checkpoint(&self) -> Option<u8> {
        match self {
            StageEvent::Initiating => Some(INITIATING),
            StageEvent::CaptureTask { index, total, .. } => Some(capture_checkpoint(*index, *total)),
            StageEvent::CaptureComplete { .. } => Some(CAPTURE_COMPLETE),
            StageEvent::PerformanceStarted => Some(PERFORMANCE_STARTED),
            StageEvent::ContentAggregated => Some(CONTENT_AGGREGATED),
            StageEvent::ExpertStarted { index, total, .. } => Some(expert_checkpoint(*index, *total)),
            StageEvent::ExpertCompleted { index, total, .. } => {
                Some(expert_checkpoint(index + 1, *total))
            }
            StageEvent::RankingStarted => Some(RANKING_STARTED),
            StageEvent::AllAnalysesComplete => Some(ALL_COMPLETE),
            StageEvent::Remote(text) => {
                let value = estimate(0, text);
                (value > 0).then_some(value)
            }
            StageEvent::CaptureTaskFailed { .. }
            | StageEvent::ExpertSkipped { .. }
            | StageEvent::RankingFallback { .. } => None,
        }
    }

    /// Recoverable problems the run skipped past.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            StageEvent::CaptureTaskFailed { .. }
                | StageEvent::ExpertSkipped { .. }
                | StageEvent::RankingFallback { .. }
        )
    }

    /// Next progress value given the previous one; never decreases.
    pub fn advance(&self, previous: u8) -> u8 {
        self.checkpoint().map_or(previous, |p| previous.max(p))
    }
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageEvent::Initiating => write!(f, "Initiating website capture..."),
            StageEvent::CaptureTask {
                index,
                total,
                label,
            } => write!(f, "Capture task {index}/{total}: {label}"),
            StageEvent::CaptureTaskFailed {
                index,
                total,
                reason,
            } => write!(f, "Task {index}/{total} failed ({reason}). Skipping."),
            StageEvent::CaptureComplete {
                succeeded,
                attempted,
            } => write!(
                f,
                "✓ Capture complete. {succeeded}/{attempted} tasks succeeded."
            ),
            StageEvent::PerformanceStarted => write!(f, "Analyzing homepage performance..."),
            StageEvent::ContentAggregated => {
                write!(f, "✓ Website content aggregated. Beginning AI analysis...")
            }
            StageEvent::ExpertStarted { expert, .. } => write!(f, "Running {expert} Audit"),
            StageEvent::ExpertCompleted { expert, .. } => {
                write!(f, "✓ {expert} Audit analysis complete")
            }
            StageEvent::ExpertSkipped { expert, reason } => {
                write!(f, "{expert} Audit skipped due to error: {reason}")
            }
            StageEvent::RankingStarted => write!(f, "Analyzing issues for strategic impact..."),
            StageEvent::RankingFallback { reason } => write!(
                f,
                "Contextual ranking unavailable ({reason}). Using default issue ordering."
            ),
            StageEvent::AllAnalysesComplete => {
                write!(f, "✓ All analyses complete. Finalizing report...")
            }
            StageEvent::Remote(text) => f.write_str(text),
        }
    }
}

fn capture_checkpoint(index: usize, total: usize) -> u8 {
    if total == 0 {
        return CAPTURE_BASE;
    }
    let ratio = index.min(total) as f64 / total as f64;
    CAPTURE_BASE + (CAPTURE_SPAN * ratio).round() as u8
}

fn expert_checkpoint(step: usize, total: usize) -> u8 {
    if total == 0 {
        return EXPERT_BASE as u8;
    }
    (EXPERT_BASE + EXPERT_SPAN * step.min(total) / total) as u8
}

/// Estimate completion from a free-text status line.
///
/// Every rule is checked; the result is the larger of `previous` and the
/// highest matching checkpoint. Unmatched text leaves `previous` unchanged.
/// Finalization (100) is never inferred from text.
pub fn estimate(previous: u8, status_text: &str) -> u8 {
    let lower = status_text.to_lowercase();
    let mut best = 0u8;
    let mut consider = |value: u8| best = best.max(value);

    if lower.contains("initiating") {
        consider(INITIATING);
    }
    if let Some(caps) = CAPTURE_TASK.captures(status_text) {
        let index = caps[1].parse::<usize>().ok();
        let total = caps[2].parse::<usize>().ok();
        if let (Some(index), Some(total)) = (index, total) {
            if total > 0 {
                consider(capture_checkpoint(index, total));
            }
        }
    }
    if lower.contains("capture complete") {
        consider(CAPTURE_COMPLETE);
    }
    if lower.contains("analyzing homepage performance") {
        consider(PERFORMANCE_STARTED);
    }
    if lower.contains("website content aggregated") {
        consider(CONTENT_AGGREGATED);
    }
    let total = ExpertKey::ALL.len();
    for (index, expert) in ExpertKey::ALL.into_iter().enumerate() {
        let name = expert.name().to_lowercase();
        if lower.contains(&format!("running {name} audit")) {
            consider(expert_checkpoint(index, total));
        }
        if lower.contains(&format!("{name} audit analysis complete")) {
            consider(expert_checkpoint(index + 1, total));
        }
    }
    if lower.contains("analyzing issues for strategic impact") {
        consider(RANKING_STARTED);
    }
    if lower.contains("all analyses complete") {
        consider(ALL_COMPLETE);
    }

    previous.max(best)
}
