use audit_core::{fallback_ranking, RunState, StageEvent, FALLBACK_TOP_N, RANKING_KEY};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::backend::MODE_RANK;
use crate::pipeline::{cancellable, emit};
use crate::{AuditBackend, AuditError, AuditObserver, TopIssues};

/// Ask the backend to rank issues across experts, falling back to local ordering.
///
/// Only cancellation is an error here; any ranking failure degrades to
/// [`TopIssues::Fallback`]. A contextual ranking keeps its first [`FALLBACK_TOP_N`] entries.
pub(crate) async fn rank(
    backend: &dyn AuditBackend,
    state: &mut RunState,
    observer: &dyn AuditObserver,
    cancel: &CancellationToken,
) -> Result<TopIssues, AuditError> {
    emit(state, observer, StageEvent::RankingStarted);

    let body = json!({ "report": state.report(), "mode": MODE_RANK });
    let reason = match cancellable(cancel, backend.call(body)).await? {
        Ok(Value::Array(mut issues)) => {
            issues.truncate(FALLBACK_TOP_N);
            let ranked = Value::Array(issues);
            observer.on_data(RANKING_KEY, &ranked);
            state.report_mut().insert(RANKING_KEY, ranked.clone());
            return Ok(TopIssues::Contextual(ranked));
        }
        Ok(other) => format!("unexpected ranking payload: {}", json_kind(&other)),
        Err(err) => err.to_string(),
    };

    emit(state, observer, StageEvent::RankingFallback { reason });
    Ok(TopIssues::Fallback(fallback_ranking(state.report())))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
