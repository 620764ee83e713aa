use audit_core::RunState;
use engine_logging::engine_info;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backend::MODE_FINALIZE;
use crate::pipeline::cancellable;
use crate::{AuditBackend, AuditError, FinalizedRun};

/// Persist the finished run remotely. Every failure here is fatal.
pub(crate) async fn finalize(
    backend: &dyn AuditBackend,
    state: &RunState,
    cancel: &CancellationToken,
) -> Result<FinalizedRun, AuditError> {
    let body = json!({
        "report": state.report(),
        "screenshots": state.screenshots(),
        "url": state.display_identity(),
        "mode": MODE_FINALIZE,
    });

    let value = cancellable(cancel, backend.call(body)).await?.map_err(|err| {
        if err.kind.is_connectivity() {
            AuditError::Connectivity(err.to_string())
        } else {
            AuditError::Finalization(err.to_string())
        }
    })?;

    let run: FinalizedRun = serde_json::from_value(value)
        .map_err(|err| AuditError::Finalization(format!("unexpected response: {err}")))?;
    if run.run_id.trim().is_empty() {
        return Err(AuditError::Finalization(
            "backend returned an empty audit id".to_string(),
        ));
    }
    engine_info!(
        "Finalized audit {} (screenshot: {})",
        run.run_id,
        run.screenshot_url.as_deref().unwrap_or("none")
    );
    Ok(run)
}
