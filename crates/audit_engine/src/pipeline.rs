use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use audit_core::{
    validate_inputs, AuditInput, ExpertKey, InputError, MobilePolicy, RunState, StageEvent,
    DEFAULT_MAX_INPUTS,
};
use engine_logging::{engine_error, engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalysisRunner;
use crate::capture::CaptureCoordinator;
use crate::{finalize, ranking};
use crate::{AuditBackend, AuditError, AuditObserver, RunOutcome, StatusUpdate};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Experts to run, in execution order.
    pub experts: Vec<ExpertKey>,
    /// Pause before every expert after the first, to respect upstream rate limits.
    pub expert_delay: Duration,
    pub min_content_chars: usize,
    pub max_inputs: usize,
    pub mobile_policy: MobilePolicy,
    /// Send every captured image to the experts, not just the primary pair.
    pub include_all_screenshots: bool,
    pub screenshot_mime_type: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            experts: ExpertKey::ALL.to_vec(),
            expert_delay: Duration::from_secs(5),
            min_content_chars: 50,
            max_inputs: DEFAULT_MAX_INPUTS,
            mobile_policy: MobilePolicy::default(),
            include_all_screenshots: false,
            screenshot_mime_type: "image/jpeg".to_string(),
        }
    }
}

/// Sequences capture, analysis, ranking and finalization for one run at a time.
///
/// Every call to [`AuditPipeline::run`] gets a fresh [`RunState`]; nothing is
/// shared between runs except the backend client.
pub struct AuditPipeline {
    backend: Arc<dyn AuditBackend>,
    settings: PipelineSettings,
}

impl AuditPipeline {
    pub fn new(backend: Arc<dyn AuditBackend>, settings: PipelineSettings) -> Self {
        Self { backend, settings }
    }

    /// Run the whole audit, reporting through `observer`.
    ///
    /// Exactly one of `on_complete` / `on_error` fires, followed by
    /// `on_close`, whatever the exit path.
    pub async fn run(
        &self,
        inputs: Vec<AuditInput>,
        observer: &dyn AuditObserver,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AuditError> {
        let result = self.execute(inputs, observer, cancel).await;
        match &result {
            Ok(outcome) => {
                engine_info!(
                    "Audit {} finalized for {}",
                    outcome.finalized.run_id,
                    outcome.display_identity
                );
                observer.on_complete(outcome);
            }
            Err(AuditError::Cancelled) => {
                engine_warn!("Audit cancelled");
                observer.on_error(&AuditError::Cancelled);
            }
            Err(err) => {
                engine_error!("Audit failed: {}", err);
                observer.on_error(err);
            }
        }
        observer.on_close();
        result
    }

    async fn execute(
        &self,
        inputs: Vec<AuditInput>,
        observer: &dyn AuditObserver,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AuditError> {
        let inputs = validate_inputs(inputs, self.settings.max_inputs)?;
        let identity = inputs
            .first()
            .map(AuditInput::display_identity)
            .ok_or(InputError::Empty)?;
        let mut state = RunState::new(identity);

        ensure_not_cancelled(cancel)?;
        emit(&mut state, observer, StageEvent::Initiating);

        CaptureCoordinator::new(&self.backend, &self.settings)
            .run(&inputs, &mut state, observer, cancel)
            .await?;

        AnalysisRunner::new(self.backend.as_ref(), &self.settings)
            .run(&mut state, observer, cancel)
            .await?;

        ensure_not_cancelled(cancel)?;
        let top_issues = ranking::rank(self.backend.as_ref(), &mut state, observer, cancel).await?;
        emit(&mut state, observer, StageEvent::AllAnalysesComplete);

        ensure_not_cancelled(cancel)?;
        let finalized = finalize::finalize(self.backend.as_ref(), &state, cancel).await?;

        let captures_succeeded = state.captures_succeeded();
        let captures_attempted = state.captures_attempted();
        let display_identity = state.display_identity().to_string();
        let aggregated_text = state.aggregated_text().to_string();
        let screenshots = state.screenshots().to_vec();
        Ok(RunOutcome {
            finalized,
            display_identity,
            report: state.into_report(),
            screenshots,
            aggregated_text,
            captures_succeeded,
            captures_attempted,
            top_issues,
        })
    }
}

/// Record `event` against the run's progress and publish it as status.
pub(crate) fn emit(state: &mut RunState, observer: &dyn AuditObserver, event: StageEvent) {
    let progress = state.advance(&event);
    let message = event.to_string();
    if event.is_warning() {
        engine_warn!("[{progress:>3}%] {message}");
    } else {
        engine_info!("[{progress:>3}%] {message}");
    }
    observer.on_status(&StatusUpdate {
        event,
        message,
        progress,
    });
}

pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), AuditError> {
    if cancel.is_cancelled() {
        Err(AuditError::Cancelled)
    } else {
        Ok(())
    }
}

/// Await `fut` unless the run is cancelled first; the future is dropped on cancel.
pub(crate) async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, AuditError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuditError::Cancelled),
        output = fut => Ok(output),
    }
}
