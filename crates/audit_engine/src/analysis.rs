use audit_core::{ExpertKey, RunState, StageEvent};
use engine_logging::{engine_info, engine_warn};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::decode::{DecodedEvent, EventReader};
use crate::pipeline::{cancellable, emit, ensure_not_cancelled, PipelineSettings};
use crate::{AuditBackend, AuditError, AuditObserver, BackendError, FailureKind};

/// Runs each expert in turn and merges its streamed output into the report.
///
/// A failing expert is skipped; only cancellation ends the loop early.
pub(crate) struct AnalysisRunner<'a> {
    backend: &'a dyn AuditBackend,
    settings: &'a PipelineSettings,
}

impl<'a> AnalysisRunner<'a> {
    pub(crate) fn new(backend: &'a dyn AuditBackend, settings: &'a PipelineSettings) -> Self {
        Self { backend, settings }
    }

    /// Returns how many experts finished cleanly.
    pub(crate) async fn run(
        &self,
        state: &mut RunState,
        observer: &dyn AuditObserver,
        cancel: &CancellationToken,
    ) -> Result<usize, AuditError> {
        let total = self.settings.experts.len();
        let mut succeeded = 0;

        for (index, expert) in self.settings.experts.iter().copied().enumerate() {
            if index > 0 && !self.settings.expert_delay.is_zero() {
                cancellable(cancel, tokio::time::sleep(self.settings.expert_delay)).await?;
            }
            ensure_not_cancelled(cancel)?;
            emit(
                state,
                observer,
                StageEvent::ExpertStarted {
                    expert,
                    index,
                    total,
                },
            );

            let body = self.request_body(state, expert);
            match self.stream_expert(body, state, observer, cancel).await? {
                Ok(()) => {
                    succeeded += 1;
                    emit(
                        state,
                        observer,
                        StageEvent::ExpertCompleted {
                            expert,
                            index,
                            total,
                        },
                    );
                }
                Err(err) => {
                    engine_warn!("{} expert failed: {}", expert, err);
                    emit(
                        state,
                        observer,
                        StageEvent::ExpertSkipped {
                            expert,
                            reason: err.to_string(),
                        },
                    );
                }
            }
        }

        engine_info!("{}/{} experts completed", succeeded, total);
        Ok(succeeded)
    }

    fn request_body(&self, state: &RunState, expert: ExpertKey) -> Value {
        let all_screenshots = self
            .settings
            .include_all_screenshots
            .then(|| state.screenshots());
        json!({
            "url": state.display_identity(),
            "screenshotBase64": state.primary_screenshot().map(|s| &s.image_base64),
            "mobileScreenshotBase64": state.primary_mobile_screenshot().map(|s| &s.image_base64),
            "screenshots": all_screenshots,
            "screenshotMimeType": self.settings.screenshot_mime_type,
            "liveText": state.aggregated_text(),
            "performanceData": state.performance_data(),
            "performanceAnalysisError": state.performance_warning(),
            "animationData": state.animation_data(),
            "accessibilityData": state.accessibility_data(),
            "mode": expert.mode(),
        })
    }

    /// Outer error ends the run (cancellation); inner error skips this expert.
    async fn stream_expert(
        &self,
        body: Value,
        state: &mut RunState,
        observer: &dyn AuditObserver,
        cancel: &CancellationToken,
    ) -> Result<Result<(), BackendError>, AuditError> {
        let stream = match cancellable(cancel, self.backend.stream(body)).await? {
            Ok(stream) => stream,
            Err(err) => return Ok(Err(err)),
        };
        let mut reader = EventReader::new(stream);

        loop {
            match cancellable(cancel, reader.next_event()).await? {
                None => return Ok(Ok(())),
                Some(Err(err)) => return Ok(Err(err)),
                Some(Ok(DecodedEvent::Data { key, data })) => {
                    observer.on_data(&key, &data);
                    state.report_mut().insert(key, data);
                }
                Some(Ok(DecodedEvent::Error { message })) => {
                    return Ok(Err(BackendError::new(FailureKind::Protocol, message)));
                }
                Some(Ok(DecodedEvent::Status { message })) => {
                    emit(state, observer, StageEvent::Remote(message));
                }
            }
        }
    }
}
