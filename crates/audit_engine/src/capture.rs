use std::sync::Arc;

use audit_core::{
    plan_capture, AuditInput, CaptureStep, CaptureTask, RunState, Screenshot, StageEvent,
};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{MODE_CAPTURE, MODE_PERFORMANCE};
use crate::decode::{DecodedEvent, EventReader};
use crate::pipeline::{cancellable, emit, ensure_not_cancelled, PipelineSettings};
use crate::{AuditBackend, AuditError, AuditObserver, BackendError, FailureKind};

const UPLOAD_CONTEXT: &str =
    "[User-supplied screenshot. No live page text is available; analyze the image content.]";

/// Fields a capture stream may deliver, individually or as one `capture` object.
#[derive(Debug, Default, Deserialize)]
struct CapturedPage {
    #[serde(default)]
    screenshot: Option<Screenshot>,
    #[serde(rename = "liveText", default)]
    live_text: Option<String>,
    #[serde(rename = "animationData", default)]
    animation_data: Option<Value>,
    #[serde(rename = "accessibilityData", default)]
    accessibility_data: Option<Value>,
}

impl CapturedPage {
    fn absorb(&mut self, key: &str, data: Value) -> Result<(), BackendError> {
        let malformed =
            |err: serde_json::Error| BackendError::new(FailureKind::Decode, format!("{key}: {err}"));
        match key {
            "capture" => {
                let page: CapturedPage = serde_json::from_value(data).map_err(malformed)?;
                self.screenshot = page.screenshot.or(self.screenshot.take());
                self.live_text = page.live_text.or(self.live_text.take());
                self.animation_data = page.animation_data.or(self.animation_data.take());
                self.accessibility_data =
                    page.accessibility_data.or(self.accessibility_data.take());
            }
            "screenshot" => self.screenshot = Some(serde_json::from_value(data).map_err(malformed)?),
            "liveText" => self.live_text = data.as_str().map(str::to_string),
            "animationData" => self.animation_data = Some(data).filter(|v| !v.is_null()),
            "accessibilityData" => self.accessibility_data = Some(data).filter(|v| !v.is_null()),
            other => engine_debug!("Ignoring capture field {}", other),
        }
        Ok(())
    }
}

/// Performance request issued alongside capture and joined before analysis.
///
/// Dropping it aborts the request, so a failed or cancelled capture phase
/// leaves nothing running.
struct PerformanceCheck(JoinHandle<(Option<Value>, Option<String>)>);

impl PerformanceCheck {
    fn spawn(backend: Arc<dyn AuditBackend>, url: String) -> Self {
        Self(tokio::spawn(async move {
            let body = json!({ "url": url, "mode": MODE_PERFORMANCE });
            match backend.call(body).await {
                Ok(value) => {
                    let data = value
                        .get("performanceData")
                        .filter(|d| !d.is_null())
                        .cloned();
                    let warning = value
                        .get("error")
                        .and_then(Value::as_str)
                        .map(|e| format!("Performance analysis failed: {e}"));
                    (data, warning)
                }
                Err(err) => (None, Some(format!("Performance analysis failed: {err}"))),
            }
        }))
    }

    async fn join(&mut self) -> (Option<Value>, Option<String>) {
        match (&mut self.0).await {
            Ok(result) => result,
            Err(err) => (None, Some(format!("Performance analysis aborted: {err}"))),
        }
    }
}

impl Drop for PerformanceCheck {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Acquires screenshots and page text for every input, strictly in order.
pub(crate) struct CaptureCoordinator<'a> {
    backend: &'a Arc<dyn AuditBackend>,
    settings: &'a PipelineSettings,
}

impl<'a> CaptureCoordinator<'a> {
    pub(crate) fn new(backend: &'a Arc<dyn AuditBackend>, settings: &'a PipelineSettings) -> Self {
        Self { backend, settings }
    }

    pub(crate) async fn run(
        &self,
        inputs: &[AuditInput],
        state: &mut RunState,
        observer: &dyn AuditObserver,
        cancel: &CancellationToken,
    ) -> Result<(), AuditError> {
        let mut performance = match inputs.first() {
            Some(AuditInput::Url { url }) => {
                Some(PerformanceCheck::spawn(self.backend.clone(), url.clone()))
            }
            _ => None,
        };

        let steps = plan_capture(inputs, self.settings.mobile_policy);
        let total = steps.len();
        let mut url_captures = 0usize;

        for (offset, step) in steps.iter().enumerate() {
            ensure_not_cancelled(cancel)?;
            let index = offset + 1;
            emit(
                state,
                observer,
                StageEvent::CaptureTask {
                    index,
                    total,
                    label: step.label(),
                },
            );

            match step {
                CaptureStep::Remote(task) => {
                    match cancellable(cancel, self.capture_page(task)).await? {
                        Ok(page) => {
                            record_page(state, task, page);
                            state.record_capture(true);
                            url_captures += 1;
                        }
                        Err(err) => {
                            engine_warn!(
                                "Capture failed for {} ({}): {}",
                                task.url,
                                task.device(),
                                err
                            );
                            state.record_capture(false);
                            emit(
                                state,
                                observer,
                                StageEvent::CaptureTaskFailed {
                                    index,
                                    total,
                                    reason: err.kind.to_string(),
                                },
                            );
                        }
                    }
                }
                CaptureStep::Upload {
                    input_index,
                    image_base64,
                } => {
                    let path = format!("upload-{}", input_index + 1);
                    state.append_text(&path, UPLOAD_CONTEXT, false);
                    state.push_screenshot(Screenshot {
                        path,
                        image_base64: image_base64.clone(),
                        is_mobile: false,
                        input_index: *input_index,
                    });
                    state.record_capture(true);
                }
            }
        }

        if state.captures_succeeded() == 0 {
            return Err(AuditError::NoDataAcquired { attempted: total });
        }
        emit(
            state,
            observer,
            StageEvent::CaptureComplete {
                succeeded: state.captures_succeeded(),
                attempted: state.captures_attempted(),
            },
        );
        observer.on_scrape_complete(state.screenshots(), &self.settings.screenshot_mime_type);

        if let Some(check) = performance.as_mut() {
            emit(state, observer, StageEvent::PerformanceStarted);
            let (data, warning) = cancellable(cancel, check.join()).await?;
            if let Some(message) = warning.as_deref() {
                engine_warn!("{}", message);
                observer.on_performance_warning(message);
            }
            state.set_performance(data, warning);
        }

        let chars = state.content_chars();
        if url_captures > 0 && chars < self.settings.min_content_chars {
            return Err(AuditError::InsufficientContent {
                chars,
                minimum: self.settings.min_content_chars,
            });
        }
        engine_info!(
            "Aggregated {} characters from {} sections",
            state.aggregated_text().len(),
            state.text_sections().len()
        );
        emit(state, observer, StageEvent::ContentAggregated);
        Ok(())
    }

    async fn capture_page(&self, task: &CaptureTask) -> Result<CapturedPage, BackendError> {
        let body = json!({
            "url": task.url,
            "isMobile": task.is_mobile,
            "isFirstPage": task.is_primary() && !task.is_mobile,
            "mode": MODE_CAPTURE,
        });
        let mut reader = EventReader::new(self.backend.stream(body).await?);
        let mut page = CapturedPage::default();
        while let Some(event) = reader.next_event().await {
            match event? {
                DecodedEvent::Data { key, data } => page.absorb(&key, data)?,
                DecodedEvent::Error { message } => {
                    return Err(BackendError::new(FailureKind::Protocol, message));
                }
                DecodedEvent::Status { message } => {
                    engine_debug!("capture {}: {}", task.url, message);
                }
            }
        }
        if page.screenshot.is_none() {
            return Err(BackendError::new(
                FailureKind::Decode,
                "capture returned no screenshot",
            ));
        }
        Ok(page)
    }
}

fn record_page(state: &mut RunState, task: &CaptureTask, page: CapturedPage) {
    let Some(mut screenshot) = page.screenshot else {
        return;
    };
    screenshot.is_mobile = task.is_mobile;
    screenshot.input_index = task.input_index;
    if screenshot.path.is_empty() {
        screenshot.path = task.page_label();
    }

    if !task.is_mobile {
        if let Some(text) = page.live_text.as_deref().filter(|t| !t.trim().is_empty()) {
            state.append_text(&screenshot.path, text, true);
        }
    }
    if task.is_primary() {
        state.set_artifacts(page.animation_data, page.accessibility_data);
    }
    state.push_screenshot(screenshot);
}
