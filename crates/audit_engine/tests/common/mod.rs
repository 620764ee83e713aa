#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use audit_core::Screenshot;
use audit_engine::{
    AuditError, AuditObserver, AuditPipeline, BackendSettings, PipelineEvent, PipelineSettings,
    ReqwestBackend, RunOutcome, StatusUpdate,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ENDPOINT_PATH: &str = "/functions/v1/audit";
pub const API_KEY: &str = "test-key";

pub const HOME_TEXT: &str =
    "Welcome to Example Co. We build durable widgets for teams of every size, shipped worldwide.";

/// Records every callback so tests can assert on the full sequence.
#[derive(Default)]
pub struct CollectingObserver {
    pub events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<StatusUpdate> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Status(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.statuses().into_iter().map(|s| s.message).collect()
    }

    pub fn data_keys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Data { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl AuditObserver for CollectingObserver {
    fn on_scrape_complete(&self, screenshots: &[Screenshot], mime_type: &str) {
        self.push(PipelineEvent::ScrapeComplete {
            screenshots: screenshots.to_vec(),
            mime_type: mime_type.to_string(),
        });
    }

    fn on_performance_warning(&self, message: &str) {
        self.push(PipelineEvent::PerformanceWarning(message.to_string()));
    }

    fn on_status(&self, update: &StatusUpdate) {
        self.push(PipelineEvent::Status(update.clone()));
    }

    fn on_data(&self, key: &str, data: &Value) {
        self.push(PipelineEvent::Data {
            key: key.to_string(),
            data: data.clone(),
        });
    }

    fn on_complete(&self, outcome: &RunOutcome) {
        self.push(PipelineEvent::Complete(Box::new(outcome.clone())));
    }

    fn on_error(&self, error: &AuditError) {
        self.push(PipelineEvent::Error(error.clone()));
    }

    fn on_close(&self) {
        self.push(PipelineEvent::Closed);
    }
}

pub fn backend_settings(server: &MockServer) -> BackendSettings {
    BackendSettings {
        endpoint: format!("{}{}", server.uri(), ENDPOINT_PATH),
        api_key: API_KEY.to_string(),
        ..BackendSettings::default()
    }
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        expert_delay: Duration::from_millis(10),
        ..PipelineSettings::default()
    }
}

pub fn pipeline(server: &MockServer, settings: PipelineSettings) -> AuditPipeline {
    engine_logging::initialize_for_tests();
    let backend = ReqwestBackend::new(backend_settings(server)).unwrap();
    AuditPipeline::new(Arc::new(backend), settings)
}

/// Join events into a newline-delimited body.
pub fn ndjson(events: &[Value]) -> String {
    events
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

pub fn data_line(key: &str, data: Value) -> Value {
    json!({ "type": "data", "payload": { "key": key, "data": data } })
}

pub fn stream_response(events: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(ndjson(events), "application/x-ndjson")
}

pub fn json_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

pub fn for_mode(mode: &str) -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .and(body_partial_json(json!({ "mode": mode })))
}

pub fn capture_events(path: &str, live_text: &str) -> Vec<Value> {
    vec![
        data_line(
            "screenshot",
            json!({ "path": path, "data": "aW1hZ2U=", "isMobile": false }),
        ),
        data_line("liveText", json!(live_text)),
    ]
}

pub fn ux_report(issue_scores: &[f64], category: f64) -> Value {
    json!({
        "CategoryScore": category,
        "Top5CriticalUXIssues": issue_scores
            .iter()
            .map(|s| json!({ "Issue": format!("ux-{s}"), "Score": s }))
            .collect::<Vec<_>>(),
    })
}

pub fn product_report(issue_scores: &[f64], category: f64) -> Value {
    json!({
        "CategoryScore": category,
        "Top5CriticalProductIssues": issue_scores
            .iter()
            .map(|s| json!({ "Issue": format!("product-{s}"), "Score": s }))
            .collect::<Vec<_>>(),
    })
}

/// Mount a full set of healthy expert, ranking and finalize responses.
pub async fn mount_analysis(server: &MockServer) {
    for_mode("analyze-strategy")
        .respond_with(stream_response(&[
            json!({ "type": "status", "message": "Reviewing positioning" }),
            json!("not an event"),
            data_line("Strategy Audit expert", json!({ "Summary": "solid positioning" })),
        ]))
        .mount(server)
        .await;
    for_mode("analyze-ux")
        .respond_with(stream_response(&[data_line(
            "UX Audit expert",
            ux_report(&[3.0, 9.0], 6.0),
        )]))
        .mount(server)
        .await;
    for_mode("analyze-product")
        .respond_with(stream_response(&[data_line(
            "Product Audit expert",
            product_report(&[1.0, 7.0], 7.0),
        )]))
        .mount(server)
        .await;
    for_mode("analyze-visual")
        .respond_with(stream_response(&[data_line(
            "Visual Audit expert",
            json!({ "CategoryScore": 7.5 }),
        )]))
        .mount(server)
        .await;
}

pub async fn mount_finalize(server: &MockServer, expected: u64) {
    for_mode("finalize")
        .respond_with(json_response(json!({
            "auditId": "run-42",
            "screenshotUrl": "https://cdn.example/run-42.jpg"
        })))
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_performance(server: &MockServer) {
    for_mode("scrape-performance")
        .respond_with(json_response(json!({ "performanceData": { "lcp": 1.2 } })))
        .mount(server)
        .await;
}

/// Modes of all received requests, in arrival order.
pub async fn received_modes(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.body_json::<Value>().ok())
        .filter_map(|b| b.get("mode").and_then(Value::as_str).map(str::to_string))
        .collect()
}
