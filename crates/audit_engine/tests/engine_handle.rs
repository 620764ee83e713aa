mod common;

use std::time::Duration;

use audit_core::AuditInput;
use audit_engine::{AuditError, EngineHandle, PipelineEvent, RunTicket};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::MockServer;

use common::*;

fn drain_until_closed(engine: &EngineHandle) -> Vec<(RunTicket, PipelineEvent)> {
    let mut events = Vec::new();
    while let Some((ticket, event)) = engine.recv() {
        let closed = matches!(event, PipelineEvent::Closed);
        events.push((ticket, event));
        if closed {
            break;
        }
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_runs_audit_and_tags_events_with_ticket() {
    let server = MockServer::start().await;
    for_mode("scrape-single-page")
        .respond_with(stream_response(&capture_events("/", HOME_TEXT)))
        .mount(&server)
        .await;
    mount_performance(&server).await;
    mount_analysis(&server).await;
    for_mode("contextual-rank")
        .respond_with(json_response(json!([])))
        .mount(&server)
        .await;
    mount_finalize(&server, 1).await;

    let engine = EngineHandle::new(backend_settings(&server), fast_settings()).unwrap();
    let (ticket, events) = tokio::task::spawn_blocking(move || {
        let ticket = engine.start(vec![AuditInput::url("https://example.com")]);
        (ticket, drain_until_closed(&engine))
    })
    .await
    .unwrap();

    assert!(events.iter().all(|(t, _)| *t == ticket));
    let completed: Vec<String> = events
        .iter()
        .filter_map(|(_, e)| match e {
            PipelineEvent::Complete(outcome) => Some(outcome.finalized.run_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec!["run-42".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_stops_a_run_in_flight() {
    let server = MockServer::start().await;
    for_mode("scrape-single-page")
        .respond_with(
            stream_response(&capture_events("/", HOME_TEXT)).set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    mount_performance(&server).await;
    mount_finalize(&server, 0).await;

    let engine = EngineHandle::new(backend_settings(&server), fast_settings()).unwrap();
    let events = tokio::task::spawn_blocking(move || {
        let ticket = engine.start(vec![AuditInput::url("https://example.com")]);
        assert!(engine.cancel(ticket));
        assert!(!engine.cancel(ticket + 100));
        drain_until_closed(&engine)
    })
    .await
    .unwrap();

    let errors: Vec<AuditError> = events
        .into_iter()
        .filter_map(|(_, e)| match e {
            PipelineEvent::Error(err) => Some(err),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![AuditError::Cancelled]);
}

#[test]
fn bad_endpoint_is_reported_at_construction() {
    let settings = audit_engine::BackendSettings {
        endpoint: "::".to_string(),
        ..audit_engine::BackendSettings::default()
    };
    assert!(EngineHandle::new(settings, fast_settings()).is_err());
}
