use std::sync::mpsc;

use audit_core::Screenshot;
use serde_json::Value;

use crate::{AuditError, PipelineEvent, RunOutcome, RunTicket, StatusUpdate};

/// Callback surface a pipeline run reports through.
///
/// `on_close` fires exactly once per run, on every exit path. All other
/// callbacks default to no-ops.
pub trait AuditObserver: Send + Sync {
    fn on_scrape_complete(&self, _screenshots: &[Screenshot], _mime_type: &str) {}
    fn on_performance_warning(&self, _message: &str) {}
    fn on_status(&self, _update: &StatusUpdate) {}
    fn on_data(&self, _key: &str, _data: &Value) {}
    fn on_complete(&self, _outcome: &RunOutcome) {}
    fn on_error(&self, _error: &AuditError) {}
    fn on_close(&self) {}
}

/// Forwards every callback as a [`PipelineEvent`] tagged with its run.
pub struct ChannelObserver {
    ticket: RunTicket,
    tx: mpsc::Sender<(RunTicket, PipelineEvent)>,
}

impl ChannelObserver {
    pub fn new(ticket: RunTicket, tx: mpsc::Sender<(RunTicket, PipelineEvent)>) -> Self {
        Self { ticket, tx }
    }

    fn send(&self, event: PipelineEvent) {
        let _ = self.tx.send((self.ticket, event));
    }
}

impl AuditObserver for ChannelObserver {
    fn on_scrape_complete(&self, screenshots: &[Screenshot], mime_type: &str) {
        self.send(PipelineEvent::ScrapeComplete {
            screenshots: screenshots.to_vec(),
            mime_type: mime_type.to_string(),
        });
    }

    fn on_performance_warning(&self, message: &str) {
        self.send(PipelineEvent::PerformanceWarning(message.to_string()));
    }

    fn on_status(&self, update: &StatusUpdate) {
        self.send(PipelineEvent::Status(update.clone()));
    }

    fn on_data(&self, key: &str, data: &Value) {
        self.send(PipelineEvent::Data {
            key: key.to_string(),
            data: data.clone(),
        });
    }

    fn on_complete(&self, outcome: &RunOutcome) {
        self.send(PipelineEvent::Complete(Box::new(outcome.clone())));
    }

    fn on_error(&self, error: &AuditError) {
        self.send(PipelineEvent::Error(error.clone()));
    }

    fn on_close(&self) {
        self.send(PipelineEvent::Closed);
    }
}
