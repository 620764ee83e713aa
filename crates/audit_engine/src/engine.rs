use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use audit_core::AuditInput;
use engine_logging::{engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::observer::ChannelObserver;
use crate::{
    AuditBackend, AuditPipeline, BackendError, BackendSettings, PipelineEvent, PipelineSettings,
    ReqwestBackend, RunTicket,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("backend configuration rejected: {0}")]
    Backend(#[from] BackendError),
}

enum EngineCommand {
    Start {
        ticket: RunTicket,
        inputs: Vec<AuditInput>,
        cancel: CancellationToken,
    },
}

type CancelRegistry = Arc<Mutex<HashMap<RunTicket, CancellationToken>>>;

/// Runs audits on a background tokio runtime and hands events back over a channel.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<(RunTicket, PipelineEvent)>,
    next_ticket: AtomicU64,
    cancels: CancelRegistry,
}

impl EngineHandle {
    pub fn new(backend: BackendSettings, settings: PipelineSettings) -> Result<Self, EngineError> {
        let backend: Arc<dyn AuditBackend> = Arc::new(ReqwestBackend::new(backend)?);
        Self::with_backend(backend, settings)
    }

    pub fn with_backend(
        backend: Arc<dyn AuditBackend>,
        settings: PipelineSettings,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancels: CancelRegistry = Arc::new(Mutex::new(HashMap::new()));
        let pipeline = Arc::new(AuditPipeline::new(backend, settings));
        let runtime = tokio::runtime::Runtime::new()?;

        let registry = cancels.clone();
        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                let pipeline = pipeline.clone();
                let event_tx = event_tx.clone();
                let registry = registry.clone();
                runtime.spawn(async move {
                    handle_command(pipeline.as_ref(), command, event_tx, registry).await;
                });
            }
        });

        Ok(Self {
            cmd_tx,
            event_rx,
            next_ticket: AtomicU64::new(1),
            cancels,
        })
    }

    /// Queue a new run; every event it produces is tagged with the returned ticket.
    pub fn start(&self, inputs: Vec<AuditInput>) -> RunTicket {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(ticket, cancel.clone());
        }
        let command = EngineCommand::Start {
            ticket,
            inputs,
            cancel,
        };
        if self.cmd_tx.send(command).is_err() {
            engine_warn!("Engine thread is gone; run {} will not start", ticket);
            if let Ok(mut cancels) = self.cancels.lock() {
                cancels.remove(&ticket);
            }
        }
        ticket
    }

    /// Raise the cancellation signal for a run. Returns false if it already ended.
    pub fn cancel(&self, ticket: RunTicket) -> bool {
        let token = self
            .cancels
            .lock()
            .ok()
            .and_then(|cancels| cancels.get(&ticket).cloned());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Block until the next event arrives; `None` once the engine thread is gone.
    pub fn recv(&self) -> Option<(RunTicket, PipelineEvent)> {
        self.event_rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<(RunTicket, PipelineEvent)> {
        self.event_rx.try_recv().ok()
    }
}

async fn handle_command(
    pipeline: &AuditPipeline,
    command: EngineCommand,
    event_tx: mpsc::Sender<(RunTicket, PipelineEvent)>,
    registry: CancelRegistry,
) {
    match command {
        EngineCommand::Start {
            ticket,
            inputs,
            cancel,
        } => {
            engine_info!("Starting audit run {} with {} inputs", ticket, inputs.len());
            let observer = ChannelObserver::new(ticket, event_tx);
            let _ = pipeline.run(inputs, &observer, &cancel).await;
            if let Ok(mut cancels) = registry.lock() {
                cancels.remove(&ticket);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_handle() -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (_event_tx, event_rx) = mpsc::channel();
        drop(cmd_rx);
        EngineHandle {
            cmd_tx,
            event_rx,
            next_ticket: AtomicU64::new(1),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[test]
    fn start_without_engine_thread_leaves_no_cancel_entry() {
        let engine = detached_handle();
        let ticket = engine.start(vec![AuditInput::url("https://example.com")]);

        assert!(!engine.cancel(ticket));
        assert!(engine.cancels.lock().unwrap().is_empty());
        assert!(engine.recv().is_none());
    }
}
