//! Audit engine: backend transport, streaming decode and the run pipeline.
mod analysis;
mod backend;
mod capture;
mod decode;
mod engine;
mod finalize;
mod observer;
mod persist;
mod pipeline;
mod ranking;
mod types;

pub use backend::{
    AuditBackend, BackendSettings, ByteStream, ReqwestBackend, MODE_CAPTURE, MODE_FINALIZE,
    MODE_PERFORMANCE, MODE_RANK,
};
pub use decode::{DecodedEvent, EventReader, LineDecoder};
pub use engine::{EngineError, EngineHandle};
pub use observer::{AuditObserver, ChannelObserver};
pub use persist::{render_report, report_filename, PersistError, ReportStore};
pub use pipeline::{AuditPipeline, PipelineSettings};
pub use types::{
    AuditError, BackendError, FailureCategory, FailureKind, FinalizedRun, PipelineEvent,
    RunOutcome, RunTicket, StatusUpdate, TopIssues,
};
