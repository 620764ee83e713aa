use std::fs;
use std::path::Path;

use anyhow::Context;
use audit_core::{overall_score, AuditInput, PROGRESS_COMPLETE};
use audit_engine::{EngineHandle, PipelineEvent, ReportStore, RunOutcome, RunTicket, TopIssues};
use base64::Engine as _;
use engine_logging::{engine_error, engine_info, engine_warn};

/// Turn command-line arguments into audit inputs.
///
/// An argument naming an existing file is read and sent as an uploaded
/// screenshot; anything else is treated as a URL.
pub fn collect_inputs(raw: &[String]) -> anyhow::Result<Vec<AuditInput>> {
    raw.iter()
        .map(|arg| {
            let path = Path::new(arg);
            if path.is_file() {
                let bytes =
                    fs::read(path).with_context(|| format!("failed to read screenshot {:?}", path))?;
                engine_info!("Using {:?} as an uploaded screenshot ({} bytes)", path, bytes.len());
                Ok(AuditInput::upload(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                ))
            } else {
                Ok(AuditInput::url(arg.clone()))
            }
        })
        .collect()
}

/// Follow one run until the engine reports it closed. Returns the outcome on success.
pub fn follow_run(
    engine: &EngineHandle,
    ticket: RunTicket,
    store: &ReportStore,
) -> anyhow::Result<Option<RunOutcome>> {
    let mut outcome = None;
    let mut failure = None;

    while let Some((event_ticket, event)) = engine.recv() {
        if event_ticket != ticket {
            continue;
        }
        match event {
            PipelineEvent::Status(update) => {
                let marker = if update.event.is_warning() { "!" } else { " " };
                println!("[{:>3}%]{marker} {}", update.progress, update.message);
            }
            PipelineEvent::ScrapeComplete { screenshots, .. } => {
                println!("       {} screenshot(s) captured", screenshots.len());
            }
            PipelineEvent::PerformanceWarning(message) => {
                println!("       ! {message}");
            }
            PipelineEvent::Data { key, .. } => {
                engine_info!("Received {}", key);
            }
            PipelineEvent::Complete(run) => {
                println!("[{PROGRESS_COMPLETE:>3}%]  Audit complete: {}", run.finalized.run_id);
                let path = store
                    .save(&run)
                    .with_context(|| format!("failed to save report in {:?}", store.dir()))?;
                print_summary(&run, &path);
                outcome = Some(*run);
            }
            PipelineEvent::Error(err) => {
                engine_error!("Run {} failed ({:?}): {}", ticket, err.category(), err);
                failure = Some(err);
            }
            PipelineEvent::Closed => break,
        }
    }

    match (outcome, failure) {
        (Some(run), _) => Ok(Some(run)),
        (None, Some(err)) => {
            eprintln!("Audit failed: {err}");
            Ok(None)
        }
        (None, None) => {
            engine_warn!("Engine stopped before run {} closed", ticket);
            anyhow::bail!("engine stopped unexpectedly")
        }
    }
}

fn print_summary(run: &RunOutcome, path: &Path) {
    println!();
    println!("Audited:   {}", run.display_identity);
    println!(
        "Captures:  {}/{} succeeded",
        run.captures_succeeded, run.captures_attempted
    );
    match overall_score(&run.report) {
        Some(score) => println!("Overall:   {score:.1}/10"),
        None => println!("Overall:   n/a"),
    }
    if let Some(url) = &run.finalized.screenshot_url {
        println!("Screenshot: {url}");
    }
    match &run.top_issues {
        TopIssues::Contextual(value) => {
            let count = value.as_array().map(Vec::len).unwrap_or(0);
            println!("Top issues: {count} ranked by strategic impact");
        }
        TopIssues::Fallback(issues) => {
            println!("Top issues (by severity):");
            for issue in issues {
                println!("  {:>4.1}  [{}] {}", issue.score, issue.source, issue_title(&issue.issue));
            }
        }
    }
    println!(
        "Saved:     {} ({})",
        path.display(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
}

fn issue_title(issue: &serde_json::Value) -> String {
    ["Issue", "Title", "issue", "title"]
        .iter()
        .find_map(|k| issue.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| issue.to_string())
}
