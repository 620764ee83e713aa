use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use audit_core::overall_score;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::{RunOutcome, TopIssues};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{0:?} exists but is not a directory")]
    NotADirectory(PathBuf),
    #[error("could not create report directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("report could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Local directory of finished run reports, one JSON file per run.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `outcome` as `<run-id>.json`, replacing any earlier copy.
    pub fn save(&self, outcome: &RunOutcome) -> Result<PathBuf, PersistError> {
        let document = serde_json::to_vec_pretty(&render_report(outcome)?)?;
        self.write_atomic(&report_filename(&outcome.finalized.run_id), &document)
    }

    /// Write through a temp file in the same directory, then rename over the target.
    pub fn write_atomic(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        self.prepare()?;
        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    fn prepare(&self) -> Result<(), PersistError> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(PersistError::NotADirectory(self.dir.clone())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => fs::create_dir_all(&self.dir)
                .map_err(|source| PersistError::CreateDir {
                    path: self.dir.clone(),
                    source,
                }),
            Err(err) => Err(err.into()),
        }
    }
}

/// `{run_id}.json` with anything outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn report_filename(run_id: &str) -> String {
    let safe: String = run_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if safe.is_empty() {
        "audit.json".to_string()
    } else {
        format!("{safe}.json")
    }
}

/// Saved shape of a run. Screenshot image data is left out; only paths are kept.
pub fn render_report(outcome: &RunOutcome) -> Result<Value, PersistError> {
    let (ranking_source, top_issues) = match &outcome.top_issues {
        TopIssues::Contextual(value) => ("contextual", value.clone()),
        TopIssues::Fallback(issues) => ("fallback", serde_json::to_value(issues)?),
    };
    let screenshots: Vec<Value> = outcome
        .screenshots
        .iter()
        .map(|s| json!({ "path": s.path, "isMobile": s.is_mobile }))
        .collect();
    Ok(json!({
        "runId": outcome.finalized.run_id,
        "screenshotUrl": outcome.finalized.screenshot_url,
        "url": outcome.display_identity,
        "overallScore": overall_score(&outcome.report),
        "captures": {
            "succeeded": outcome.captures_succeeded,
            "attempted": outcome.captures_attempted,
        },
        "screenshots": screenshots,
        "rankingSource": ranking_source,
        "topIssues": top_issues,
        "report": outcome.report,
    }))
}
