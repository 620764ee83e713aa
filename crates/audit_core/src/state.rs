use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::progress::StageEvent;
use crate::report::AnalysisReport;

/// A captured (or uploaded) page image. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(default)]
    pub path: String,
    #[serde(rename = "data")]
    pub image_base64: String,
    #[serde(rename = "isMobile", default)]
    pub is_mobile: bool,
    /// Index of the input this image belongs to; not part of the wire shape.
    #[serde(skip)]
    pub input_index: usize,
}

/// Attribution record for one block of the aggregated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSection {
    pub source: String,
    pub from_url: bool,
    pub chars: usize,
}

/// Working set of a single pipeline run.
///
/// Created at run start and owned by that run only; stages mutate it one at
/// a time.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    display_identity: String,
    screenshots: Vec<Screenshot>,
    text: String,
    sections: Vec<TextSection>,
    report: AnalysisReport,
    progress: u8,
    captures_attempted: usize,
    captures_succeeded: usize,
    performance_data: Option<Value>,
    performance_warning: Option<String>,
    animation_data: Option<Value>,
    accessibility_data: Option<Value>,
}

impl RunState {
    pub fn new(display_identity: impl Into<String>) -> Self {
        Self {
            display_identity: display_identity.into(),
            ..Self::default()
        }
    }

    pub fn display_identity(&self) -> &str {
        &self.display_identity
    }

    pub fn push_screenshot(&mut self, screenshot: Screenshot) {
        self.screenshots.push(screenshot);
    }

    pub fn screenshots(&self) -> &[Screenshot] {
        &self.screenshots
    }

    /// Desktop image of the primary input, falling back to any desktop image.
    pub fn primary_screenshot(&self) -> Option<&Screenshot> {
        self.screenshots
            .iter()
            .find(|s| s.input_index == 0 && !s.is_mobile)
            .or_else(|| self.screenshots.iter().find(|s| !s.is_mobile))
    }

    pub fn primary_mobile_screenshot(&self) -> Option<&Screenshot> {
        self.screenshots
            .iter()
            .find(|s| s.input_index == 0 && s.is_mobile)
    }

    /// Append a delimited block of content attributed to `source`.
    pub fn append_text(&mut self, source: &str, content: &str, from_url: bool) {
        self.text.push_str(&format!(
            "\n\n--- START CONTENT FROM {source} ---\n{content}\n--- END CONTENT FROM {source} ---\n\n"
        ));
        self.sections.push(TextSection {
            source: source.to_string(),
            from_url,
            chars: content.trim().chars().count(),
        });
    }

    pub fn aggregated_text(&self) -> &str {
        &self.text
    }

    pub fn text_sections(&self) -> &[TextSection] {
        &self.sections
    }

    /// Trimmed characters across every aggregated section, uploads included.
    pub fn content_chars(&self) -> usize {
        self.sections.iter().map(|s| s.chars).sum()
    }

    pub fn record_capture(&mut self, succeeded: bool) {
        self.captures_attempted += 1;
        if succeeded {
            self.captures_succeeded += 1;
        }
    }

    pub fn captures_attempted(&self) -> usize {
        self.captures_attempted
    }

    pub fn captures_succeeded(&self) -> usize {
        self.captures_succeeded
    }

    pub fn report(&self) -> &AnalysisReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut AnalysisReport {
        &mut self.report
    }

    pub fn into_report(self) -> AnalysisReport {
        self.report
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Apply an event's checkpoint and return the new progress.
    pub fn advance(&mut self, event: &StageEvent) -> u8 {
        self.progress = event.advance(self.progress);
        self.progress
    }

    pub fn set_performance(&mut self, data: Option<Value>, warning: Option<String>) {
        self.performance_data = data;
        self.performance_warning = warning;
    }

    pub fn performance_data(&self) -> Option<&Value> {
        self.performance_data.as_ref()
    }

    pub fn performance_warning(&self) -> Option<&str> {
        self.performance_warning.as_deref()
    }

    pub fn set_artifacts(&mut self, animation: Option<Value>, accessibility: Option<Value>) {
        if animation.is_some() {
            self.animation_data = animation;
        }
        if accessibility.is_some() {
            self.accessibility_data = accessibility;
        }
    }

    pub fn animation_data(&self) -> Option<&Value> {
        self.animation_data.as_ref()
    }

    pub fn accessibility_data(&self) -> Option<&Value> {
        self.accessibility_data.as_ref()
    }
}
