use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Report key under which the contextual ranking service writes its result.
pub const RANKING_KEY: &str = "Top5ContextualIssues";

/// Number of issues kept by the local fallback ranking.
pub const FALLBACK_TOP_N: usize = 5;

/// One of the independent analysis sub-tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExpertKey {
    Strategy,
    Ux,
    Product,
    Visual,
}

impl ExpertKey {
    /// Canonical execution order.
    pub const ALL: [ExpertKey; 4] = [
        ExpertKey::Strategy,
        ExpertKey::Ux,
        ExpertKey::Product,
        ExpertKey::Visual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExpertKey::Strategy => "Strategy",
            ExpertKey::Ux => "UX",
            ExpertKey::Product => "Product",
            ExpertKey::Visual => "Visual",
        }
    }

    /// Key the expert's main payload is stored under in the report.
    pub fn report_key(self) -> &'static str {
        match self {
            ExpertKey::Strategy => "Strategy Audit expert",
            ExpertKey::Ux => "UX Audit expert",
            ExpertKey::Product => "Product Audit expert",
            ExpertKey::Visual => "Visual Audit expert",
        }
    }

    /// Backend `mode` selector for this expert's analysis request.
    pub fn mode(self) -> &'static str {
        match self {
            ExpertKey::Strategy => "analyze-strategy",
            ExpertKey::Ux => "analyze-ux",
            ExpertKey::Product => "analyze-product",
            ExpertKey::Visual => "analyze-visual",
        }
    }

    /// Field holding the expert's own top critical issues, when it scores any.
    pub fn critical_issues_field(self) -> Option<&'static str> {
        match self {
            ExpertKey::Strategy => None,
            ExpertKey::Ux => Some("Top5CriticalUXIssues"),
            ExpertKey::Product => Some("Top5CriticalProductIssues"),
            ExpertKey::Visual => Some("Top5CriticalVisualIssues"),
        }
    }

    /// Source tag attached to issues in the fallback ranking.
    pub fn issue_source(self) -> &'static str {
        match self {
            ExpertKey::Strategy => "Strategy Audit",
            ExpertKey::Ux => "UX Audit",
            ExpertKey::Product => "Product Audit",
            ExpertKey::Visual => "Visual Design",
        }
    }

    pub fn from_report_key(key: &str) -> Option<ExpertKey> {
        ExpertKey::ALL.into_iter().find(|e| e.report_key() == key)
    }
}

impl fmt::Display for ExpertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulated expert output for one run.
///
/// Keys are only ever inserted or overwritten, never removed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisReport {
    entries: BTreeMap<String, Value>,
}

impl AnalysisReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expert(&self, expert: ExpertKey) -> Option<&Value> {
        self.get(expert.report_key())
    }

    /// Experts whose main key is present, in canonical order.
    pub fn experts_present(&self) -> Vec<ExpertKey> {
        ExpertKey::ALL
            .into_iter()
            .filter(|e| self.contains_key(e.report_key()))
            .collect()
    }
}

/// A critical issue tagged with the expert that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedIssue {
    pub source: &'static str,
    pub expert: ExpertKey,
    pub score: f64,
    pub issue: Value,
}

/// Local ordering used when the contextual ranking call is unavailable.
///
/// Concatenates each expert's critical issues in canonical expert order,
/// stable-sorts by ascending `Score` (lower is more critical) and keeps the
/// first [`FALLBACK_TOP_N`]. Issues without a numeric score are ignored.
pub fn fallback_ranking(report: &AnalysisReport) -> Vec<RankedIssue> {
    let mut issues: Vec<RankedIssue> = ExpertKey::ALL
        .into_iter()
        .filter_map(|expert| {
            let field = expert.critical_issues_field()?;
            let list = report.expert(expert)?.get(field)?.as_array()?;
            Some((expert, list))
        })
        .flat_map(|(expert, list)| {
            list.iter().filter_map(move |issue| {
                let score = issue.get("Score")?.as_f64()?;
                Some(RankedIssue {
                    source: expert.issue_source(),
                    expert,
                    score,
                    issue: issue.clone(),
                })
            })
        })
        .collect();
    issues.sort_by(|a, b| a.score.total_cmp(&b.score));
    issues.truncate(FALLBACK_TOP_N);
    issues
}

/// Mean of the UX, Product and Visual category scores, rounded to one decimal.
///
/// Returns `None` when none of them reported a score.
pub fn overall_score(report: &AnalysisReport) -> Option<f64> {
    let scores: Vec<f64> = [ExpertKey::Ux, ExpertKey::Product, ExpertKey::Visual]
        .into_iter()
        .filter_map(|e| report.expert(e)?.get("CategoryScore")?.as_f64())
        .collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
