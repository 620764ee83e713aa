use audit_core::{
    fallback_ranking, overall_score, AnalysisReport, ExpertKey, RankedIssue, RunState,
    StageEvent, FALLBACK_TOP_N, RANKING_KEY,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn issues(scores: &[f64]) -> serde_json::Value {
    json!(scores
        .iter()
        .map(|s| json!({ "Issue": format!("issue scored {s}"), "Score": s }))
        .collect::<Vec<_>>())
}

fn sample_report() -> AnalysisReport {
    let mut report = AnalysisReport::new();
    report.insert(
        ExpertKey::Ux.report_key(),
        json!({ "CategoryScore": 6.0, "Top5CriticalUXIssues": issues(&[3.0, 9.0]) }),
    );
    report.insert(
        ExpertKey::Product.report_key(),
        json!({ "CategoryScore": 7.5, "Top5CriticalProductIssues": issues(&[1.0, 7.0]) }),
    );
    report
}

#[test]
fn fallback_puts_most_critical_issue_first() {
    let ranked = fallback_ranking(&sample_report());
    let first = &ranked[0];
    assert_eq!(first.expert, ExpertKey::Product);
    assert_eq!(first.source, "Product Audit");
    assert_eq!(first.score, 1.0);

    let scores: Vec<f64> = ranked.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![1.0, 3.0, 7.0, 9.0]);
}

#[test]
fn fallback_is_deterministic_and_stable_on_ties() {
    let mut report = AnalysisReport::new();
    report.insert(
        ExpertKey::Visual.report_key(),
        json!({ "Top5CriticalVisualIssues": issues(&[2.0, 2.0, 2.0]) }),
    );
    report.insert(
        ExpertKey::Ux.report_key(),
        json!({ "Top5CriticalUXIssues": issues(&[2.0, 2.0, 2.0, 8.0]) }),
    );

    let first = fallback_ranking(&report);
    let second = fallback_ranking(&report);
    assert_eq!(first, second);
    assert_eq!(first.len(), FALLBACK_TOP_N);

    let sources: Vec<&str> = first.iter().map(|r: &RankedIssue| r.source).collect();
    assert_eq!(
        sources,
        vec!["UX Audit", "UX Audit", "UX Audit", "Visual Design", "Visual Design"]
    );
}

#[test]
fn fallback_ignores_strategy_and_unscored_entries() {
    let mut report = sample_report();
    report.insert(
        ExpertKey::Strategy.report_key(),
        json!({ "Top5CriticalUXIssues": issues(&[0.0]) }),
    );
    report.insert(
        ExpertKey::Visual.report_key(),
        json!({ "Top5CriticalVisualIssues": [{ "Issue": "no score" }] }),
    );
    let ranked = fallback_ranking(&report);
    assert!(ranked.iter().all(|r| r.expert != ExpertKey::Strategy));
    assert_eq!(ranked.len(), 4);
}

#[test]
fn empty_report_has_no_fallback_and_no_score() {
    let report = AnalysisReport::new();
    assert!(fallback_ranking(&report).is_empty());
    assert_eq!(overall_score(&report), None);
}

#[test]
fn overall_score_averages_scored_experts() {
    assert_eq!(overall_score(&sample_report()), Some(6.8));
}

#[test]
fn report_tracks_expert_keys_in_canonical_order() {
    let mut report = sample_report();
    report.insert(RANKING_KEY, json!([]));
    report.insert("UX sub-findings", json!({}));
    assert_eq!(
        report.experts_present(),
        vec![ExpertKey::Ux, ExpertKey::Product]
    );
    assert_eq!(report.len(), 4);
    assert_eq!(
        ExpertKey::from_report_key("Visual Audit expert"),
        Some(ExpertKey::Visual)
    );
}

#[test]
fn aggregated_text_keeps_source_attribution() {
    let mut state = RunState::new("https://a.example");
    state.append_text("/", "home page words", true);
    state.append_text("uploaded-screenshot-2", "[no live text]", false);
    let text = state.aggregated_text();

    assert_eq!(text.matches("--- START CONTENT FROM").count(), 2);
    assert!(text.contains("--- START CONTENT FROM / ---\nhome page words\n--- END CONTENT FROM / ---"));
    let sources: Vec<&str> = state
        .text_sections()
        .iter()
        .map(|s| s.source.as_str())
        .collect();
    assert_eq!(sources, vec!["/", "uploaded-screenshot-2"]);
    assert_eq!(
        state.content_chars(),
        "home page words".len() + "[no live text]".len()
    );
}

#[test]
fn progress_in_run_state_is_monotonic() {
    let mut state = RunState::new("x");
    state.advance(&StageEvent::AllAnalysesComplete);
    state.advance(&StageEvent::Initiating);
    assert_eq!(state.progress(), 95);
}
