use audit_core::{estimate, ExpertKey, RunState, StageEvent};
use pretty_assertions::assert_eq;

fn init_logging() {
    engine_logging::initialize_for_tests();
}

#[test]
fn capture_task_ratio_maps_into_capture_band() {
    init_logging();
    assert_eq!(estimate(0, "Capture task 3/10: /pricing (desktop)"), 13);
    assert_eq!(estimate(0, "capture TASK 10/10"), 30);
}

#[test]
fn unmatched_text_leaves_progress_unchanged() {
    assert_eq!(estimate(42, "Downloading fonts"), 42);
    assert_eq!(estimate(0, ""), 0);
}

#[test]
fn estimator_never_decreases_on_out_of_order_input() {
    let statuses = [
        "✓ All analyses complete. Finalizing report...",
        "Initiating website capture...",
        "Capture task 1/4: / (desktop)",
        "Running Strategy Audit",
        "Analyzing homepage performance...",
        "✓ Visual Audit analysis complete",
        "Capture task 1/100",
        "garbage 99/1",
    ];
    let mut previous = 0;
    for status in statuses {
        let next = estimate(previous, status);
        assert!(next >= previous, "{status:?} moved progress back");
        previous = next;
    }
    assert_eq!(previous, 95);
}

#[test]
fn canonical_run_walks_the_ladder() {
    let statuses = [
        ("Initiating website capture...", 5),
        ("Capture task 1/2: / (desktop)", 18),
        ("Capture task 2/2: / (mobile)", 30),
        ("✓ Capture complete. 2/2 tasks succeeded.", 30),
        ("Analyzing homepage performance...", 35),
        ("✓ Website content aggregated. Beginning AI analysis...", 40),
        ("Running Strategy Audit", 40),
        ("✓ Strategy Audit analysis complete", 51),
        ("Running UX Audit", 51),
        ("✓ UX Audit analysis complete", 62),
        ("Running Product Audit", 62),
        ("✓ Product Audit analysis complete", 73),
        ("Running Visual Audit", 73),
        ("✓ Visual Audit analysis complete", 84),
        ("Analyzing issues for strategic impact...", 85),
        ("✓ All analyses complete. Finalizing report...", 95),
    ];
    let mut progress = 0;
    for (status, expected) in statuses {
        progress = estimate(progress, status);
        assert_eq!(progress, expected, "after {status:?}");
    }
}

#[test]
fn event_checkpoints_agree_with_their_display_text() {
    let total = ExpertKey::ALL.len();
    let mut events = vec![
        StageEvent::Initiating,
        StageEvent::CaptureTask {
            index: 3,
            total: 10,
            label: "/about (desktop)".to_string(),
        },
        StageEvent::CaptureTaskFailed {
            index: 4,
            total: 10,
            reason: "http status 502".to_string(),
        },
        StageEvent::CaptureComplete {
            succeeded: 9,
            attempted: 10,
        },
        StageEvent::PerformanceStarted,
        StageEvent::ContentAggregated,
        StageEvent::RankingStarted,
        StageEvent::RankingFallback {
            reason: "http status 500".to_string(),
        },
        StageEvent::AllAnalysesComplete,
    ];
    for (index, expert) in ExpertKey::ALL.into_iter().enumerate() {
        events.push(StageEvent::ExpertStarted {
            expert,
            index,
            total,
        });
        events.push(StageEvent::ExpertCompleted {
            expert,
            index,
            total,
        });
        events.push(StageEvent::ExpertSkipped {
            expert,
            reason: "http status 503".to_string(),
        });
    }

    for event in events {
        let from_text = estimate(0, &event.to_string());
        assert_eq!(event.checkpoint().unwrap_or(0), from_text, "{event:?}");
    }
}

#[test]
fn warnings_do_not_move_progress() {
    let mut state = RunState::new("https://a.example");
    state.advance(&StageEvent::ContentAggregated);
    let after = state.advance(&StageEvent::ExpertSkipped {
        expert: ExpertKey::Ux,
        reason: "boom".to_string(),
    });
    assert_eq!(after, 40);
    assert!(StageEvent::RankingFallback {
        reason: String::new()
    }
    .is_warning());
}

#[test]
fn remote_status_is_estimated_from_text() {
    let mut state = RunState::new("https://a.example");
    state.advance(&StageEvent::Remote("Running UX Audit".to_string()));
    assert_eq!(state.progress(), 51);
    state.advance(&StageEvent::Remote("warming up model".to_string()));
    assert_eq!(state.progress(), 51);
    state.advance(&StageEvent::Remote("Report finalized".to_string()));
    assert_eq!(state.progress(), 51);
}
