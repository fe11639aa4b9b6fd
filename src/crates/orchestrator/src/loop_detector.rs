//! Tracks hallucinated paths and the complexity trajectory across a
//! group's iterations, and decides when the coordinator should force a
//! strategy shift or halt outright.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const STRATEGY_SHIFT_BANNER: &str = "STRATEGY SHIFT REQUIRED";
const HALLUCINATION_REPEAT_THRESHOLD: usize = 2;
const STRATEGY_LOOP_COMPLEXITY_THRESHOLD: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Convergence {
    pub is_stable: bool,
    pub is_diverging: bool,
    pub trend: Trend,
}

/// Compares the tail of `history` to decide whether the group's problem
/// is getting easier, harder, or stuck.
pub fn detect_convergence(history: &[i64]) -> Convergence {
    if history.len() < 2 {
        return Convergence {
            is_stable: true,
            is_diverging: false,
            trend: Trend::Stable,
        };
    }

    let window = &history[history.len().saturating_sub(3)..];
    let deltas: Vec<i64> = window.windows(2).map(|w| w[1] - w[0]).collect();
    let rising = deltas.iter().filter(|d| **d > 0).count();
    let falling = deltas.iter().filter(|d| **d < 0).count();

    let trend = if rising > falling {
        Trend::Increasing
    } else if falling > rising {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    let is_diverging = trend == Trend::Increasing && rising == deltas.len();
    let is_stable = deltas.iter().all(|d| *d == 0);

    Convergence {
        is_stable,
        is_diverging,
        trend,
    }
}

#[derive(Debug, Clone)]
pub struct StrategyLoopVerdict {
    pub should_halt: bool,
    pub warning_only: bool,
}

/// Halts when the trend is diverging *and* at least 2 of the last 3
/// complexity values exceed the threshold, gated by a minimum iteration
/// count so a group can't be halted before it has had a chance to settle.
pub fn evaluate_strategy_loop(
    history: &[i64],
    iteration: u32,
    min_iteration: u32,
    threshold: i64,
) -> StrategyLoopVerdict {
    let convergence = detect_convergence(history);
    let tail = &history[history.len().saturating_sub(3)..];
    let above_threshold = tail.iter().filter(|v| **v > threshold).count();

    let meets_threshold = above_threshold >= 2 && iteration >= min_iteration;

    StrategyLoopVerdict {
        should_halt: convergence.is_diverging && meets_threshold,
        warning_only: convergence.is_diverging && !meets_threshold,
    }
}

pub fn evaluate_strategy_loop_default(history: &[i64], iteration: u32) -> StrategyLoopVerdict {
    evaluate_strategy_loop(history, iteration, 4, STRATEGY_LOOP_COMPLEXITY_THRESHOLD)
}

/// Tracks how many times each hallucinated path has been recorded within
/// one run-group's lifetime.
#[derive(Debug, Default)]
pub struct HallucinationTracker {
    counts: HashMap<String, usize>,
}

impl HallucinationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more occurrence of `path` failing to resolve. Returns
    /// true once this path has now been seen at least
    /// `HALLUCINATION_REPEAT_THRESHOLD` times.
    pub fn record(&mut self, path: &str) -> bool {
        let count = self.counts.entry(path.to_string()).or_insert(0);
        *count += 1;
        *count >= HALLUCINATION_REPEAT_THRESHOLD
    }

    pub fn has_repeated_hallucination(&self) -> bool {
        self.counts
            .values()
            .any(|&c| c >= HALLUCINATION_REPEAT_THRESHOLD)
    }

    pub fn total_hallucinations(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Prepends the strategy-shift banner to a log snippet, used before it's
/// handed to the LM for the next Analysis pass.
pub fn inject_strategy_shift_banner(log_snippet: &str) -> String {
    format!("{STRATEGY_SHIFT_BANNER}\n{log_snippet}")
}

pub fn strategy_loop_feedback_message() -> &'static str {
    "Strategy loop detected. Suggested actions: Break down the problem, Try a different approach, Request human guidance"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hallucination_tracker_flags_on_second_occurrence() {
        let mut tracker = HallucinationTracker::new();
        assert!(!tracker.record("src/missing.ts"));
        assert!(tracker.record("src/missing.ts"));
    }

    #[test]
    fn hallucination_tracker_is_per_path() {
        let mut tracker = HallucinationTracker::new();
        tracker.record("a.ts");
        tracker.record("b.ts");
        assert!(!tracker.has_repeated_hallucination());
        tracker.record("a.ts");
        assert!(tracker.has_repeated_hallucination());
    }

    #[test]
    fn detect_convergence_flags_monotonic_rise_as_diverging() {
        let history = vec![10, 12, 14, 16, 18];
        let convergence = detect_convergence(&history);
        assert!(convergence.is_diverging);
        assert_eq!(convergence.trend, Trend::Increasing);
    }

    #[test]
    fn detect_convergence_stable_history_is_not_diverging() {
        let history = vec![5, 5, 5, 5];
        let convergence = detect_convergence(&history);
        assert!(!convergence.is_diverging);
        assert!(convergence.is_stable);
    }

    #[test]
    fn strategy_loop_halts_on_diverging_history_above_threshold() {
        let history = vec![10, 12, 14, 16, 18];
        let verdict = evaluate_strategy_loop_default(&history, 5);
        assert!(verdict.should_halt);
    }

    #[test]
    fn strategy_loop_is_warning_only_below_threshold() {
        let history = vec![1, 2, 3, 4, 5];
        let verdict = evaluate_strategy_loop_default(&history, 5);
        assert!(!verdict.should_halt);
        assert!(verdict.warning_only);
    }

    #[test]
    fn strategy_loop_does_not_halt_before_min_iteration() {
        let history = vec![10, 20, 30];
        let verdict = evaluate_strategy_loop_default(&history, 2);
        assert!(!verdict.should_halt);
    }

    #[test]
    fn strategy_loop_feedback_message_lists_suggested_actions() {
        let msg = strategy_loop_feedback_message();
        assert!(msg.contains("Suggested actions"));
        assert!(msg.contains("Break down the problem"));
        assert!(msg.contains("Try a different approach"));
        assert!(msg.contains("Request human guidance"));
    }
}
