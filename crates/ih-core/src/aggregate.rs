// SPDX-License-Identifier: MIT OR Apache-2.0
//! Trend classification and rolling statistics for [`TestHistory`].

use crate::{History, HistoryEntry, Status, TestHistory, Trend};

/// Default size of the trend window: the last N results considered when
/// classifying a test's trend (§4.9).
pub const DEFAULT_WINDOW: usize = 10;

/// Number of pass/fail alternations within the window beyond which a test
/// is classified `flaky` rather than `improving`/`degrading` (§4.9).
pub const FLAKY_FLIP_THRESHOLD: usize = 3;

/// History retention cap: implementation-chosen per §3's "bounded retention
/// (implementation-chosen cap)" invariant. Entries beyond this count are
/// dropped from the front (oldest first) on append.
pub const DEFAULT_RETENTION: usize = 200;

/// Append `entry` to `history.entries` (trimming to [`DEFAULT_RETENTION`])
/// and recompute `pass_rate`, `avg_duration_ms`, and `trend` over the last
/// [`DEFAULT_WINDOW`] entries.
pub fn append_and_recompute(history: &mut TestHistory, entry: HistoryEntry) {
    history.entries.push(entry);
    if history.entries.len() > DEFAULT_RETENTION {
        let overflow = history.entries.len() - DEFAULT_RETENTION;
        history.entries.drain(0..overflow);
    }
    recompute(history);
}

/// Recompute `pass_rate`, `avg_duration_ms`, and `trend` from the existing
/// entry series without appending anything new.
pub fn recompute(history: &mut TestHistory) {
    let window = window_slice(&history.entries, DEFAULT_WINDOW);
    history.pass_rate = pass_rate(window);
    history.avg_duration_ms = avg_duration_ms(window);
    history.trend = classify_trend(window, FLAKY_FLIP_THRESHOLD);
}

/// Ensure `history.tests` has an entry for `test_id` and append a result to
/// it, recomputing derived fields.
pub fn record(history: &mut History, test_id: &str, entry: HistoryEntry) {
    let series = history
        .tests
        .entry(test_id.to_string())
        .or_insert_with(|| TestHistory {
            test_id: test_id.to_string(),
            entries: Vec::new(),
            pass_rate: 0.0,
            avg_duration_ms: 0.0,
            trend: Trend::Stable,
        });
    append_and_recompute(series, entry);
}

fn window_slice(entries: &[HistoryEntry], window: usize) -> &[HistoryEntry] {
    let start = entries.len().saturating_sub(window);
    &entries[start..]
}

fn pass_rate(window: &[HistoryEntry]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let passed = window.iter().filter(|e| e.status == Status::Passed).count();
    passed as f64 / window.len() as f64
}

fn avg_duration_ms(window: &[HistoryEntry]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let total: u64 = window.iter().map(|e| e.duration_ms).sum();
    total as f64 / window.len() as f64
}

/// Classify the trend for a window of results per the §4.9 rule:
///
/// - `stable` if every result in the window agrees (all pass or all fail).
/// - `flaky` if the pass/fail status flips more than `flip_threshold` times
///   across the window.
/// - otherwise, split the window in half and compare pass rates:
///   `improving` if the recent half is strictly higher, `degrading` if
///   strictly lower, `stable` if equal.
pub fn classify_trend(window: &[HistoryEntry], flip_threshold: usize) -> Trend {
    if window.is_empty() {
        return Trend::Stable;
    }

    let all_passed = window.iter().all(|e| e.status == Status::Passed);
    let all_failed = window.iter().all(|e| e.status != Status::Passed);
    if all_passed || all_failed {
        return Trend::Stable;
    }

    let flips = window
        .windows(2)
        .filter(|pair| (pair[0].status == Status::Passed) != (pair[1].status == Status::Passed))
        .count();
    if flips > flip_threshold {
        return Trend::Flaky;
    }

    let mid = window.len() / 2;
    let (older, recent) = window.split_at(mid);
    let older_rate = pass_rate(older);
    let recent_rate = pass_rate(recent);

    if recent_rate > older_rate {
        Trend::Improving
    } else if recent_rate < older_rate {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(status: Status) -> HistoryEntry {
        HistoryEntry {
            run_id: "run-2026-01-01-001".to_string(),
            timestamp: Utc::now(),
            status,
            duration_ms: 100,
        }
    }

    #[test]
    fn uniform_window_is_stable() {
        let window: Vec<_> = std::iter::repeat_with(|| entry(Status::Passed))
            .take(10)
            .collect();
        assert_eq!(classify_trend(&window, FLAKY_FLIP_THRESHOLD), Trend::Stable);
    }

    #[test]
    fn five_fail_then_five_pass_is_improving() {
        let mut window: Vec<_> = std::iter::repeat_with(|| entry(Status::Failed))
            .take(5)
            .collect();
        window.extend(std::iter::repeat_with(|| entry(Status::Passed)).take(5));
        assert_eq!(classify_trend(&window, FLAKY_FLIP_THRESHOLD), Trend::Improving);
    }

    #[test]
    fn five_pass_then_five_fail_is_degrading() {
        let mut window: Vec<_> = std::iter::repeat_with(|| entry(Status::Passed))
            .take(5)
            .collect();
        window.extend(std::iter::repeat_with(|| entry(Status::Failed)).take(5));
        assert_eq!(classify_trend(&window, FLAKY_FLIP_THRESHOLD), Trend::Degrading);
    }

    #[test]
    fn alternating_beyond_threshold_is_flaky() {
        let statuses = [
            Status::Passed,
            Status::Failed,
            Status::Passed,
            Status::Failed,
            Status::Passed,
            Status::Failed,
        ];
        let window: Vec<_> = statuses.iter().map(|s| entry(*s)).collect();
        assert_eq!(classify_trend(&window, FLAKY_FLIP_THRESHOLD), Trend::Flaky);
    }

    #[test]
    fn empty_window_is_stable() {
        assert_eq!(classify_trend(&[], FLAKY_FLIP_THRESHOLD), Trend::Stable);
    }

    #[test]
    fn pass_rate_and_avg_duration_computed_over_window_only() {
        let mut history = TestHistory {
            test_id: "TEST-SCOPE-001".to_string(),
            entries: Vec::new(),
            pass_rate: 0.0,
            avg_duration_ms: 0.0,
            trend: Trend::Stable,
        };
        for _ in 0..12 {
            append_and_recompute(&mut history, entry(Status::Passed));
        }
        assert_eq!(history.entries.len(), 12);
        assert_eq!(history.pass_rate, 1.0);
        assert_eq!(history.avg_duration_ms, 100.0);
    }

    #[test]
    fn retention_cap_drops_oldest_entries() {
        let mut history = TestHistory {
            test_id: "TEST-SCOPE-001".to_string(),
            entries: Vec::new(),
            pass_rate: 0.0,
            avg_duration_ms: 0.0,
            trend: Trend::Stable,
        };
        for _ in 0..(DEFAULT_RETENTION + 5) {
            append_and_recompute(&mut history, entry(Status::Passed));
        }
        assert_eq!(history.entries.len(), DEFAULT_RETENTION);
    }

    #[test]
    fn record_creates_history_entry_on_first_use() {
        let mut history = History::default();
        record(&mut history, "TEST-SCOPE-001", entry(Status::Passed));
        assert!(history.tests.contains_key("TEST-SCOPE-001"));
        assert_eq!(history.tests["TEST-SCOPE-001"].entries.len(), 1);
    }
}
