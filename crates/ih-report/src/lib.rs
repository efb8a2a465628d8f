// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Markdown rendering for runs and history (§4.10), consumed by the `ingest
//! test status`/`test runs`/`test history` CLI commands.

use std::fmt::Write as _;

use ih_catalog::Catalog;
use ih_core::{Check, Run, Status, TestHistory, TestResult, Trend};

/// How `ingest test history`/aggregate status groups entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// No grouping: a flat list.
    None,
    /// Group by [`ih_core::Category`].
    Category,
    /// Group by a spec's optional cross-cutting group tag.
    Group,
}

fn spec_name<'a>(catalog: &'a Catalog, test_id: &str) -> &'a str {
    catalog.by_id(test_id).map_or(test_id, |s| s.name.as_str())
}

/// Render a sealed (or in-progress) [`Run`] as a Markdown report, per §4.10:
/// run metadata, a per-spec summary table, a failed-tests section with
/// expected/actual/reasoning per failed check, and a passed-tests section
/// with the reasoning behind every check that ran.
#[must_use]
pub fn render_run(run: &Run, catalog: &Catalog) -> String {
    let mut out = String::new();

    writeln!(out, "# Run {}", run.id).unwrap();
    writeln!(out).unwrap();
    writeln!(out, "- Started: {}", run.started_at.to_rfc3339()).unwrap();
    match run.completed_at {
        Some(at) => writeln!(out, "- Completed: {}", at.to_rfc3339()).unwrap(),
        None => writeln!(out, "- Completed: _in progress_").unwrap(),
    }
    writeln!(out, "- Selection: {}", render_selection(run)).unwrap();
    writeln!(
        out,
        "- Summary: {} total, {} passed, {} failed, {} skipped, {}/{} semantic checks completed",
        run.summary.total,
        run.summary.passed,
        run.summary.failed,
        run.summary.skipped,
        run.summary.semantic_completed,
        run.summary.semantic_required,
    )
    .unwrap();
    writeln!(out).unwrap();

    writeln!(out, "## Results").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "| | Test | Name | Duration |").unwrap();
    writeln!(out, "|---|---|---|---|").unwrap();
    for result in &run.results {
        writeln!(
            out,
            "| {} | {} | {} | {}ms |",
            result.status.glyph(),
            result.test_id,
            spec_name(catalog, &result.test_id),
            result.duration_ms,
        )
        .unwrap();
    }
    writeln!(out).unwrap();

    let failed: Vec<&TestResult> = run
        .results
        .iter()
        .filter(|r| matches!(r.status, Status::Failed | Status::Error | Status::Timeout))
        .collect();
    if !failed.is_empty() {
        writeln!(out, "## Failed Tests").unwrap();
        writeln!(out).unwrap();
        for result in &failed {
            render_failed_test(&mut out, result, catalog);
        }
    }

    let passed: Vec<&TestResult> = run.results.iter().filter(|r| r.status == Status::Passed).collect();
    if !passed.is_empty() {
        writeln!(out, "## Passed Tests").unwrap();
        writeln!(out).unwrap();
        for result in &passed {
            render_passed_test(&mut out, result, catalog);
        }
    }

    out
}

fn render_selection(run: &Run) -> String {
    let mut parts = Vec::new();
    if let Some(suite) = &run.selection.suite {
        parts.push(format!("suite={suite}"));
    }
    if let Some(id) = &run.selection.id {
        parts.push(format!("id={id}"));
    }
    if let Some(group) = &run.selection.group {
        parts.push(format!("group={group}"));
    }
    if parts.is_empty() {
        "all specs".to_string()
    } else {
        parts.join(", ")
    }
}

fn render_failed_test(out: &mut String, result: &TestResult, catalog: &Catalog) {
    writeln!(out, "### {} — {}", result.test_id, spec_name(catalog, &result.test_id)).unwrap();
    writeln!(out).unwrap();
    writeln!(out, "Status: `{:?}`, duration: {}ms", result.status, result.duration_ms).unwrap();
    writeln!(out).unwrap();
    let failed_checks: Vec<&Check> = result.checks.iter().filter(|c| !c.passed).collect();
    if failed_checks.is_empty() {
        writeln!(out, "_No checks ran before the run ended._").unwrap();
    } else {
        writeln!(out, "| Check | Expected | Actual | Reasoning |").unwrap();
        writeln!(out, "|---|---|---|---|").unwrap();
        for check in failed_checks {
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                check.name,
                check.expected.as_deref().unwrap_or("-"),
                check.actual.as_deref().unwrap_or("-"),
                check.reasoning,
            )
            .unwrap();
        }
    }
    if let Some(semantic) = &result.semantic {
        writeln!(out).unwrap();
        writeln!(
            out,
            "Semantic judge: confidence {} — {}",
            semantic.confidence, semantic.reasoning
        )
        .unwrap();
    }
    writeln!(out).unwrap();
}

fn render_passed_test(out: &mut String, result: &TestResult, catalog: &Catalog) {
    writeln!(out, "### {} — {}", result.test_id, spec_name(catalog, &result.test_id)).unwrap();
    writeln!(out).unwrap();
    for check in &result.checks {
        writeln!(out, "- `{}`: {}", check.name, check.reasoning).unwrap();
    }
    if let Some(semantic) = &result.semantic {
        writeln!(
            out,
            "- semantic judge (confidence {}): {}",
            semantic.confidence, semantic.reasoning
        )
        .unwrap();
    }
    writeln!(out).unwrap();
}

/// Render the history aggregate as Markdown, grouped per `group_by`.
#[must_use]
pub fn render_history(tests: &[(&String, &TestHistory)], catalog: &Catalog, group_by: GroupBy) -> String {
    let mut out = String::new();
    writeln!(out, "# Test History").unwrap();
    writeln!(out).unwrap();

    match group_by {
        GroupBy::None => {
            render_history_table(&mut out, tests);
        }
        GroupBy::Category => {
            for category in ih_core::Category::ALL {
                let bucket: Vec<(&String, &TestHistory)> = tests
                    .iter()
                    .filter(|(id, _)| catalog.by_id(id).is_some_and(|s| s.category == category))
                    .copied()
                    .collect();
                if bucket.is_empty() {
                    continue;
                }
                writeln!(out, "## {:?}", category).unwrap();
                writeln!(out).unwrap();
                render_history_table(&mut out, &bucket);
            }
        }
        GroupBy::Group => {
            let mut groups: Vec<String> = tests
                .iter()
                .filter_map(|(id, _)| catalog.by_id(id).and_then(|s| s.group.clone()))
                .collect();
            groups.sort();
            groups.dedup();
            for group in groups {
                let bucket: Vec<(&String, &TestHistory)> = tests
                    .iter()
                    .filter(|(id, _)| catalog.by_id(id).and_then(|s| s.group.clone()).as_deref() == Some(group.as_str()))
                    .copied()
                    .collect();
                writeln!(out, "## {group}").unwrap();
                writeln!(out).unwrap();
                render_history_table(&mut out, &bucket);
            }
        }
    }
    out
}

fn render_history_table(out: &mut String, tests: &[(&String, &TestHistory)]) {
    writeln!(out, "| Test | Trend | Pass Rate | Avg Duration |").unwrap();
    writeln!(out, "|---|---|---|---|").unwrap();
    for (id, history) in tests {
        writeln!(
            out,
            "| {} | {} | {:.0}% | {:.0}ms |",
            id,
            trend_label(history.trend),
            history.pass_rate * 100.0,
            history.avg_duration_ms,
        )
        .unwrap();
    }
    writeln!(out).unwrap();
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Stable => "stable",
        Trend::Improving => "improving ↑",
        Trend::Degrading => "degrading ↓",
        Trend::Flaky => "flaky ↯",
    }
}
