// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The deterministic Validation Engine (§4.7): compares a spec's declared
//! [`Expectations`] against the actual observations the Integration Runner
//! collected, emitting one [`Check`] per declared facet.
//!
//! The engine never short-circuits: every declared expectation is checked
//! and recorded, even once an earlier one has already failed, so the
//! report a run produces is always complete.

use ih_core::{ActualObservations, Check, Expectations};
use regex::Regex;

/// Additional observations the runner collects that don't live on
/// [`ActualObservations`] because they are inputs to validation, not facts
/// worth persisting on the [`ih_core::TestResult`] (the raw content and
/// trace text can be large).
#[derive(Debug, Clone, Default)]
pub struct ValidationContext<'a> {
    /// Filename of the primary vault file (not the full path).
    pub filename: Option<&'a str>,
    /// Raw content of the primary vault file.
    pub content: Option<&'a str>,
    /// Filename of the archive (dropbox) copy, if any.
    pub archive_filename: Option<&'a str>,
    /// `true`/`false` once the archive collaborator has been probed, `None`
    /// if no probe was needed.
    pub archive_exists: Option<bool>,
    /// The runner's verbose trace of the pipeline run, if collected.
    pub verbose_trace: Option<&'a str>,
}

/// Run every declared expectation against `actual`/`ctx`, in declaration
/// order, returning one [`Check`] per facet the spec declared.
pub fn validate(expectations: &Expectations, actual: &ActualObservations, ctx: &ValidationContext<'_>) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(vault_file_created_check(actual));

    if let Some(pipeline) = &expectations.required_pipeline {
        checks.push(pipeline_check(pipeline, actual));
    }

    for tag in &expectations.required_tags {
        checks.push(tag_present_check(tag, actual));
    }

    for tag in &expectations.forbidden_tags {
        checks.push(tag_absent_check(tag, actual));
    }

    for (key, expected) in &expectations.frontmatter {
        checks.push(frontmatter_check(key, expected, actual));
    }

    if let Some(pattern) = &expectations.filename_pattern {
        checks.push(pattern_check("filename_pattern", pattern, ctx.filename));
    }

    if let Some(date) = &expectations.target_file_date {
        checks.push(filename_date_check(date, ctx.filename));
    }

    for substr in &expectations.content_contains {
        checks.push(content_contains_check(substr, ctx.content, true));
    }

    for substr in &expectations.content_absent {
        checks.push(content_contains_check(substr, ctx.content, false));
    }

    for substr in &expectations.verbose_contains {
        checks.push(verbose_contains_check(substr, ctx.verbose_trace));
    }

    if let Some(pattern) = &expectations.archive_filename_pattern {
        checks.push(pattern_check("archive_filename_pattern", pattern, ctx.archive_filename));
    }

    if let Some(want_sync) = expectations.archive_sync {
        checks.push(archive_exists_check(want_sync, ctx.archive_exists));
    }

    if let Some(severity) = &expectations.notification_severity {
        checks.push(severity_check(severity, actual));
    }

    for field in &expectations.notification_required_fields {
        checks.push(has_field_check(field, actual));
    }

    checks
}

fn vault_file_created_check(actual: &ActualObservations) -> Check {
    let passed = actual.vault_path.is_some();
    Check {
        name: "vault_file_created".to_string(),
        passed,
        expected: Some("a vault file".to_string()),
        actual: actual.vault_path.clone(),
        reasoning: if passed {
            format!("a vault file was created at {}", actual.vault_path.as_deref().unwrap_or(""))
        } else {
            "no vault file path was reported by the pipeline notification".to_string()
        },
    }
}

fn pipeline_check(expected: &str, actual: &ActualObservations) -> Check {
    let actual_pipeline = actual.pipeline.as_deref();
    let passed = actual_pipeline.is_some_and(|p| p.eq_ignore_ascii_case(expected));
    Check {
        name: format!("pipeline:{expected}"),
        passed,
        expected: Some(expected.to_string()),
        actual: actual_pipeline.map(str::to_string),
        reasoning: format!(
            "the notification reported pipeline {:?}, expected {expected:?}",
            actual_pipeline.unwrap_or("<none>")
        ),
    }
}

fn tag_present_check(tag: &str, actual: &ActualObservations) -> Check {
    let passed = actual.tags.iter().any(|t| t.eq_ignore_ascii_case(tag));
    Check {
        name: format!("tag_present:{tag}"),
        passed,
        expected: Some(tag.to_string()),
        actual: Some(actual.tags.join(", ")),
        reasoning: if passed {
            format!("tag {tag:?} is present in the vault file's frontmatter tags")
        } else {
            format!("tag {tag:?} is absent from the vault file's frontmatter tags")
        },
    }
}

fn tag_absent_check(tag: &str, actual: &ActualObservations) -> Check {
    let present = actual.tags.iter().any(|t| t.eq_ignore_ascii_case(tag));
    Check {
        name: format!("tag_absent:{tag}"),
        passed: !present,
        expected: Some(format!("not {tag}")),
        actual: Some(actual.tags.join(", ")),
        reasoning: if present {
            format!("forbidden tag {tag:?} was found in the vault file's frontmatter tags")
        } else {
            format!("forbidden tag {tag:?} is correctly absent")
        },
    }
}

fn frontmatter_check(key: &str, expected: &str, actual: &ActualObservations) -> Check {
    let actual_value = actual.frontmatter.get(key);
    let passed = actual_value.is_some_and(|v| v.trim() == expected.trim());
    Check {
        name: format!("frontmatter:{key}"),
        passed,
        expected: Some(expected.to_string()),
        actual: actual_value.cloned(),
        reasoning: format!(
            "frontmatter key {key:?} was {:?}, expected {expected:?}",
            actual_value.map(String::as_str).unwrap_or("<absent>")
        ),
    }
}

fn pattern_check(name: &str, pattern: &str, haystack: Option<&str>) -> Check {
    let haystack = haystack.unwrap_or("");
    let passed = match Regex::new(pattern) {
        Ok(re) => re.is_match(haystack),
        Err(_) => false,
    };
    Check {
        name: name.to_string(),
        passed,
        expected: Some(pattern.to_string()),
        actual: Some(haystack.to_string()),
        reasoning: format!("{haystack:?} matched against pattern {pattern:?}: {passed}"),
    }
}

fn filename_date_check(date: &str, filename: Option<&str>) -> Check {
    let filename = filename.unwrap_or("");
    let passed = filename.contains(date);
    Check {
        name: format!("filename_date:{date}"),
        passed,
        expected: Some(date.to_string()),
        actual: Some(filename.to_string()),
        reasoning: format!("filename {filename:?} {} date {date:?}", if passed { "contains" } else { "does not contain" }),
    }
}

fn content_contains_check(substr: &str, content: Option<&str>, want_present: bool) -> Check {
    let content = content.unwrap_or("");
    let present = content.to_lowercase().contains(&substr.to_lowercase());
    let passed = present == want_present;
    let name = if want_present {
        format!("content_contains:{substr}")
    } else {
        format!("content_absent:{substr}")
    };
    Check {
        name,
        passed,
        expected: Some(if want_present { substr.to_string() } else { format!("not {substr}") }),
        actual: Some(if present { "present".to_string() } else { "absent".to_string() }),
        reasoning: format!("substring {substr:?} was {} in the vault content", if present { "found" } else { "not found" }),
    }
}

fn verbose_contains_check(substr: &str, trace: Option<&str>) -> Check {
    let trace = trace.unwrap_or("");
    let passed = trace.to_lowercase().contains(&substr.to_lowercase());
    Check {
        name: format!("verbose_contains:{substr}"),
        passed,
        expected: Some(substr.to_string()),
        actual: Some(if passed { "present".to_string() } else { "absent".to_string() }),
        reasoning: format!("substring {substr:?} was {} in the runner's verbose trace", if passed { "found" } else { "not found" }),
    }
}

fn archive_exists_check(want_sync: bool, probed: Option<bool>) -> Check {
    let actual = probed.unwrap_or(false);
    let passed = actual == want_sync;
    Check {
        name: "archive_exists".to_string(),
        passed,
        expected: Some(want_sync.to_string()),
        actual: Some(actual.to_string()),
        reasoning: format!("archive presence was {actual}, expected {want_sync}"),
    }
}

fn severity_check(expected: &str, actual: &ActualObservations) -> Check {
    let actual_severity = actual.notification_fields.get("severity").map(String::as_str);
    let passed = actual_severity.is_some_and(|s| s.eq_ignore_ascii_case(expected));
    Check {
        name: "events_severity".to_string(),
        passed,
        expected: Some(expected.to_string()),
        actual: actual_severity.map(str::to_string),
        reasoning: format!(
            "notification severity was {:?}, expected {expected:?}",
            actual_severity.unwrap_or("<none>")
        ),
    }
}

fn has_field_check(field: &str, actual: &ActualObservations) -> Check {
    let passed = actual.notification_fields.contains_key(field);
    Check {
        name: format!("events_has_field:{field}"),
        passed,
        expected: Some(field.to_string()),
        actual: Some(actual.notification_fields.keys().cloned().collect::<Vec<_>>().join(", ")),
        reasoning: format!("notification fields {} key {field:?}", if passed { "included" } else { "did not include" }),
    }
}
