// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ih-core
//!
//! Stable domain types shared across the ingest test harness: test specs,
//! fixtures, results, runs, and history. If you only take one dependency
//! from this workspace, take this one.

/// Trend and pass-rate computation over a test's historical results.
pub mod aggregate;
/// Category/group filtering over the static test spec catalog.
pub mod filter;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sentinel written into committed fixtures in place of a real chat
/// identifier. Rehydrated from config at load time.
pub const PLACEHOLDER_CHAT_ID: &str = "{{TEST_CHAT_ID}}";

/// Token that marks a media handle as redacted; such fixtures are invalid.
pub const REDACTED_HANDLE_TOKEN: &str = "{{REDACTED}}";

// ---------------------------------------------------------------------------
// TestSpec
// ---------------------------------------------------------------------------

/// Category a [`TestSpec`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Scope/privacy sigil tests.
    Scope,
    /// Date extraction tests.
    Date,
    /// Archive pipeline tests.
    Archive,
    /// Regression tests pinned to a past bug.
    Regression,
    /// CLI surface tests.
    Cli,
    /// Broad acceptance tests.
    Acceptance,
    /// Cross-component integration tests.
    Integration,
}

impl Category {
    /// All known categories, in a stable order.
    pub const ALL: [Category; 7] = [
        Category::Scope,
        Category::Date,
        Category::Archive,
        Category::Regression,
        Category::Cli,
        Category::Acceptance,
        Category::Integration,
    ];

    /// Lowercase path segment this category maps to under the fixture root.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::Date => "date",
            Self::Archive => "archive",
            Self::Regression => "regression",
            Self::Cli => "cli",
            Self::Acceptance => "acceptance",
            Self::Integration => "integration",
        }
    }
}

/// Kind of input a [`TestSpec`] drives through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Plain text message.
    Text,
    /// A URL shared as message text.
    Url,
    /// Photo attachment.
    Photo,
    /// Document attachment.
    Document,
    /// Voice memo.
    Voice,
    /// Audio file.
    Audio,
}

impl InputKind {
    /// `true` for kinds whose spec identifier is typically spoken rather
    /// than captioned, requiring the runner to search transcribed vault
    /// content for the bracketed id.
    pub fn is_transcribed(&self) -> bool {
        matches!(self, Self::Voice | Self::Audio)
    }
}

/// Describes the input a spec feeds into the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputDescriptor {
    /// Kind of input.
    pub kind: InputKind,
    /// Example text: message body for text/url, caption for media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_text: Option<String>,
    /// Path to a local asset under the fixture root's `assets/` directory,
    /// relative to the fixture root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_asset_path: Option<PathBuf>,
}

/// Target file class a semantic judge sub-spec is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetFileClass {
    /// The raw captured vault file.
    Raw,
    /// A derived/summarized vault file.
    Derived,
}

/// Default confidence threshold (0-100) for a semantic judge sub-spec.
pub const DEFAULT_JUDGE_THRESHOLD: u8 = 80;

/// Semantic-judge sub-spec attached to an [`Expectations`] record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SemanticSubSpec {
    /// What the judge should evaluate, in prose.
    pub description: String,
    /// Verifiable checkpoint statements.
    pub checkpoints: Vec<String>,
    /// Which generated file the judge should read.
    pub target_file_class: TargetFileClass,
    /// Minimum confidence (0-100) for the checkpoint to be considered passed.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: u8,
}

fn default_threshold() -> u8 {
    DEFAULT_JUDGE_THRESHOLD
}

/// Declarative expectations a [`TestSpec`] checks its observed actuals
/// against. Every field is optional; the Validation Engine only emits a
/// [`Check`] for facets that are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Expectations {
    /// Required pipeline name (e.g. `"archive"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_pipeline: Option<String>,
    /// Tags that must be present on the resulting vault file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tags: Vec<String>,
    /// Tags that must not be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden_tags: Vec<String>,
    /// Frontmatter key to expected value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub frontmatter: BTreeMap<String, String>,
    /// Regex the vault filename must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_pattern: Option<String>,
    /// Substrings that must appear in vault content (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_contains: Vec<String>,
    /// Substrings that must not appear in vault content (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_absent: Vec<String>,
    /// Substrings expected in the runner's verbose trace of the pipeline run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbose_contains: Vec<String>,
    /// Regex the archive filename must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_filename_pattern: Option<String>,
    /// Whether an archive sync (dropbox copy) is required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_sync: Option<bool>,
    /// Required notification severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_severity: Option<String>,
    /// Notification fields that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_required_fields: Vec<String>,
    /// Expected date (`YYYY-MM-DD`) embedded in the target filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file_date: Option<String>,
    /// Optional semantic-judge sub-spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticSubSpec>,
}

/// Non-functional metadata attached to a [`TestSpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestSpecMeta {
    /// Link to design doc or issue describing why this test exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_reference: Option<String>,
    /// When set, the runner marks this spec `skipped` with this reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// An immutable description of one integration test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestSpec {
    /// Stable identifier, e.g. `TEST-SCOPE-001`.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Category this spec belongs to.
    pub category: Category,
    /// Optional cross-cutting group tag (e.g. `"pai"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Category-qualified fixture path, e.g. `scope/TEST-SCOPE-001`.
    pub fixture_ref: String,
    /// Describes what triggers the pipeline for this spec.
    pub input: InputDescriptor,
    /// What the runner should check once the pipeline has responded.
    #[serde(default)]
    pub expectations: Expectations,
    /// Optional non-functional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TestSpecMeta>,
}

impl TestSpec {
    /// `true` if this spec carries a semantic judge sub-spec.
    pub fn has_semantic(&self) -> bool {
        self.expectations.semantic.is_some()
    }

    /// The category segment this spec's `fixture_ref` is expected to start
    /// with, per the catalog invariant in §4.5.
    pub fn expected_fixture_category_segment(&self) -> &'static str {
        self.category.path_segment()
    }

    /// Timeout for this spec in milliseconds: 180s for transcribed inputs,
    /// 90s otherwise. Overridable by the runner's configured default.
    pub fn default_timeout_ms(&self) -> u64 {
        if self.input.kind.is_transcribed() {
            180_000
        } else {
            90_000
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A remote media handle: either a backend-assigned file id from a prior
/// send, or a local asset path to be uploaded fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaHandle {
    /// A backend file identifier obtained from a previous send.
    Remote {
        /// Opaque backend file id.
        file_id: String,
    },
    /// A local asset, path relative to `<fixtureRoot>/assets/`.
    Local {
        /// Relative path under the assets directory.
        path: PathBuf,
    },
}

impl MediaHandle {
    /// `true` if this handle carries the redaction/placeholder token and is
    /// therefore unusable without rehydration.
    pub fn is_redacted(&self) -> bool {
        matches!(self, Self::Remote { file_id } if file_id == REDACTED_HANDLE_TOKEN)
    }
}

/// The upstream message payload carried by a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain text or URL message.
    Text {
        /// Chat the message was (or will be) sent into.
        chat_id: String,
        /// Message body.
        text: String,
    },
    /// Photo attachment.
    Photo {
        /// Chat the message was (or will be) sent into.
        chat_id: String,
        /// Media reference.
        handle: MediaHandle,
        /// Optional caption.
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Document attachment.
    Document {
        /// Chat the message was (or will be) sent into.
        chat_id: String,
        /// Media reference.
        handle: MediaHandle,
        /// Optional caption.
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Voice memo.
    Voice {
        /// Chat the message was (or will be) sent into.
        chat_id: String,
        /// Media reference.
        handle: MediaHandle,
    },
    /// Audio file.
    Audio {
        /// Chat the message was (or will be) sent into.
        chat_id: String,
        /// Media reference.
        handle: MediaHandle,
    },
    /// Unrecognized payload shape, preserved verbatim for forward
    /// compatibility with newer producers of fixture data.
    Unknown {
        /// Raw JSON body.
        #[serde(flatten)]
        fields: BTreeMap<String, serde_json::Value>,
    },
}

impl MessagePayload {
    /// Chat identifier carried by this payload, if any.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::Text { chat_id, .. }
            | Self::Photo { chat_id, .. }
            | Self::Document { chat_id, .. }
            | Self::Voice { chat_id, .. }
            | Self::Audio { chat_id, .. } => Some(chat_id.as_str()),
            Self::Unknown { .. } => None,
        }
    }

    /// Media handle carried by this payload, if it is a media variant.
    pub fn media_handle(&self) -> Option<&MediaHandle> {
        match self {
            Self::Photo { handle, .. }
            | Self::Document { handle, .. }
            | Self::Voice { handle, .. }
            | Self::Audio { handle, .. } => Some(handle),
            Self::Text { .. } | Self::Unknown { .. } => None,
        }
    }

    /// Replace the chat identifier in place, used to rehydrate a placeholder
    /// chat id with the real one from config on load.
    pub fn set_chat_id(&mut self, new_chat_id: impl Into<String>) {
        let new_chat_id = new_chat_id.into();
        match self {
            Self::Text { chat_id, .. }
            | Self::Photo { chat_id, .. }
            | Self::Document { chat_id, .. }
            | Self::Voice { chat_id, .. }
            | Self::Audio { chat_id, .. } => *chat_id = new_chat_id,
            Self::Unknown { .. } => {}
        }
    }
}

/// Capture provenance and descriptive metadata for a [`Fixture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FixtureMeta {
    /// Spec identifier this fixture drives.
    pub test_id: String,
    /// When the fixture was captured or (re)populated.
    pub captured_at: DateTime<Utc>,
    /// Who/what captured it: `"populator"` or an operator handle.
    pub captured_by: String,
    /// Human description, usually the registry row's name.
    pub description: String,
    /// `true` if this fixture was synthesized rather than captured from a
    /// real upstream message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
}

/// A committed record of a previously captured upstream message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Fixture {
    /// Capture metadata.
    pub meta: FixtureMeta,
    /// The upstream message payload.
    pub message: MessagePayload,
    /// Backend-assigned numeric message identifier, set once the fixture
    /// has actually been sent into the upstream channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_message_id: Option<i64>,
}

impl Fixture {
    /// Validity rule from §4.2: a numeric backend message id is present,
    /// no media handle carries the redaction/placeholder token, and either
    /// the populator captured it (trusted) or it is less than seven days old.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.backend_message_id.is_none() {
            return false;
        }
        if let Some(handle) = self.message.media_handle() {
            if handle.is_redacted() {
                return false;
            }
        }
        if self.meta.captured_by == "populator" {
            return true;
        }
        let age = now.signed_duration_since(self.meta.captured_at);
        age <= chrono::Duration::days(7)
    }

    /// Rehydrate a placeholder chat identifier with the real configured
    /// test input channel id. No-op if the fixture already carries a real
    /// chat id.
    pub fn rehydrate_chat_id(&mut self, real_chat_id: &str) {
        if self.message.chat_id() == Some(PLACEHOLDER_CHAT_ID) {
            self.message.set_chat_id(real_chat_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Check / TestResult
// ---------------------------------------------------------------------------

/// A single deterministic validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Check {
    /// Canonical check id, e.g. `tag_present:scope/private`.
    pub name: String,
    /// Whether this check passed.
    pub passed: bool,
    /// The expected value, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// The observed value, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// One-sentence human-readable explanation of what was examined.
    pub reasoning: String,
}

/// Outcome status of a [`TestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// All checks passed.
    Passed,
    /// At least one check failed.
    Failed,
    /// Spec carries a skip reason, or its fixture is missing.
    Skipped,
    /// The per-spec deadline elapsed before a correlated notification arrived.
    Timeout,
    /// An unexpected error occurred while running the spec.
    Error,
    /// The run was cancelled before this spec completed.
    Cancelled,
}

impl Status {
    /// Single-character glyph used in the Markdown report: `✓`/`✗`/`⊘`.
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Passed => "\u{2713}",
            Self::Failed | Self::Error | Self::Timeout => "\u{2717}",
            Self::Skipped | Self::Cancelled => "\u{2298}",
        }
    }
}

/// A single checkpoint statement evaluated by the semantic judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointResult {
    /// The checkpoint statement being evaluated.
    pub statement: String,
    /// Whether the judge considered it satisfied.
    pub passed: bool,
}

/// Result of invoking the semantic judge driver for a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SemanticResult {
    /// `confidence >= threshold`.
    pub passed: bool,
    /// Confidence score, 0-100.
    pub confidence: u8,
    /// Judge's prose reasoning.
    pub reasoning: String,
    /// Per-checkpoint breakdown.
    #[serde(default)]
    pub checkpoints: Vec<CheckpointResult>,
}

impl SemanticResult {
    /// The canned result recorded when the judge endpoint is unreachable.
    /// Per §4.8 this never fails an otherwise-passing deterministic result.
    pub fn judge_unavailable() -> Self {
        Self {
            passed: false,
            confidence: 0,
            reasoning: "judge unavailable".to_string(),
            checkpoints: Vec::new(),
        }
    }
}

/// A notification message observed on the test notification channel,
/// per the wire contract in §6: `status`, `pipeline`, `severity`,
/// `output_paths`, and an optional `dropbox_path`, plus any additional
/// named fields the pipeline attaches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationMessage {
    /// Raw message body, searched for the bracketed spec identifier.
    pub body: String,
    /// Pipeline name that produced this notification, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Severity reported by the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Vault-relative paths to files the pipeline produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_paths: Vec<String>,
    /// Archive (dropbox) path, if the pipeline archived the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropbox_path: Option<String>,
    /// Additional named fields beyond the well-known ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl NotificationMessage {
    /// `true` if this notification's body contains the spec's bracketed
    /// identifier, e.g. `[TEST-SCOPE-001]`, per the correlation protocol in
    /// §6.
    pub fn correlates_with(&self, test_id: &str) -> bool {
        self.body.contains(&format!("[{test_id}]"))
    }
}

/// Observed side effects of running a spec through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActualObservations {
    /// Pipeline name reported in the notification, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Tags read from the vault file's frontmatter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Full frontmatter key-value snapshot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub frontmatter: BTreeMap<String, String>,
    /// Path to the primary vault file, relative to the vault root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,
    /// Notification payload fields beyond the well-known ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notification_fields: BTreeMap<String, String>,
    /// Archive (dropbox) path, if the notification carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
}

/// Outcome of running one [`TestSpec`] within a [`Run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestResult {
    /// Which spec this result belongs to.
    pub test_id: String,
    /// Overall status.
    pub status: Status,
    /// Wall-clock duration of the spec's execution, in milliseconds.
    pub duration_ms: u64,
    /// What was observed from the pipeline's side effects.
    #[serde(default)]
    pub actual: ActualObservations,
    /// Every check the Validation Engine emitted.
    #[serde(default)]
    pub checks: Vec<Check>,
    /// `true` if the originating spec carries a semantic sub-spec.
    pub semantic_required: bool,
    /// Semantic judge outcome, present iff deterministic checks passed and
    /// the spec carries a semantic sub-spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticResult>,
}

impl TestResult {
    /// A test passes iff every emitted check passed. A spec with zero
    /// checks is never considered passed.
    pub fn all_checks_passed(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|c| c.passed)
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Describes which subset of the catalog a run was invoked against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunSelection {
    /// `--suite <category>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    /// `--id <testId>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `--group <group>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Aggregate counters for a [`Run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    /// Total specs selected.
    pub total: usize,
    /// Specs whose result is [`Status::Passed`].
    pub passed: usize,
    /// Specs whose result is [`Status::Failed`], [`Status::Error`], or [`Status::Timeout`].
    pub failed: usize,
    /// Specs whose result is [`Status::Skipped`] or [`Status::Cancelled`].
    pub skipped: usize,
    /// Specs that carry a semantic sub-spec.
    pub semantic_required: usize,
    /// Specs for which a semantic judge result was recorded.
    pub semantic_completed: usize,
}

impl RunSummary {
    /// Recompute counters from a full set of results.
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.status {
                Status::Passed => summary.passed += 1,
                Status::Failed | Status::Error | Status::Timeout => summary.failed += 1,
                Status::Skipped | Status::Cancelled => summary.skipped += 1,
            }
            if r.semantic_required {
                summary.semantic_required += 1;
            }
            if r.semantic.is_some() {
                summary.semantic_completed += 1;
            }
        }
        summary
    }
}

/// The sealed record of one invocation of the runner over a selection of
/// specs. `results` is kept in spec-catalog order regardless of completion
/// order (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    /// Identifier, `run-YYYY-MM-DD-NNN`.
    pub id: String,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run was sealed, `None` while in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// What was selected for this run.
    pub selection: RunSelection,
    /// Results in spec-catalog order.
    pub results: Vec<TestResult>,
    /// Rolled-up counters, kept in sync as results are recorded.
    pub summary: RunSummary,
}

impl Run {
    /// Create a fresh, unsealed run over `spec_ids`, each initialised with
    /// a `Skipped` placeholder so `results` is pre-sized in catalog order.
    pub fn new(id: impl Into<String>, selection: RunSelection, spec_ids: &[String]) -> Self {
        let results: Vec<TestResult> = spec_ids
            .iter()
            .map(|test_id| TestResult {
                test_id: test_id.clone(),
                status: Status::Skipped,
                duration_ms: 0,
                actual: ActualObservations::default(),
                checks: Vec::new(),
                semantic_required: false,
                semantic: None,
            })
            .collect();
        let summary = RunSummary::from_results(&results);
        Self {
            id: id.into(),
            started_at: Utc::now(),
            completed_at: None,
            selection,
            results,
            summary,
        }
    }

    /// Record (overwrite) the result for `test_id`, preserving catalog
    /// order. No-op if `test_id` was not part of the original selection.
    pub fn record_result(&mut self, test_id: &str, result: TestResult) {
        if let Some(slot) = self.results.iter_mut().find(|r| r.test_id == test_id) {
            *slot = result;
            self.summary = RunSummary::from_results(&self.results);
        }
    }

    /// Attach a semantic result to an already-recorded test result.
    pub fn record_semantic_result(&mut self, test_id: &str, semantic: SemanticResult) {
        if let Some(slot) = self.results.iter_mut().find(|r| r.test_id == test_id) {
            slot.semantic = Some(semantic);
            self.summary = RunSummary::from_results(&self.results);
        }
    }

    /// Seal the run: stamp `completed_at` and recompute the summary.
    pub fn complete(&mut self) {
        self.summary = RunSummary::from_results(&self.results);
        self.completed_at = Some(Utc::now());
    }

    /// Lookup a result by test id.
    pub fn result_for(&self, test_id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.test_id == test_id)
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One historical data point for a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    /// The run this entry came from.
    pub run_id: String,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// The test's status in that run.
    pub status: Status,
    /// The test's duration in that run, in milliseconds.
    pub duration_ms: u64,
}

/// Direction classification computed from a test's recent result series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// All recent results agree.
    Stable,
    /// The more recent half has a strictly higher pass rate.
    Improving,
    /// The more recent half has a strictly lower pass rate.
    Degrading,
    /// Results alternate beyond the flip threshold within the window.
    Flaky,
}

/// Rolling history for one test across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestHistory {
    /// The test this history tracks.
    pub test_id: String,
    /// Append-only series of results, oldest first. Retention is capped,
    /// see [`aggregate::DEFAULT_RETENTION`].
    pub entries: Vec<HistoryEntry>,
    /// Fraction of entries in the trend window with status [`Status::Passed`].
    pub pass_rate: f64,
    /// Mean duration across the trend window, in milliseconds.
    pub avg_duration_ms: f64,
    /// Current trend classification.
    pub trend: Trend,
}

/// Append-only aggregate of per-test outcomes across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct History {
    /// Per-test history, keyed by test id.
    pub tests: BTreeMap<String, TestHistory>,
}
