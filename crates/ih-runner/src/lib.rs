// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The Integration Runner (§4.6): resolves each spec to a fixture, triggers
//! the external pipeline, correlates the resulting notification, reads
//! vault artifacts, and drives the Validation Engine and Semantic Judge
//! Driver, producing one [`TestResult`] per spec.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ih_backend_core::{BackendError, MediaVariant, MessagingBackend};
use ih_cancel::CancelToken;
use ih_core::{
    ActualObservations, Fixture, MediaHandle, MessagePayload, NotificationMessage, Status, TestResult, TestSpec,
};
use ih_fixture_store::FixtureStore;
use ih_judge::JudgeClient;

/// Default spacing between notification-channel polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors reading vault or archive artifacts.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The vault file could not be read from disk.
    #[error("vault file not found: {path}")]
    VaultFileNotFound {
        /// Vault-relative path that was requested.
        path: String,
    },
}

impl RunnerError {
    /// Map to the harness-wide error taxonomy.
    pub fn into_ih_error(self) -> ih_error::IhError {
        match self {
            RunnerError::VaultFileNotFound { path } => {
                ih_error::IhError::new(ih_error::ErrorCode::VaultFileNotFound, format!("vault file not found: {path}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Notification source
// ---------------------------------------------------------------------------

/// Polls the test notification channel the production pipeline publishes
/// into (§6's wire contract, observed not implemented by this crate).
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Return every notification currently buffered for `channel_id`. May
    /// return the same notification across multiple polls; callers
    /// deduplicate by correlation, not by identity.
    async fn poll(&self, channel_id: &str) -> Result<Vec<NotificationMessage>, BackendError>;
}

// ---------------------------------------------------------------------------
// Vault reader
// ---------------------------------------------------------------------------

/// A vault file's parsed frontmatter and body content, per §4.6 step 7.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultFile {
    /// The file's name (not the full path).
    pub filename: String,
    /// Body content, with any leading frontmatter block stripped.
    pub content: String,
    /// Tags parsed from a top-level `tags:` frontmatter list.
    pub tags: Vec<String>,
    /// Every other frontmatter key, as a plain string value.
    pub frontmatter: BTreeMap<String, String>,
}

/// Read-only access to the knowledge vault the pipeline writes into.
/// Per §5, the runner never writes to or cleans up this filesystem.
#[derive(Debug, Clone)]
pub struct VaultReader {
    root: PathBuf,
}

impl VaultReader {
    /// A reader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read and parse the vault file at `relative_path` (relative to the
    /// vault root).
    pub fn read(&self, relative_path: &str) -> Result<VaultFile, RunnerError> {
        let path = self.root.join(relative_path);
        let raw = std::fs::read_to_string(&path).map_err(|_| RunnerError::VaultFileNotFound {
            path: relative_path.to_string(),
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(relative_path)
            .to_string();
        Ok(parse_vault_file(filename, &raw))
    }
}

fn parse_vault_file(filename: String, raw: &str) -> VaultFile {
    let mut lines = raw.lines();
    if lines.next() != Some("---") {
        return VaultFile {
            filename,
            content: raw.to_string(),
            tags: Vec::new(),
            frontmatter: BTreeMap::new(),
        };
    }

    let mut tags = Vec::new();
    let mut frontmatter = BTreeMap::new();
    let mut consumed = 1;
    for line in lines.by_ref() {
        consumed += 1;
        if line.trim() == "---" {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        if key == "tags" {
            tags = value
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|t| t.trim().trim_matches('"').to_string())
                .filter(|t| !t.is_empty())
                .collect();
        } else {
            frontmatter.insert(key.to_string(), value.to_string());
        }
    }

    let content = raw.lines().skip(consumed).collect::<Vec<_>>().join("\n");
    VaultFile {
        filename,
        content,
        tags,
        frontmatter,
    }
}

// ---------------------------------------------------------------------------
// Archive probe
// ---------------------------------------------------------------------------

/// Probes the archive (dropbox sync) collaborator for a copied file's
/// existence. With no configured root the probe is unavailable and every
/// call reports absent, per §4.6 step 7's "if present, probe" wording.
#[derive(Debug, Clone, Default)]
pub struct ArchiveProbe {
    root: Option<PathBuf>,
}

impl ArchiveProbe {
    /// A probe backed by a real archive root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    /// A probe with no backing root: always reports the path absent.
    pub fn unavailable() -> Self {
        Self { root: None }
    }

    /// `true` if `dropbox_path` exists under the configured root.
    pub fn exists(&self, dropbox_path: &str) -> bool {
        self.root.as_ref().is_some_and(|root| root.join(dropbox_path).exists())
    }
}

// ---------------------------------------------------------------------------
// Forwarding a fixture
// ---------------------------------------------------------------------------

/// Re-send a fixture's captured message into the test input channel to
/// retrigger the pipeline (§4.6 step 3). The runner never invokes the
/// pipeline in-process, only observes its side effects.
pub async fn forward_fixture<B: MessagingBackend>(
    fixture: &Fixture,
    backend: &B,
    skip_media: bool,
) -> Result<(), BackendError> {
    match &fixture.message {
        MessagePayload::Text { chat_id, text } => {
            backend.send_text(chat_id, text).await?;
        }
        MessagePayload::Photo { chat_id, handle, caption } => {
            forward_media(backend, chat_id, MediaVariant::Photo, handle, caption.as_deref(), skip_media).await?;
        }
        MessagePayload::Document { chat_id, handle, caption } => {
            forward_media(backend, chat_id, MediaVariant::Document, handle, caption.as_deref(), skip_media).await?;
        }
        MessagePayload::Voice { chat_id, handle } => {
            forward_media(backend, chat_id, MediaVariant::Voice, handle, None, skip_media).await?;
        }
        MessagePayload::Audio { chat_id, handle } => {
            forward_media(backend, chat_id, MediaVariant::Audio, handle, None, skip_media).await?;
        }
        MessagePayload::Unknown { .. } => {}
    }
    Ok(())
}

async fn forward_media<B: MessagingBackend>(
    backend: &B,
    chat_id: &str,
    variant: MediaVariant,
    handle: &MediaHandle,
    caption: Option<&str>,
    skip_media: bool,
) -> Result<(), BackendError> {
    if skip_media {
        return Ok(());
    }
    match handle {
        MediaHandle::Remote { file_id } => {
            backend.send_referenced_media(chat_id, variant, file_id, caption).await?;
        }
        MediaHandle::Local { path } => {
            backend.upload_local_media(chat_id, variant, path.as_path(), caption).await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Notification correlation
// ---------------------------------------------------------------------------

fn correlates(notification: &NotificationMessage, test_id: &str, vault: &VaultReader, transcribed: bool) -> bool {
    if notification.correlates_with(test_id) {
        return true;
    }
    if !transcribed {
        return false;
    }
    notification
        .output_paths
        .iter()
        .filter_map(|path| vault.read(path).ok())
        .any(|file| file.content.to_uppercase().contains(&test_id.to_uppercase()))
}

async fn await_notification<N: NotificationSource>(
    source: &N,
    channel_id: &str,
    test_id: &str,
    transcribed: bool,
    vault: &VaultReader,
    deadline: Duration,
    poll_interval: Duration,
    cancel: &CancelToken,
) -> Option<NotificationMessage> {
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        if let Ok(batch) = source.poll(channel_id).await {
            if let Some(found) = batch.into_iter().find(|n| correlates(n, test_id, vault, transcribed)) {
                return Some(found);
            }
        }
        if start.elapsed() >= deadline {
            return None;
        }
        tokio::select! {
            () = tokio::time::sleep(poll_interval) => {},
            () = cancel.cancelled() => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-spec execution
// ---------------------------------------------------------------------------

/// Everything one [`run_one_spec`] call needs, borrowed for the duration of
/// the call.
pub struct RunnerDeps<'a, B: MessagingBackend, N: NotificationSource> {
    /// The retry-aware messaging backend.
    pub backend: &'a B,
    /// The notification channel poller.
    pub notifications: &'a N,
    /// The semantic judge driver.
    pub judge: &'a JudgeClient,
    /// The fixture store, already rehydrated against the real chat id.
    pub fixture_store: &'a FixtureStore,
    /// Read-only vault access.
    pub vault: &'a VaultReader,
    /// Archive (dropbox) existence probe.
    pub archive: &'a ArchiveProbe,
    /// Channel fixtures are forwarded into.
    pub test_input_channel_id: &'a str,
    /// Channel notifications are polled from.
    pub test_notification_channel_id: &'a str,
    /// Spacing between notification polls.
    pub poll_interval: Duration,
}

/// Per-run flags that shape how specs execute, mirroring the CLI flags in
/// §6.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides each spec's own timeout when set.
    pub timeout_ms: Option<u64>,
    /// Skip media sends, forwarding only the text/caption portion.
    pub skip_media: bool,
    /// Never invoke the semantic judge, even for specs that carry one.
    pub skip_llm_judge: bool,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn terminal_result(spec: &TestSpec, status: Status, duration: Duration) -> TestResult {
    TestResult {
        test_id: spec.id.clone(),
        status,
        duration_ms: duration_ms(duration),
        actual: ActualObservations::default(),
        checks: Vec::new(),
        semantic_required: spec.has_semantic(),
        semantic: None,
    }
}

/// Run one spec end to end (§4.6). Never panics: every failure mode
/// collapses into a [`TestResult`] with a terminal [`Status`].
pub async fn run_one_spec<B: MessagingBackend, N: NotificationSource>(
    spec: &TestSpec,
    deps: &RunnerDeps<'_, B, N>,
    opts: &RunOptions,
    cancel: &CancelToken,
) -> TestResult {
    if let Some(reason) = spec.meta.as_ref().and_then(|m| m.skip_reason.as_ref()) {
        tracing::info!(test_id = %spec.id, %reason, "spec skipped");
        return terminal_result(spec, Status::Skipped, Duration::ZERO);
    }

    let fixture = match deps.fixture_store.find(&spec.id) {
        Ok(Some(f)) => deps.fixture_store.rehydrate(f, deps.test_input_channel_id),
        Ok(None) => {
            tracing::warn!(test_id = %spec.id, "fixture missing, skipping");
            return terminal_result(spec, Status::Skipped, Duration::ZERO);
        }
        Err(err) => {
            tracing::error!(test_id = %spec.id, %err, "fixture store read failed");
            return terminal_result(spec, Status::Error, Duration::ZERO);
        }
    };

    if cancel.is_cancelled() {
        return terminal_result(spec, Status::Cancelled, Duration::ZERO);
    }

    let start = Instant::now();

    if let Err(err) = forward_fixture(&fixture, deps.backend, opts.skip_media).await {
        tracing::error!(test_id = %spec.id, %err, "failed to forward fixture");
        return terminal_result(spec, Status::Error, start.elapsed());
    }

    let timeout = Duration::from_millis(opts.timeout_ms.unwrap_or_else(|| spec.default_timeout_ms()));
    let notification = await_notification(
        deps.notifications,
        deps.test_notification_channel_id,
        &spec.id,
        spec.input.kind.is_transcribed(),
        deps.vault,
        timeout,
        deps.poll_interval,
        cancel,
    )
    .await;

    let Some(notification) = notification else {
        let status = if cancel.is_cancelled() { Status::Cancelled } else { Status::Timeout };
        return terminal_result(spec, status, start.elapsed());
    };

    let vault_file = notification.output_paths.first().and_then(|path| deps.vault.read(path).ok());
    let archive_exists = notification.dropbox_path.as_deref().map(|path| deps.archive.exists(path));

    let mut actual = ActualObservations {
        pipeline: notification.pipeline.clone(),
        notification_fields: notification.fields.clone(),
        archive_path: notification.dropbox_path.clone(),
        vault_path: notification.output_paths.first().cloned(),
        ..Default::default()
    };
    if let Some(sev) = &notification.severity {
        actual.notification_fields.insert("severity".into(), sev.clone());
    }
    if let Some(file) = &vault_file {
        actual.tags = file.tags.clone();
        actual.frontmatter = file.frontmatter.clone();
    }

    let archive_filename = notification
        .dropbox_path
        .as_deref()
        .and_then(|p| Path::new(p).file_name())
        .and_then(|s| s.to_str());

    let ctx = ih_validate::ValidationContext {
        filename: vault_file.as_ref().map(|f| f.filename.as_str()),
        content: vault_file.as_ref().map(|f| f.content.as_str()),
        archive_filename,
        archive_exists,
        verbose_trace: None,
    };

    let checks = ih_validate::validate(&spec.expectations, &actual, &ctx);
    let deterministic_passed = !checks.is_empty() && checks.iter().all(|c| c.passed);

    let semantic = if spec.has_semantic() && deterministic_passed && !opts.skip_llm_judge {
        let sub_spec = spec
            .expectations
            .semantic
            .as_ref()
            .expect("has_semantic guarantees a sub-spec");
        let content = vault_file.as_ref().map(|f| f.content.as_str()).unwrap_or_default();
        Some(deps.judge.judge(content, sub_spec).await)
    } else {
        None
    };

    TestResult {
        test_id: spec.id.clone(),
        status: if deterministic_passed { Status::Passed } else { Status::Failed },
        duration_ms: duration_ms(start.elapsed()),
        actual,
        checks,
        semantic_required: spec.has_semantic(),
        semantic,
    }
}
