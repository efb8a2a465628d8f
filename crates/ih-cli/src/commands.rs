// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations for the `ingest` binary (§6). Each function here
//! corresponds to one CLI subcommand and owns the wiring between the
//! harness crates: config resolution, backend construction, the catalog,
//! the runner, and report rendering.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use ih_backend_core::{MessagingBackend, RetryingBackend};
use ih_cancel::CancelToken;
use ih_catalog::Catalog;
use ih_config::HarnessConfig;
use ih_core::{RunSelection, TestSpec};
use ih_error::{ErrorCode, IhError};
use ih_fixture_store::FixtureStore;
use ih_judge::JudgeClient;
use ih_report::GroupBy;
use ih_run_tracker::RunTracker;
use ih_runner::{ArchiveProbe, NotificationSource, RunOptions, RunnerDeps, VaultReader};
use tokio::sync::Semaphore;

use crate::telegram::{TelegramBackend, TelegramNotifications};

type Result<T> = std::result::Result<T, IhError>;

// ---------------------------------------------------------------------------
// Spec selection
// ---------------------------------------------------------------------------

/// Combine `--id`/`--suite`/`--group` into a single selection over the
/// catalog, per §6. Precedence: `id` narrows to a single spec, else `suite`
/// (an unknown suite name selects nothing), else `group`, else every spec.
pub fn select_specs<'a>(
    catalog: &'a Catalog,
    id: Option<&str>,
    suite: Option<&str>,
    group: Option<&str>,
) -> Vec<&'a TestSpec> {
    if let Some(id) = id {
        return catalog.by_id(id).into_iter().collect();
    }
    if let Some(suite) = suite {
        return ih_core::filter::SpecFilter::by_suite_name(suite)
            .map(|f| f.apply(catalog.all()))
            .unwrap_or_default();
    }
    if let Some(group) = group {
        return catalog.by_group(group);
    }
    catalog.all().iter().collect()
}

fn selection_from(id: Option<&str>, suite: Option<&str>, group: Option<&str>) -> RunSelection {
    RunSelection {
        suite: suite.map(str::to_string),
        id: id.map(str::to_string),
        group: group.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Bootstrap helpers
// ---------------------------------------------------------------------------

fn require(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| {
        IhError::new(ErrorCode::ConfigMissing, format!("missing required config: {field}")).with_context("field", field)
    })
}

fn require_token(config: &HarnessConfig) -> Result<String> {
    require(config.backend_token.clone(), "backend_token")
}

fn require_input_channel(config: &HarnessConfig) -> Result<String> {
    require(config.test_input_channel_id.clone(), "test_input_channel_id")
}

fn require_notification_channel(config: &HarnessConfig) -> Result<String> {
    require(config.test_notification_channel_id.clone(), "test_notification_channel_id")
}

fn require_production_channel(config: &HarnessConfig) -> Result<String> {
    require(config.production_channel_id.clone(), "production_channel_id")
}

fn build_backend(config: &HarnessConfig) -> Result<RetryingBackend<TelegramBackend>> {
    let token = require_token(config)?;
    Ok(RetryingBackend::new(TelegramBackend::new(&token)))
}

fn build_notifications(config: &HarnessConfig) -> Result<TelegramNotifications> {
    let token = require_token(config)?;
    Ok(TelegramNotifications::new(&token))
}

fn build_judge(config: &HarnessConfig) -> JudgeClient {
    match &config.judge_endpoint {
        Some(endpoint) => JudgeClient::new(Some(endpoint.clone()), config.judge_api_key.clone()),
        None => JudgeClient::offline(),
    }
}

fn fixture_store(config: &HarnessConfig) -> Result<FixtureStore> {
    let root = require(config.fixture_root.clone(), "fixture_root")?;
    Ok(FixtureStore::new(root))
}

fn vault_reader(config: &HarnessConfig) -> Result<VaultReader> {
    let root = require(config.vault_root.clone(), "vault_root")?;
    Ok(VaultReader::new(root))
}

/// The archive probe reuses `vault_root` as its root: the spec defines no
/// dedicated dropbox-sync root, and the vault root is the only filesystem
/// location this harness is otherwise told about.
fn archive_probe(config: &HarnessConfig) -> ArchiveProbe {
    match &config.vault_root {
        Some(root) => ArchiveProbe::new(root.as_str()),
        None => ArchiveProbe::unavailable(),
    }
}

fn runs_root(config: &HarnessConfig) -> Result<PathBuf> {
    require(config.runs_root.clone(), "runs_root").map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// test run / test integration
// ---------------------------------------------------------------------------

/// Options threaded through from the CLI's shared run flags.
#[derive(Debug, Clone, Default)]
pub struct RunCliOptions {
    /// `--id <testId>`.
    pub id: Option<String>,
    /// `--suite <category>`.
    pub suite: Option<String>,
    /// `--group <group>`.
    pub group: Option<String>,
    /// `--parallel`: run specs concurrently up to `runner_concurrency`.
    pub parallel: bool,
    /// `--timeout <ms>`: overrides each spec's own timeout.
    pub timeout_ms: Option<u64>,
    /// `--skip-media`: forward text/caption only.
    pub skip_media: bool,
    /// `--skip-llm-judge`: never invoke the semantic judge.
    pub skip_llm_judge: bool,
    /// `--dry-run`: resolve the selection and print it without forwarding
    /// any fixture or triggering the pipeline.
    pub dry_run: bool,
}

/// `ingest test run` / `ingest test integration`: select specs, drive each
/// through the runner, seal a [`ih_core::Run`], and persist/return it, per
/// §4.6/§4.9.
pub async fn run_tests(config: &HarnessConfig, opts: &RunCliOptions, cancel: &CancelToken) -> Result<ih_core::Run> {
    let catalog = Catalog::shared();
    let selected = select_specs(catalog, opts.id.as_deref(), opts.suite.as_deref(), opts.group.as_deref());
    if selected.is_empty() {
        return Err(IhError::new(ErrorCode::ConfigMissing, "no specs matched the given selection")
            .with_context("suite", opts.suite.clone())
            .with_context("group", opts.group.clone())
            .with_context("id", opts.id.clone()));
    }

    let spec_ids: Vec<String> = selected.iter().map(|s| s.id.clone()).collect();
    let selection = selection_from(opts.id.as_deref(), opts.suite.as_deref(), opts.group.as_deref());

    if opts.dry_run {
        for spec in &selected {
            println!("{} — {} ({})", spec.id, spec.name, spec.category.path_segment());
        }
        return Ok(ih_core::Run::new("dry-run", selection, &spec_ids));
    }

    let backend = build_backend(config)?;
    let notifications = build_notifications(config)?;
    let judge = build_judge(config);
    let store = fixture_store(config)?;
    let vault = vault_reader(config)?;
    let archive = archive_probe(config);
    let test_input_channel_id = require_input_channel(config)?;
    let test_notification_channel_id = require_notification_channel(config)?;

    let deps = RunnerDeps {
        backend: &backend,
        notifications: &notifications,
        judge: &judge,
        fixture_store: &store,
        vault: &vault,
        archive: &archive,
        test_input_channel_id: &test_input_channel_id,
        test_notification_channel_id: &test_notification_channel_id,
        poll_interval: ih_runner::DEFAULT_POLL_INTERVAL,
    };
    let run_opts = RunOptions {
        timeout_ms: opts.timeout_ms,
        skip_media: opts.skip_media,
        skip_llm_judge: opts.skip_llm_judge,
    };

    let tracker = RunTracker::create_run(runs_root(config)?, selection, &spec_ids);

    if opts.parallel {
        let semaphore = Arc::new(Semaphore::new(config.runner_concurrency.max(1)));
        let mut tasks = FuturesUnordered::new();
        for spec in &selected {
            let spec = (*spec).clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.push(async {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                ih_runner::run_one_spec(&spec, &deps, &run_opts, cancel).await
            });
        }
        while let Some(result) = tasks.next().await {
            let test_id = result.test_id.clone();
            tracker.record_result(&test_id, result).await;
        }
    } else {
        for spec in &selected {
            let result = ih_runner::run_one_spec(spec, &deps, &run_opts, cancel).await;
            let test_id = result.test_id.clone();
            tracker.record_result(&test_id, result).await;
        }
    }

    tracker.complete_run().await.map_err(ih_run_tracker::RunTrackerError::into_ih_error)
}

/// Render a completed run as Markdown to `<runsRoot>/<runId>.md` and return
/// the rendered text.
pub fn write_run_report(config: &HarnessConfig, run: &ih_core::Run) -> Result<String> {
    let catalog = Catalog::shared();
    let markdown = ih_report::render_run(run, catalog);
    let path = runs_root(config)?.join(format!("{}.md", run.id));
    std::fs::write(&path, &markdown)
        .map_err(|e| IhError::new(ErrorCode::Internal, format!("failed to write report to {}", path.display())).with_source(e))?;
    write_run_metrics(config, run)?;
    Ok(markdown)
}

/// Selection descriptor rendered as a short label for telemetry grouping.
fn selection_label(selection: &ih_core::RunSelection) -> String {
    if let Some(id) = &selection.id {
        format!("id:{id}")
    } else if let Some(suite) = &selection.suite {
        format!("suite:{suite}")
    } else if let Some(group) = &selection.group {
        format!("group:{group}")
    } else {
        "all".to_string()
    }
}

/// Record this run's [`ih_telemetry::RunMetrics`] and write the rolling
/// summary to `<runsRoot>/telemetry.json`. Best-effort: failures here never
/// fail the run, since the sealed run and its Markdown report already are
/// the authoritative record (§4.9 ambient concern, not a core operation).
fn write_run_metrics(config: &HarnessConfig, run: &ih_core::Run) -> Result<()> {
    let duration_ms = match run.completed_at {
        Some(completed) => (completed - run.started_at).num_milliseconds().max(0) as u64,
        None => 0,
    };
    let metrics = ih_telemetry::RunMetrics {
        run_id: run.id.clone(),
        selection: selection_label(&run.selection),
        duration_ms,
        total_count: run.summary.total,
        passed_count: run.summary.passed,
        failed_count: run.summary.failed,
        skipped_count: run.summary.skipped,
        semantic_required: run.summary.semantic_required,
        semantic_completed: run.summary.semantic_completed,
        backend_retries: 0,
    };

    let root = runs_root(config)?;
    let history_path = root.join("telemetry.json");
    let collector = ih_telemetry::MetricsCollector::new();
    if let Ok(existing) = std::fs::read_to_string(&history_path) {
        if let Ok(runs) = serde_json::from_str::<Vec<ih_telemetry::RunMetrics>>(&existing) {
            for r in runs {
                collector.record(r);
            }
        }
    }
    collector.record(metrics);

    let serialized = serde_json::to_string_pretty(&collector.runs())
        .map_err(|e| IhError::new(ErrorCode::Internal, "failed to serialize telemetry").with_source(e))?;
    std::fs::write(&history_path, serialized)
        .map_err(|e| IhError::new(ErrorCode::Internal, format!("failed to write telemetry to {}", history_path.display())).with_source(e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// test capture
// ---------------------------------------------------------------------------

/// `ingest test capture`: populate or refresh fixtures for the selected
/// specs via the Fixture Populator (§4.4).
pub async fn capture_fixtures(
    config: &HarnessConfig,
    id: Option<&str>,
    suite: Option<&str>,
    group: Option<&str>,
    force: bool,
) -> Result<ih_populator::PopulateSummary> {
    let catalog = Catalog::shared();
    let selected = select_specs(catalog, id, suite, group);
    let specs: Vec<TestSpec> = selected.into_iter().cloned().collect();

    let backend = build_backend(config)?;
    let store = fixture_store(config)?;
    let chat_id = require_input_channel(config)?;
    let mode = if force { ih_populator::Mode::Force } else { ih_populator::Mode::Smart };

    Ok(ih_populator::populate(&specs, &store, &backend, &chat_id, mode).await)
}

// ---------------------------------------------------------------------------
// test forward
// ---------------------------------------------------------------------------

/// `ingest test forward`: re-send a single spec's committed fixture into the
/// test input channel without waiting for a correlated notification.
pub async fn forward_one(config: &HarnessConfig, test_id: &str, skip_media: bool) -> Result<()> {
    let store = fixture_store(config)?;
    let chat_id = require_input_channel(config)?;
    let fixture = store
        .find(test_id)
        .map_err(ih_fixture_store::FixtureStoreError::into_ih_error)?
        .ok_or_else(|| IhError::new(ErrorCode::FixtureNotFound, format!("no fixture for {test_id}")))?;
    let fixture = store.rehydrate(fixture, &chat_id);
    let backend = build_backend(config)?;
    ih_runner::forward_fixture(&fixture, &backend, skip_media)
        .await
        .map_err(ih_backend_core::BackendError::into_ih_error)
}

// ---------------------------------------------------------------------------
// test status / test runs / test history
// ---------------------------------------------------------------------------

/// `ingest test status [runId]`: render the most recent run, or a specific
/// one by id, as Markdown.
pub fn run_status(config: &HarnessConfig, run_id: Option<&str>) -> Result<String> {
    let root = runs_root(config)?;
    let id = match run_id {
        Some(id) => id.to_string(),
        None => ih_run_tracker::list_runs(&root)
            .map_err(ih_run_tracker::RunTrackerError::into_ih_error)?
            .into_iter()
            .next()
            .ok_or_else(|| IhError::new(ErrorCode::FixtureNotFound, "no runs recorded yet"))?,
    };
    let run = ih_run_tracker::load_run(&root, &id).map_err(ih_run_tracker::RunTrackerError::into_ih_error)?;
    Ok(ih_report::render_run(&run, Catalog::shared()))
}

/// `ingest test runs`: list every sealed run id, most recent first.
pub fn list_runs(config: &HarnessConfig) -> Result<Vec<String>> {
    ih_run_tracker::list_runs(&runs_root(config)?).map_err(ih_run_tracker::RunTrackerError::into_ih_error)
}

/// `ingest test history <testId>`: render the rolling trend history,
/// restricted to a single test when `test_id` is given, grouped otherwise.
pub fn test_history(config: &HarnessConfig, test_id: Option<&str>, group_by: GroupBy) -> Result<String> {
    let root = runs_root(config)?;
    let history = ih_run_tracker::load_history(&root).map_err(ih_run_tracker::RunTrackerError::into_ih_error)?;
    let catalog = Catalog::shared();
    let tests: Vec<(&String, &ih_core::TestHistory)> = match test_id {
        Some(id) => history.tests.iter().filter(|(key, _)| key.eq_ignore_ascii_case(id)).collect(),
        None => history.tests.iter().collect(),
    };
    if tests.is_empty() {
        return Err(IhError::new(ErrorCode::FixtureNotFound, "no history recorded for that selection"));
    }
    Ok(ih_report::render_history(&tests, catalog, group_by))
}

// ---------------------------------------------------------------------------
// direct
// ---------------------------------------------------------------------------

/// `ingest direct [file]`: send a single ad hoc message (or, when `file` is
/// given, upload it as a document) directly into the test input channel,
/// bypassing the fixture store and catalog entirely. With `skip_tests`,
/// sends into `production_channel_id` instead, bypassing the test harness.
pub async fn direct_send(config: &HarnessConfig, text: Option<&str>, file: Option<&Path>, skip_tests: bool) -> Result<i64> {
    let backend = build_backend(config)?;
    let chat_id = if skip_tests {
        require_production_channel(config)?
    } else {
        require_input_channel(config)?
    };
    let outcome = match file {
        Some(path) => backend
            .upload_local_media(&chat_id, ih_backend_core::MediaVariant::Document, path, text)
            .await
            .map_err(ih_backend_core::BackendError::into_ih_error)?,
        None => {
            let text = text.unwrap_or_default();
            backend
                .send_text(&chat_id, text)
                .await
                .map_err(ih_backend_core::BackendError::into_ih_error)?
        }
    };
    Ok(outcome.message_id)
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// `ingest search <query>`: list catalog specs whose id or name contains
/// `query`, case-insensitively.
pub fn search_catalog(query: &str) -> Vec<&'static TestSpec> {
    let needle = query.to_lowercase();
    Catalog::shared()
        .all()
        .iter()
        .filter(|spec| spec.id.to_lowercase().contains(&needle) || spec.name.to_lowercase().contains(&needle))
        .collect()
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

/// `ingest watch`: poll the test notification channel continuously, logging
/// every notification observed, until cancelled. Never correlates to a spec;
/// this is an operator-facing tail, not a test run.
pub async fn watch_notifications(config: &HarnessConfig, cancel: &CancelToken) -> Result<()> {
    let notifications = build_notifications(config)?;
    let channel_id = require_notification_channel(config)?;
    let poll_interval = ih_runner::DEFAULT_POLL_INTERVAL;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match notifications.poll(&channel_id).await {
            Ok(batch) => {
                for notification in batch {
                    tracing::info!(body = %notification.body, pipeline = ?notification.pipeline, "notification observed");
                }
            }
            Err(err) => {
                tracing::warn!(%err, "notification poll failed, retrying");
            }
        }
        tokio::select! {
            () = tokio::time::sleep(poll_interval) => {},
            () = cancel.cancelled() => return Ok(()),
        }
    }
}
