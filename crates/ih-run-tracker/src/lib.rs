// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Run Tracker (§4.9): owns the single in-progress [`Run`], serializes
//! writes to it, and persists sealed runs and the rolling history
//! aggregate to `<runsRoot>` with write-then-rename atomicity.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ih_core::{History, HistoryEntry, Run, RunSelection, SemanticResult, TestResult};
use tokio::sync::Mutex;

/// Filename of the aggregate history document under `<runsRoot>`.
pub const HISTORY_FILENAME: &str = "test-history.json";

/// Errors raised while tracking or persisting runs.
#[derive(Debug, thiserror::Error)]
pub enum RunTrackerError {
    /// Failed to read or write a JSON document.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A run or history document did not parse as valid JSON.
    #[error("malformed JSON at {path}: {source}")]
    Malformed {
        /// Path of the malformed document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// No run with the requested id exists under `<runsRoot>`.
    #[error("run not found: {0}")]
    RunNotFound(String),
}

impl RunTrackerError {
    /// Map to the harness-wide error taxonomy.
    pub fn into_ih_error(self) -> ih_error::IhError {
        use ih_error::ErrorCode;
        match self {
            RunTrackerError::RunNotFound(id) => {
                ih_error::IhError::new(ErrorCode::FixtureNotFound, format!("run not found: {id}"))
            }
            other => ih_error::IhError::new(ErrorCode::Internal, other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, RunTrackerError>;

/// Atomically write `value` as pretty JSON to `path`: serialize into a
/// temporary file in the same directory, then rename over the destination.
/// Readers never observe a partially written document.
fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| RunTrackerError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let body = serde_json::to_vec_pretty(value).map_err(|source| RunTrackerError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| RunTrackerError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    tmp.write_all(&body).map_err(|source| RunTrackerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.persist(path)
        .map_err(|e| RunTrackerError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let body = fs::read(path).map_err(|source| RunTrackerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| RunTrackerError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Path for a sealed run's JSON document.
pub fn run_path(runs_root: &Path, run_id: &str) -> PathBuf {
    runs_root.join(format!("{run_id}.json"))
}

/// Path for the aggregate history document.
pub fn history_path(runs_root: &Path) -> PathBuf {
    runs_root.join(HISTORY_FILENAME)
}

/// Allocate the next run id for today, `run-YYYY-MM-DD-NNN`, by scanning
/// `<runsRoot>` for existing run documents sharing today's date prefix.
pub fn next_run_id(runs_root: &Path) -> String {
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let prefix = format!("run-{date}-");
    let mut max_seq = 0u32;
    if let Ok(entries) = fs::read_dir(runs_root) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix(&prefix) {
                if let Some(seq_str) = rest.strip_suffix(".json") {
                    if let Ok(seq) = seq_str.parse::<u32>() {
                        max_seq = max_seq.max(seq);
                    }
                }
            }
        }
    }
    format!("{prefix}{:03}", max_seq + 1)
}

/// Owns the single in-progress run and serializes every mutation to it, per
/// §5's "Run Tracker state: exclusive writer".
pub struct RunTracker {
    runs_root: PathBuf,
    run: Mutex<Run>,
}

impl RunTracker {
    /// Start tracking a fresh run over `spec_ids`, persisting nothing yet.
    pub fn create_run(runs_root: impl Into<PathBuf>, selection: RunSelection, spec_ids: &[String]) -> Self {
        let runs_root = runs_root.into();
        let id = next_run_id(&runs_root);
        Self {
            runs_root,
            run: Mutex::new(Run::new(id, selection, spec_ids)),
        }
    }

    /// The run id assigned at creation.
    pub async fn run_id(&self) -> String {
        self.run.lock().await.id.clone()
    }

    /// Record a spec's deterministic result.
    pub async fn record_result(&self, test_id: &str, result: TestResult) {
        self.run.lock().await.record_result(test_id, result);
    }

    /// Attach a semantic judge result to an already-recorded spec result.
    pub async fn record_semantic_result(&self, test_id: &str, semantic: SemanticResult) {
        self.run.lock().await.record_semantic_result(test_id, semantic);
    }

    /// Seal the run, persist it atomically, and fold its results into the
    /// history aggregate, also persisted atomically. Returns the sealed run.
    pub async fn complete_run(&self) -> Result<Run> {
        let mut run = self.run.lock().await;
        run.complete();
        let sealed = run.clone();
        drop(run);

        atomic_write_json(&run_path(&self.runs_root, &sealed.id), &sealed)?;

        let mut history = load_history(&self.runs_root).unwrap_or_default();
        let completed_at = sealed.completed_at.unwrap_or_else(Utc::now);
        for result in &sealed.results {
            let entry = HistoryEntry {
                run_id: sealed.id.clone(),
                timestamp: completed_at,
                status: result.status,
                duration_ms: result.duration_ms,
            };
            ih_core::aggregate::record(&mut history, &result.test_id, entry);
        }
        atomic_write_json(&history_path(&self.runs_root), &history)?;

        Ok(sealed)
    }
}

/// Load a previously sealed run by id.
pub fn load_run(runs_root: &Path, run_id: &str) -> Result<Run> {
    let path = run_path(runs_root, run_id);
    if !path.exists() {
        return Err(RunTrackerError::RunNotFound(run_id.to_string()));
    }
    read_json(&path)
}

/// List every sealed run under `<runsRoot>`, most recent id first.
pub fn list_runs(runs_root: &Path) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let entries = match fs::read_dir(runs_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(source) => {
            return Err(RunTrackerError::Io {
                path: runs_root.to_path_buf(),
                source,
            });
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(id) = name.strip_suffix(".json") {
            if id.starts_with("run-") {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort();
    ids.reverse();
    Ok(ids)
}

/// Load the aggregate history document, or an empty one if it doesn't exist yet.
pub fn load_history(runs_root: &Path) -> Result<History> {
    let path = history_path(runs_root);
    if !path.exists() {
        return Ok(History::default());
    }
    read_json(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_core::{ActualObservations, Status};

    fn passed_result(test_id: &str) -> TestResult {
        TestResult {
            test_id: test_id.to_string(),
            status: Status::Passed,
            duration_ms: 42,
            actual: ActualObservations::default(),
            checks: vec![ih_core::Check {
                name: "vault_file_created".to_string(),
                passed: true,
                expected: None,
                actual: None,
                reasoning: "ok".to_string(),
            }],
            semantic_required: false,
            semantic: None,
        }
    }

    #[tokio::test]
    async fn next_run_id_starts_at_one_for_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let id = next_run_id(dir.path());
        assert!(id.ends_with("-001"));
    }

    #[tokio::test]
    async fn complete_run_persists_run_json_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let spec_ids = vec!["TEST-SCOPE-001".to_string()];
        let tracker = RunTracker::create_run(dir.path(), RunSelection::default(), &spec_ids);
        tracker
            .record_result("TEST-SCOPE-001", passed_result("TEST-SCOPE-001"))
            .await;
        let sealed = tracker.complete_run().await.unwrap();
        assert_eq!(sealed.summary.passed, 1);

        let loaded = load_run(dir.path(), &sealed.id).unwrap();
        assert_eq!(loaded.id, sealed.id);

        let history = load_history(dir.path()).unwrap();
        assert_eq!(history.tests["TEST-SCOPE-001"].entries.len(), 1);
    }

    #[tokio::test]
    async fn list_runs_returns_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        for seq in 1..=3u32 {
            let run = Run::new(format!("run-2026-01-01-{seq:03}"), RunSelection::default(), &[]);
            atomic_write_json(&run_path(dir.path(), &run.id), &run).unwrap();
        }
        let ids = list_runs(dir.path()).unwrap();
        assert_eq!(ids, vec!["run-2026-01-01-003", "run-2026-01-01-002", "run-2026-01-01-001"]);
    }

    #[tokio::test]
    async fn load_run_errors_on_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_run(dir.path(), "run-2026-01-01-999").unwrap_err();
        assert!(matches!(err, RunTrackerError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn load_history_is_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let history = load_history(dir.path()).unwrap();
        assert!(history.tests.is_empty());
    }
}
