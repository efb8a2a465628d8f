// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the ingest test harness.
//!
//! This crate provides [`HarnessConfig`] — the top-level runtime settings —
//! together with helpers for loading from TOML files and environment
//! variables, merging overlays, and producing advisory [`ConfigWarning`]s.
//!
//! Per §4.1, this resolver owns the *only* read of the process environment:
//! no other component may call `std::env::var` directly once a
//! [`HarnessConfig`] has been resolved.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// `TEST_INPUT_CHANNEL_ID` is unset after env + file resolution.
    #[error("config missing: {field}")]
    ConfigMissing {
        /// Name of the missing required field.
        field: String,
    },

    /// Test and production channel identifiers are equal.
    #[error("unsafe config: test channel and production channel must differ")]
    UnsafeConfig,

    /// Other semantic validation failures (non-safety).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// Two configs could not be merged because of conflicting constraints.
    #[error("merge conflict: {reason}")]
    MergeConflict {
        /// Description of the conflict.
        reason: String,
    },
}

impl ConfigError {
    /// Map to the harness-wide error taxonomy.
    pub fn into_ih_error(self) -> ih_error::IhError {
        use ih_error::ErrorCode;
        match self {
            ConfigError::ConfigMissing { field } => {
                ih_error::IhError::new(ErrorCode::ConfigMissing, format!("missing: {field}"))
                    .with_context("field", field)
            }
            ConfigError::UnsafeConfig => ih_error::IhError::new(
                ErrorCode::UnsafeConfig,
                "test channel must not equal production channel",
            ),
            other => ih_error::IhError::new(ErrorCode::ConfigMissing, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// The configured per-spec timeout is unusually large.
    LargeTimeout {
        /// Timeout value in milliseconds.
        timeout_ms: u64,
    },
    /// The configured concurrency ceiling is unusually high.
    HighConcurrency {
        /// Configured concurrency value.
        concurrency: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { timeout_ms } => {
                write!(f, "spec timeout is unusually large ({timeout_ms}ms)")
            }
            ConfigWarning::HighConcurrency { concurrency } => {
                write!(f, "runner concurrency is unusually high ({concurrency})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

/// Default runner concurrency ceiling (§4.6).
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default per-spec timeout in milliseconds (§4.6).
pub const DEFAULT_SPEC_TIMEOUT_MS: u64 = 90_000;

/// Maximum sane per-spec timeout before a warning is raised.
const LARGE_TIMEOUT_THRESHOLD_MS: u64 = 600_000;

/// Maximum sane runner concurrency before a warning is raised.
const HIGH_CONCURRENCY_THRESHOLD: usize = 32;

/// Top-level runtime configuration for the ingest test harness.
///
/// Resolved once at startup per §4.1: credential, channel identifiers,
/// filesystem roots, and runner tuning knobs.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Messaging backend credential (bot token, API key, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_token: Option<String>,

    /// Channel fixtures are sent into to trigger the pipeline. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_input_channel_id: Option<String>,

    /// Channel the pipeline publishes notifications into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_notification_channel_id: Option<String>,

    /// Production channel id, used only for the safety compare against
    /// `test_input_channel_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_channel_id: Option<String>,

    /// Root of the knowledge vault the pipeline writes into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_root: Option<String>,

    /// Root of the fixture store (`<root>/<category>/<testId>.json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_root: Option<String>,

    /// Root directory for run and history JSON documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs_root: Option<String>,

    /// Runner concurrency ceiling.
    #[serde(default = "default_concurrency")]
    pub runner_concurrency: usize,

    /// Default per-spec timeout in milliseconds.
    #[serde(default = "default_spec_timeout_ms")]
    pub spec_timeout_ms: u64,

    /// Semantic judge endpoint URL. `None` runs the judge offline-fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_endpoint: Option<String>,

    /// Bearer credential for the semantic judge endpoint, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_api_key: Option<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_spec_timeout_ms() -> u64 {
    DEFAULT_SPEC_TIMEOUT_MS
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend_token: None,
            test_input_channel_id: None,
            test_notification_channel_id: None,
            production_channel_id: None,
            vault_root: None,
            fixture_root: None,
            runs_root: None,
            runner_concurrency: DEFAULT_CONCURRENCY,
            spec_timeout_ms: DEFAULT_SPEC_TIMEOUT_MS,
            judge_endpoint: None,
            judge_api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`HarnessConfig`] from an optional TOML file path, then apply
/// environment variable overrides on top.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, starts from [`HarnessConfig::default()`].
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => HarnessConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Config files are small and shallow by construction; guard against a
/// malformed or maliciously huge/deeply-nested file before it reaches the
/// TOML deserializer.
const CONFIG_GUARD_LIMITS: ih_json_guard::JsonGuardLimits = ih_json_guard::JsonGuardLimits::new(8, 1_000_000);

/// Parse a TOML string into a [`HarnessConfig`].
pub fn parse_toml(content: &str) -> Result<HarnessConfig, ConfigError> {
    let raw: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })?;
    let as_json = serde_json::to_value(&raw).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })?;
    let guard_errors = ih_json_guard::validate_json_object(&as_json, CONFIG_GUARD_LIMITS);
    if !guard_errors.is_empty() {
        return Err(ConfigError::ValidationError { reasons: guard_errors });
    }
    toml::from_str::<HarnessConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (§6).
///
/// Recognised variables: `BACKEND_TOKEN`, `TEST_INPUT_CHANNEL_ID`,
/// `TEST_NOTIFICATION_CHANNEL_ID`, `PRODUCTION_CHANNEL_ID`, `VAULT_ROOT`,
/// `FIXTURE_ROOT`, `RUNS_ROOT`, `RUNNER_CONCURRENCY`, `SPEC_TIMEOUT_MS`,
/// `JUDGE_ENDPOINT`, `JUDGE_API_KEY`.
pub fn apply_env_overrides(config: &mut HarnessConfig) {
    if let Ok(val) = std::env::var("BACKEND_TOKEN") {
        config.backend_token = Some(val);
    }
    if let Ok(val) = std::env::var("TEST_INPUT_CHANNEL_ID") {
        config.test_input_channel_id = Some(val);
    }
    if let Ok(val) = std::env::var("TEST_NOTIFICATION_CHANNEL_ID") {
        config.test_notification_channel_id = Some(val);
    }
    if let Ok(val) = std::env::var("PRODUCTION_CHANNEL_ID") {
        config.production_channel_id = Some(val);
    }
    if let Ok(val) = std::env::var("VAULT_ROOT") {
        config.vault_root = Some(val);
    }
    if let Ok(val) = std::env::var("FIXTURE_ROOT") {
        config.fixture_root = Some(val);
    }
    if let Ok(val) = std::env::var("RUNS_ROOT") {
        config.runs_root = Some(val);
    }
    if let Ok(val) = std::env::var("RUNNER_CONCURRENCY") {
        if let Ok(n) = val.parse() {
            config.runner_concurrency = n;
        }
    }
    if let Ok(val) = std::env::var("SPEC_TIMEOUT_MS") {
        if let Ok(n) = val.parse() {
            config.spec_timeout_ms = n;
        }
    }
    if let Ok(val) = std::env::var("JUDGE_ENDPOINT") {
        config.judge_endpoint = Some(val);
    }
    if let Ok(val) = std::env::var("JUDGE_API_KEY") {
        config.judge_api_key = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a resolved configuration, returning advisory warnings.
///
/// Hard failures: [`ConfigError::ConfigMissing`] when the test input channel
/// is unset, [`ConfigError::UnsafeConfig`] when the test and production
/// channels are equal. Both are fatal at startup (exit code 2).
pub fn validate_config(config: &HarnessConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let Some(test_input) = config.test_input_channel_id.as_deref() else {
        return Err(ConfigError::ConfigMissing {
            field: "test_input_channel_id".into(),
        });
    };

    if let Some(production) = config.production_channel_id.as_deref() {
        if production == test_input {
            return Err(ConfigError::UnsafeConfig);
        }
    }

    let mut warnings = Vec::new();

    if config.test_notification_channel_id.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "test_notification_channel_id".into(),
            hint: "the runner will be unable to correlate pipeline notifications".into(),
        });
    }
    if config.judge_endpoint.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "judge_endpoint".into(),
            hint: "semantic judge sub-specs will always record judge unavailable".into(),
        });
    }
    if config.spec_timeout_ms > LARGE_TIMEOUT_THRESHOLD_MS {
        warnings.push(ConfigWarning::LargeTimeout {
            timeout_ms: config.spec_timeout_ms,
        });
    }
    if config.runner_concurrency > HIGH_CONCURRENCY_THRESHOLD {
        warnings.push(ConfigWarning::HighConcurrency {
            concurrency: config.runner_concurrency,
        });
    }

    Ok(warnings)
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
pub fn merge_configs(base: HarnessConfig, overlay: HarnessConfig) -> HarnessConfig {
    HarnessConfig {
        backend_token: overlay.backend_token.or(base.backend_token),
        test_input_channel_id: overlay.test_input_channel_id.or(base.test_input_channel_id),
        test_notification_channel_id: overlay
            .test_notification_channel_id
            .or(base.test_notification_channel_id),
        production_channel_id: overlay.production_channel_id.or(base.production_channel_id),
        vault_root: overlay.vault_root.or(base.vault_root),
        fixture_root: overlay.fixture_root.or(base.fixture_root),
        runs_root: overlay.runs_root.or(base.runs_root),
        runner_concurrency: if overlay.runner_concurrency != DEFAULT_CONCURRENCY {
            overlay.runner_concurrency
        } else {
            base.runner_concurrency
        },
        spec_timeout_ms: if overlay.spec_timeout_ms != DEFAULT_SPEC_TIMEOUT_MS {
            overlay.spec_timeout_ms
        } else {
            base.spec_timeout_ms
        },
        judge_endpoint: overlay.judge_endpoint.or(base.judge_endpoint),
        judge_api_key: overlay.judge_api_key.or(base.judge_api_key),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> HarnessConfig {
        HarnessConfig {
            test_input_channel_id: Some("test-input".into()),
            test_notification_channel_id: Some("test-notify".into()),
            production_channel_id: Some("prod".into()),
            ..Default::default()
        }
    }

    // -- Defaults -------------------------------------------------------

    #[test]
    fn default_config_has_expected_defaults() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.runner_concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.spec_timeout_ms, DEFAULT_SPEC_TIMEOUT_MS);
        assert!(cfg.test_input_channel_id.is_none());
    }

    #[test]
    fn default_config_fails_validation_missing_channel() {
        let cfg = HarnessConfig::default();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigMissing { .. }));
    }

    // -- Safety invariant -----------------------------------------------

    #[test]
    fn equal_test_and_production_channels_is_unsafe() {
        let mut cfg = valid_config();
        cfg.production_channel_id = cfg.test_input_channel_id.clone();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::UnsafeConfig));
    }

    #[test]
    fn distinct_channels_pass_safety_check() {
        let cfg = valid_config();
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn missing_production_channel_is_not_unsafe() {
        let mut cfg = valid_config();
        cfg.production_channel_id = None;
        assert!(validate_config(&cfg).is_ok());
    }

    // -- Warnings ---------------------------------------------------------

    #[test]
    fn missing_notification_channel_warns() {
        let mut cfg = valid_config();
        cfg.test_notification_channel_id = None;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::MissingOptionalField { field, .. } if field == "test_notification_channel_id"
        )));
    }

    #[test]
    fn missing_judge_endpoint_warns() {
        let cfg = valid_config();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::MissingOptionalField { field, .. } if field == "judge_endpoint")));
    }

    #[test]
    fn large_timeout_warns() {
        let mut cfg = valid_config();
        cfg.spec_timeout_ms = 1_000_000;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::LargeTimeout { .. })));
    }

    #[test]
    fn high_concurrency_warns() {
        let mut cfg = valid_config();
        cfg.runner_concurrency = 64;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::HighConcurrency { .. })));
    }

    // -- Parsing / loading -------------------------------------------------

    #[test]
    fn parse_toml_reads_fields() {
        let toml_src = r#"
            test_input_channel_id = "test-input"
            runner_concurrency = 3
        "#;
        let cfg = parse_toml(toml_src).unwrap();
        assert_eq!(cfg.test_input_channel_id.as_deref(), Some("test-input"));
        assert_eq!(cfg.runner_concurrency, 3);
    }

    #[test]
    fn parse_toml_rejects_malformed_input() {
        let err = parse_toml("not valid = = toml").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn parse_toml_rejects_payloads_too_deeply_nested() {
        let mut path = String::from("t0");
        for i in 1..12 {
            path.push_str(&format!(".t{i}"));
        }
        let nested = format!("[{path}]\nx = 1\n");
        let err = parse_toml(&nested).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn load_config_missing_file_errors() {
        let err = load_config(Some(Path::new("/nonexistent/path.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_config_reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"test_input_channel_id = "from-file""#).unwrap();
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.test_input_channel_id.as_deref(), Some("from-file"));
    }

    #[test]
    fn load_config_none_path_yields_defaults() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg, HarnessConfig::default());
    }

    // -- Env overrides ----------------------------------------------------

    #[test]
    fn env_override_sets_test_input_channel() {
        // SAFETY: test runs single-threaded per-process for env var tests.
        unsafe {
            std::env::set_var("TEST_INPUT_CHANNEL_ID", "env-channel");
        }
        let mut cfg = HarnessConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.test_input_channel_id.as_deref(), Some("env-channel"));
        unsafe {
            std::env::remove_var("TEST_INPUT_CHANNEL_ID");
        }
    }

    #[test]
    fn env_override_parses_numeric_fields() {
        unsafe {
            std::env::set_var("RUNNER_CONCURRENCY", "9");
            std::env::set_var("SPEC_TIMEOUT_MS", "12345");
        }
        let mut cfg = HarnessConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.runner_concurrency, 9);
        assert_eq!(cfg.spec_timeout_ms, 12345);
        unsafe {
            std::env::remove_var("RUNNER_CONCURRENCY");
            std::env::remove_var("SPEC_TIMEOUT_MS");
        }
    }

    #[test]
    fn env_override_ignores_unparseable_numeric_fields() {
        unsafe {
            std::env::set_var("RUNNER_CONCURRENCY", "not-a-number");
        }
        let mut cfg = HarnessConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.runner_concurrency, DEFAULT_CONCURRENCY);
        unsafe {
            std::env::remove_var("RUNNER_CONCURRENCY");
        }
    }

    // -- Merging -----------------------------------------------------------

    #[test]
    fn merge_overlay_wins_on_conflict() {
        let base = HarnessConfig {
            vault_root: Some("/base/vault".into()),
            ..Default::default()
        };
        let overlay = HarnessConfig {
            vault_root: Some("/overlay/vault".into()),
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.vault_root.as_deref(), Some("/overlay/vault"));
    }

    #[test]
    fn merge_falls_back_to_base_when_overlay_absent() {
        let base = HarnessConfig {
            vault_root: Some("/base/vault".into()),
            ..Default::default()
        };
        let overlay = HarnessConfig::default();
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.vault_root.as_deref(), Some("/base/vault"));
    }

    // -- Error taxonomy mapping -------------------------------------------

    #[test]
    fn config_missing_maps_to_config_missing_code() {
        let err = ConfigError::ConfigMissing {
            field: "test_input_channel_id".into(),
        }
        .into_ih_error();
        assert_eq!(err.code, ih_error::ErrorCode::ConfigMissing);
    }

    #[test]
    fn unsafe_config_maps_to_unsafe_config_code() {
        let err = ConfigError::UnsafeConfig.into_ih_error();
        assert_eq!(err.code, ih_error::ErrorCode::UnsafeConfig);
    }
}
