//! Unified error taxonomy with stable error codes for the ingest test harness.
//!
//! Every harness error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by [`IhError::new`]
//! to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Config and environment resolution errors.
    Config,
    /// Fixture store errors.
    Fixture,
    /// Messaging backend client errors.
    Backend,
    /// Integration pipeline correlation/timeout errors.
    Pipeline,
    /// Vault artifact read errors.
    Vault,
    /// Validation engine errors.
    Validation,
    /// Semantic judge driver errors.
    Judge,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Fixture => "fixture",
            Self::Backend => "backend",
            Self::Pipeline => "pipeline",
            Self::Vault => "vault",
            Self::Validation => "validation",
            Self::Judge => "judge",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Config --
    /// The test input channel is unset.
    ConfigMissing,
    /// Test and production channel identifiers are equal.
    UnsafeConfig,

    // -- Fixture --
    /// Fixture failed the validity rule (placeholder id, redacted media, stale capture).
    FixtureInvalid,
    /// No fixture exists for the requested test id.
    FixtureNotFound,

    // -- Backend --
    /// Backend responded with a rate-limit signal.
    BackendRateLimited,
    /// Backend rejected the payload outright.
    BackendRejected,
    /// Backend is unreachable or returned a transport-level failure.
    BackendUnavailable,

    // -- Pipeline --
    /// Deadline elapsed waiting for a correlated notification.
    PipelineTimeout,

    // -- Vault --
    /// Expected vault artifact file does not exist.
    VaultFileNotFound,

    // -- Validation --
    /// One or more declared checks failed.
    ValidationFailed,

    // -- Judge --
    /// Semantic judge endpoint could not be reached.
    JudgeUnavailable,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigMissing | Self::UnsafeConfig => ErrorCategory::Config,
            Self::FixtureInvalid | Self::FixtureNotFound => ErrorCategory::Fixture,
            Self::BackendRateLimited | Self::BackendRejected | Self::BackendUnavailable => {
                ErrorCategory::Backend
            }
            Self::PipelineTimeout => ErrorCategory::Pipeline,
            Self::VaultFileNotFound => ErrorCategory::Vault,
            Self::ValidationFailed => ErrorCategory::Validation,
            Self::JudgeUnavailable => ErrorCategory::Judge,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"CONFIG_MISSING"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::UnsafeConfig => "UNSAFE_CONFIG",
            Self::FixtureInvalid => "FIXTURE_INVALID",
            Self::FixtureNotFound => "FIXTURE_NOT_FOUND",
            Self::BackendRateLimited => "BACKEND_RATE_LIMITED",
            Self::BackendRejected => "BACKEND_REJECTED",
            Self::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Self::PipelineTimeout => "PIPELINE_TIMEOUT",
            Self::VaultFileNotFound => "VAULT_FILE_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::JudgeUnavailable => "JUDGE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// `true` for codes that map to CLI exit code 2 (config/fatal) rather
    /// than 1 (test failures).
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Config)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IhError
// ---------------------------------------------------------------------------

/// Unified harness error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use ih_error::{IhError, ErrorCode};
///
/// let err = IhError::new(ErrorCode::BackendRateLimited, "429 from messaging backend")
///     .with_context("retry_after_ms", 2_000)
///     .with_context("channel", "test-input");
/// ```
pub struct IhError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl IhError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// CLI exit code this error should surface as: `2` for config/fatal
    /// categories, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.code.is_fatal() { 2 } else { 1 }
    }
}

impl fmt::Debug for IhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("IhError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for IhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for IhError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of an [`IhError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IhErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&IhError> for IhErrorDto {
    fn from(err: &IhError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<IhErrorDto> for IhError {
    fn from(dto: IhErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    /// All error codes for exhaustive iteration in tests.
    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ConfigMissing,
        ErrorCode::UnsafeConfig,
        ErrorCode::FixtureInvalid,
        ErrorCode::FixtureNotFound,
        ErrorCode::BackendRateLimited,
        ErrorCode::BackendRejected,
        ErrorCode::BackendUnavailable,
        ErrorCode::PipelineTimeout,
        ErrorCode::VaultFileNotFound,
        ErrorCode::ValidationFailed,
        ErrorCode::JudgeUnavailable,
        ErrorCode::Internal,
    ];

    // -- Construction & Display -----------------------------------------

    #[test]
    fn basic_construction() {
        let err = IhError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.context.is_empty());
        assert!(err.source.is_none());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = IhError::new(ErrorCode::FixtureNotFound, "no fixture for TEST-SCOPE-001");
        let s = err.to_string();
        assert!(s.starts_with("[FIXTURE_NOT_FOUND]"));
        assert!(s.contains("no fixture for TEST-SCOPE-001"));
    }

    #[test]
    fn display_includes_context_as_json() {
        let err = IhError::new(ErrorCode::BackendRateLimited, "too many requests")
            .with_context("retry_after_ms", 1500);
        let s = err.to_string();
        assert!(s.contains("retry_after_ms"));
        assert!(s.contains("1500"));
    }

    #[test]
    fn debug_omits_empty_context_and_source() {
        let err = IhError::new(ErrorCode::Internal, "x");
        let d = format!("{err:?}");
        assert!(!d.contains("context"));
        assert!(!d.contains("source"));
    }

    #[test]
    fn debug_includes_populated_fields() {
        let err = IhError::new(ErrorCode::Internal, "x")
            .with_context("k", "v")
            .with_source(io::Error::other("disk full"));
        let d = format!("{err:?}");
        assert!(d.contains("context"));
        assert!(d.contains("source"));
    }

    // -- Builder chaining --------------------------------------------------

    #[test]
    fn with_context_inserts_multiple_keys() {
        let err = IhError::new(ErrorCode::ValidationFailed, "checks failed")
            .with_context("spec_id", "TEST-SCOPE-001")
            .with_context("failed_checks", 2);
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context["spec_id"], serde_json::json!("TEST-SCOPE-001"));
        assert_eq!(err.context["failed_checks"], serde_json::json!(2));
    }

    #[test]
    fn with_context_overwrites_same_key() {
        let err = IhError::new(ErrorCode::Internal, "x")
            .with_context("a", 1)
            .with_context("a", 2);
        assert_eq!(err.context.len(), 1);
        assert_eq!(err.context["a"], serde_json::json!(2));
    }

    #[test]
    fn with_source_sets_cause_chain() {
        let err = IhError::new(ErrorCode::BackendUnavailable, "connect failed")
            .with_source(io::Error::other("refused"));
        let src = std::error::Error::source(&err).expect("source present");
        assert!(src.to_string().contains("refused"));
    }

    #[test]
    fn no_source_by_default() {
        let err = IhError::new(ErrorCode::Internal, "x");
        assert!(std::error::Error::source(&err).is_none());
    }

    // -- Categorisation ------------------------------------------------------

    #[test]
    fn category_matches_expected_family() {
        assert_eq!(ErrorCode::ConfigMissing.category(), ErrorCategory::Config);
        assert_eq!(ErrorCode::UnsafeConfig.category(), ErrorCategory::Config);
        assert_eq!(ErrorCode::FixtureInvalid.category(), ErrorCategory::Fixture);
        assert_eq!(ErrorCode::FixtureNotFound.category(), ErrorCategory::Fixture);
        assert_eq!(ErrorCode::BackendRateLimited.category(), ErrorCategory::Backend);
        assert_eq!(ErrorCode::BackendRejected.category(), ErrorCategory::Backend);
        assert_eq!(ErrorCode::BackendUnavailable.category(), ErrorCategory::Backend);
        assert_eq!(ErrorCode::PipelineTimeout.category(), ErrorCategory::Pipeline);
        assert_eq!(ErrorCode::VaultFileNotFound.category(), ErrorCategory::Vault);
        assert_eq!(ErrorCode::ValidationFailed.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::JudgeUnavailable.category(), ErrorCategory::Judge);
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
    }

    #[test]
    fn error_helper_matches_category() {
        let err = IhError::new(ErrorCode::Internal, "x");
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn only_config_category_is_fatal() {
        for code in ALL_CODES {
            let expect_fatal = code.category() == ErrorCategory::Config;
            assert_eq!(code.is_fatal(), expect_fatal, "{code:?}");
        }
    }

    #[test]
    fn exit_code_two_for_config_one_otherwise() {
        assert_eq!(IhError::new(ErrorCode::ConfigMissing, "x").exit_code(), 2);
        assert_eq!(IhError::new(ErrorCode::UnsafeConfig, "x").exit_code(), 2);
        assert_eq!(IhError::new(ErrorCode::ValidationFailed, "x").exit_code(), 1);
        assert_eq!(IhError::new(ErrorCode::PipelineTimeout, "x").exit_code(), 1);
    }

    // -- as_str / Display parity & uniqueness --------------------------------

    #[test]
    fn as_str_matches_display() {
        for code in ALL_CODES {
            assert_eq!(code.as_str(), code.to_string());
        }
    }

    #[test]
    fn all_code_strings_are_unique() {
        let strs: HashSet<&str> = ALL_CODES.iter().map(|c| c.as_str()).collect();
        assert_eq!(strs.len(), ALL_CODES.len());
    }

    #[test]
    fn as_str_is_screaming_snake_case() {
        for code in ALL_CODES {
            let s = code.as_str();
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    // -- Serde roundtrip -------------------------------------------------

    #[test]
    fn error_code_serde_roundtrip() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *code);
        }
    }

    #[test]
    fn error_category_serde_is_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::Backend).unwrap();
        assert_eq!(json, "\"backend\"");
    }

    // -- DTO roundtrip -------------------------------------------------------

    #[test]
    fn dto_roundtrip_preserves_code_message_context() {
        let err = IhError::new(ErrorCode::FixtureInvalid, "placeholder id")
            .with_context("test_id", "TEST-SCOPE-001");
        let dto = IhErrorDto::from(&err);
        let json = serde_json::to_string(&dto).unwrap();
        let back: IhErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);
        assert_eq!(back.code, ErrorCode::FixtureInvalid);
        assert_eq!(back.context["test_id"], serde_json::json!("TEST-SCOPE-001"));
    }

    #[test]
    fn dto_captures_source_message_but_not_chain() {
        let err = IhError::new(ErrorCode::BackendUnavailable, "x")
            .with_source(io::Error::other("timeout"));
        let dto = IhErrorDto::from(&err);
        assert_eq!(dto.source_message.as_deref(), Some("timeout"));

        let rebuilt: IhError = dto.into();
        assert!(rebuilt.source.is_none());
    }

    #[test]
    fn dto_skips_source_message_when_absent() {
        let err = IhError::new(ErrorCode::Internal, "x");
        let dto = IhErrorDto::from(&err);
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("source_message"));
    }
}
