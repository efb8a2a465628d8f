// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Semantic Judge Driver (§4.8): dispatches an LLM-as-judge prompt for a
//! [`SemanticSubSpec`] against a vault file's content and parses the
//! confidence/pass-fail/per-checkpoint verdict.
//!
//! Per §4.8 this driver is side-effect free except for the network call,
//! and MUST be callable offline: an unreachable endpoint never propagates
//! an error to the caller, it records [`SemanticResult::judge_unavailable`]
//! instead.

use ih_core::{CheckpointResult, SemanticResult, SemanticSubSpec};
use serde::{Deserialize, Serialize};

/// Errors from the underlying HTTP call or response decode. Never leaves
/// this crate: [`JudgeClient::judge`] always converts these to the
/// judge-unavailable outcome.
#[derive(Debug, thiserror::Error)]
enum JudgeError {
    #[error("judge endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("judge endpoint returned a malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize)]
struct JudgeRequestDto<'a> {
    content: &'a str,
    description: &'a str,
    checkpoints: &'a [String],
}

#[derive(Debug, Deserialize)]
struct JudgeResponseDto {
    confidence: u8,
    reasoning: String,
    #[serde(default)]
    checkpoints: Vec<CheckpointResponseDto>,
}

#[derive(Debug, Deserialize)]
struct CheckpointResponseDto {
    statement: String,
    passed: bool,
}

/// Calls an external LLM provider to judge a vault file's content against a
/// spec's semantic checkpoints. Constructed with an optional endpoint: when
/// `None`, every call short-circuits to judge-unavailable without any
/// network I/O, matching the "callable offline" requirement.
#[derive(Debug, Clone)]
pub struct JudgeClient {
    endpoint: Option<String>,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl JudgeClient {
    /// Build a client targeting `endpoint`, authenticating with `api_key`
    /// as a bearer credential when present.
    #[must_use]
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// A client with no endpoint configured: every call returns
    /// [`SemanticResult::judge_unavailable`] without attempting a request.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    /// Judge `content` (the vault file's text) against `sub_spec`.
    ///
    /// Never returns an error: network failures, non-success statuses, and
    /// malformed responses all collapse to
    /// [`SemanticResult::judge_unavailable`], logged at `warn`.
    pub async fn judge(&self, content: &str, sub_spec: &SemanticSubSpec) -> SemanticResult {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return SemanticResult::judge_unavailable();
        };
        match self.call(endpoint, content, sub_spec).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(%err, "semantic judge call failed, recording judge unavailable");
                SemanticResult::judge_unavailable()
            }
        }
    }

    async fn call(&self, endpoint: &str, content: &str, sub_spec: &SemanticSubSpec) -> Result<SemanticResult, JudgeError> {
        let request = JudgeRequestDto {
            content,
            description: &sub_spec.description,
            checkpoints: &sub_spec.checkpoints,
        };
        let mut builder = self.http.post(endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?.error_for_status()?;
        let parsed: JudgeResponseDto = response
            .json()
            .await
            .map_err(|e| JudgeError::Decode(e.to_string()))?;

        let checkpoints: Vec<CheckpointResult> = parsed
            .checkpoints
            .into_iter()
            .map(|c| CheckpointResult {
                statement: c.statement,
                passed: c.passed,
            })
            .collect();

        Ok(SemanticResult {
            passed: parsed.confidence >= sub_spec.confidence_threshold,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            checkpoints,
        })
    }
}
