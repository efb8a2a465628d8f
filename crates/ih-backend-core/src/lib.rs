#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The messaging backend client contract (§4.3): a thin, retry-aware
//! wrapper around the upstream messaging API the fixture populator and
//! integration runner send into.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use ih_core::MessagePayload;

/// One capability a [`MessagingBackend`] implementation may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Can send plain text messages.
    SendText,
    /// Can send media by referencing a previously uploaded remote handle.
    SendReferencedMedia,
    /// Can upload a local file and send it as media.
    UploadLocalMedia,
    /// Can delete a previously sent message.
    DeleteMessage,
}

/// Media variant carried by a referenced or uploaded send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaVariant {
    /// Photo attachment.
    Photo,
    /// Document attachment.
    Document,
    /// Voice memo.
    Voice,
    /// Audio file.
    Audio,
}

/// Errors a [`MessagingBackend`] call can fail with (§4.3).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Backend asked the caller to back off.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// How long to wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },
    /// Backend rejected the payload outright (no amount of retrying helps).
    #[error("payload rejected: {reason}")]
    PayloadRejected {
        /// Why the backend rejected it.
        reason: String,
    },
    /// Transport-level failure talking to the backend.
    #[error("network error: {reason}")]
    NetworkError {
        /// Underlying transport error detail.
        reason: String,
    },
    /// Credential was missing or rejected.
    #[error("unauthorized")]
    Unauthorized,
    /// Referenced chat, message, or file does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What could not be found.
        what: String,
    },
}

impl BackendError {
    /// `true` for errors the retry policy in §4.3 should retry locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. })
    }

    /// Map to the harness-wide error taxonomy.
    pub fn into_ih_error(self) -> ih_error::IhError {
        use ih_error::ErrorCode;
        match self {
            BackendError::RateLimited { retry_after_ms } => {
                ih_error::IhError::new(ErrorCode::BackendRateLimited, "backend rate limited")
                    .with_context("retry_after_ms", retry_after_ms)
            }
            BackendError::PayloadRejected { reason } => {
                ih_error::IhError::new(ErrorCode::BackendRejected, reason)
            }
            BackendError::NetworkError { reason } => {
                ih_error::IhError::new(ErrorCode::BackendUnavailable, reason)
            }
            BackendError::Unauthorized => {
                ih_error::IhError::new(ErrorCode::BackendUnavailable, "unauthorized")
            }
            BackendError::NotFound { what } => {
                ih_error::IhError::new(ErrorCode::BackendUnavailable, format!("not found: {what}"))
            }
        }
    }
}

/// Result of a successful send: the backend-assigned message id and the
/// message document as the backend echoed it back.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Backend-assigned numeric message identifier.
    pub message_id: i64,
    /// The message payload as the backend recorded it.
    pub message: MessagePayload,
}

/// Contract for the upstream messaging backend (§4.3).
///
/// A concrete implementation talks to the real API; wrap it in
/// [`RetryingBackend`] to get the retry-after-rate-limit and fixed-pacing
/// behaviour for free.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Capabilities this backend advertises.
    fn capabilities(&self) -> BTreeSet<Capability>;

    /// Send a plain text message.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendOutcome, BackendError>;

    /// Send media by referencing a previously uploaded remote file handle.
    async fn send_referenced_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError>;

    /// Upload a local file and send it as media.
    async fn upload_local_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        local_path: &Path,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), BackendError>;
}

/// Checks that `required` is a subset of `have`, returning a
/// [`BackendError::PayloadRejected`] naming the first missing capability.
pub fn ensure_capabilities(
    required: &[Capability],
    have: &BTreeSet<Capability>,
) -> Result<(), BackendError> {
    for cap in required {
        if !have.contains(cap) {
            return Err(BackendError::PayloadRejected {
                reason: format!("backend does not support {cap:?}"),
            });
        }
    }
    Ok(())
}

impl ih_retry::Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        self.is_retryable()
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            BackendError::RateLimited { retry_after_ms } => {
                Some(std::time::Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

/// Decorates a [`MessagingBackend`] with the retry policy and fixed pacing
/// gap described in §4.3: `RateLimited` is retried up to three total
/// attempts with `retry_after + 1s` backoff; every other send waits out a
/// fixed minimum inter-message gap first to preempt rate limiting during
/// bulk populate.
pub struct RetryingBackend<B> {
    inner: B,
    policy: ih_retry::RetryPolicy,
    pacer: ih_ratelimit::Pacer,
}

impl<B> RetryingBackend<B> {
    /// Wrap `inner` with the default retry policy and minimum send gap.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            policy: ih_retry::RetryPolicy::default(),
            pacer: ih_ratelimit::Pacer::default(),
        }
    }

    /// Wrap `inner` with an explicit retry policy and pacing gap.
    pub fn with_policy(inner: B, policy: ih_retry::RetryPolicy, pacer: ih_ratelimit::Pacer) -> Self {
        Self { inner, policy, pacer }
    }
}

#[async_trait]
impl<B: MessagingBackend> MessagingBackend for RetryingBackend<B> {
    fn capabilities(&self) -> BTreeSet<Capability> {
        self.inner.capabilities()
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendOutcome, BackendError> {
        self.pacer.wait().await;
        ih_retry::retry(&self.policy, || self.inner.send_text(chat_id, text)).await
    }

    async fn send_referenced_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        self.pacer.wait().await;
        ih_retry::retry(&self.policy, || {
            self.inner.send_referenced_media(chat_id, variant, file_id, caption)
        })
        .await
    }

    async fn upload_local_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        local_path: &Path,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        self.pacer.wait().await;
        ih_retry::retry(&self.policy, || {
            self.inner.upload_local_media(chat_id, variant, local_path, caption)
        })
        .await
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), BackendError> {
        self.pacer.wait().await;
        ih_retry::retry(&self.policy, || self.inner.delete_message(chat_id, message_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = BackendError::RateLimited { retry_after_ms: 500 };
        assert!(err.is_retryable());
    }

    #[test]
    fn payload_rejected_is_not_retryable() {
        let err = BackendError::PayloadRejected {
            reason: "too large".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn ensure_capabilities_passes_when_all_present() {
        let have: BTreeSet<_> = [Capability::SendText, Capability::DeleteMessage].into();
        assert!(ensure_capabilities(&[Capability::SendText], &have).is_ok());
    }

    #[test]
    fn ensure_capabilities_fails_on_missing() {
        let have: BTreeSet<_> = [Capability::SendText].into();
        let err = ensure_capabilities(&[Capability::UploadLocalMedia], &have).unwrap_err();
        assert!(matches!(err, BackendError::PayloadRejected { .. }));
    }

    #[test]
    fn rate_limited_maps_to_backend_rate_limited_code() {
        let err = BackendError::RateLimited { retry_after_ms: 2000 }.into_ih_error();
        assert_eq!(err.code, ih_error::ErrorCode::BackendRateLimited);
        assert_eq!(err.context["retry_after_ms"], serde_json::json!(2000));
    }

    #[test]
    fn payload_rejected_maps_to_backend_rejected_code() {
        let err = BackendError::PayloadRejected { reason: "nope".into() }.into_ih_error();
        assert_eq!(err.code, ih_error::ErrorCode::BackendRejected);
    }

    #[test]
    fn network_error_maps_to_backend_unavailable_code() {
        let err = BackendError::NetworkError { reason: "dns".into() }.into_ih_error();
        assert_eq!(err.code, ih_error::ErrorCode::BackendUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_backend_recovers_from_rate_limiting() {
        let mock = ih_backend_mock::MockBackend::new();
        mock.push_scripted_failure(BackendError::RateLimited { retry_after_ms: 5 });
        let backend = RetryingBackend::new(mock);
        let outcome = backend.send_text("chat-1", "hi").await.unwrap();
        assert_eq!(outcome.message_id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_backend_fails_fast_on_payload_rejected() {
        let mock = ih_backend_mock::MockBackend::new();
        mock.push_scripted_failure(BackendError::PayloadRejected {
            reason: "too big".into(),
        });
        let backend = RetryingBackend::new(mock);
        let err = backend.send_text("chat-1", "hi").await.unwrap_err();
        assert!(matches!(err, BackendError::PayloadRejected { .. }));
    }
}
