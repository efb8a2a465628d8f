#![deny(unsafe_code)]
#![warn(missing_docs)]
//! An in-memory [`MessagingBackend`] used by harness tests and by `ingest
//! test capture --dry-run`-style flows that must not touch the network.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ih_backend_core::{BackendError, Capability, MediaVariant, MessagingBackend, SendOutcome};
use ih_core::{MediaHandle, MessagePayload};

/// A backend for local development and harness unit tests.
///
/// Every send is recorded and echoed back with a monotonically increasing
/// message id, so tests can assert on what would have been sent to the real
/// upstream API without making a network call.
#[derive(Debug)]
pub struct MockBackend {
    next_id: AtomicI64,
    sent: Mutex<Vec<MessagePayload>>,
    deleted: Mutex<Vec<i64>>,
    scripted_failures: Mutex<VecDeque<BackendError>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
        }
    }
}

impl MockBackend {
    /// A fresh mock backend with no history and no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next send call instead of
    /// succeeding. Errors are consumed in FIFO order, one per call.
    pub fn push_scripted_failure(&self, err: BackendError) {
        self.scripted_failures.lock().unwrap().push_back(err);
    }

    /// Everything sent so far, in send order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<MessagePayload> {
        self.sent.lock().unwrap().clone()
    }

    /// Message ids deleted so far, in delete order.
    #[must_use]
    pub fn deleted_message_ids(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    fn next_scripted_failure(&self) -> Option<BackendError> {
        self.scripted_failures.lock().unwrap().pop_front()
    }

    fn record(&self, message: MessagePayload) -> SendOutcome {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(message.clone());
        SendOutcome { message_id, message }
    }
}

#[async_trait]
impl MessagingBackend for MockBackend {
    fn capabilities(&self) -> std::collections::BTreeSet<Capability> {
        [
            Capability::SendText,
            Capability::SendReferencedMedia,
            Capability::UploadLocalMedia,
            Capability::DeleteMessage,
        ]
        .into()
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SendOutcome, BackendError> {
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        Ok(self.record(MessagePayload::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        }))
    }

    async fn send_referenced_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        let handle = MediaHandle::Remote {
            file_id: file_id.to_string(),
        };
        Ok(self.record(media_payload(chat_id, variant, handle, caption)))
    }

    async fn upload_local_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        local_path: &Path,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        let handle = MediaHandle::Local {
            path: local_path.to_path_buf(),
        };
        Ok(self.record(media_payload(chat_id, variant, handle, caption)))
    }

    async fn delete_message(&self, _chat_id: &str, message_id: i64) -> Result<(), BackendError> {
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        self.deleted.lock().unwrap().push(message_id);
        Ok(())
    }
}

fn media_payload(
    chat_id: &str,
    variant: MediaVariant,
    handle: MediaHandle,
    caption: Option<&str>,
) -> MessagePayload {
    let chat_id = chat_id.to_string();
    let caption = caption.map(str::to_string);
    match variant {
        MediaVariant::Photo => MessagePayload::Photo {
            chat_id,
            handle,
            caption,
        },
        MediaVariant::Document => MessagePayload::Document {
            chat_id,
            handle,
            caption,
        },
        MediaVariant::Voice => MessagePayload::Voice { chat_id, handle },
        MediaVariant::Audio => MessagePayload::Audio { chat_id, handle },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_text_assigns_increasing_ids() {
        let backend = MockBackend::new();
        let a = backend.send_text("chat-1", "hello").await.unwrap();
        let b = backend.send_text("chat-1", "world").await.unwrap();
        assert_eq!(a.message_id, 1);
        assert_eq!(b.message_id, 2);
        assert_eq!(backend.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn upload_local_media_records_local_handle() {
        let backend = MockBackend::new();
        let outcome = backend
            .upload_local_media(
                "chat-1",
                MediaVariant::Document,
                Path::new("assets/report.pdf"),
                Some("caption"),
            )
            .await
            .unwrap();
        match outcome.message {
            MessagePayload::Document { handle, caption, .. } => {
                assert!(matches!(handle, MediaHandle::Local { .. }));
                assert_eq!(caption.as_deref(), Some("caption"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scripted_failure_is_returned_once() {
        let backend = MockBackend::new();
        backend.push_scripted_failure(BackendError::RateLimited { retry_after_ms: 10 });
        let err = backend.send_text("chat-1", "hello").await.unwrap_err();
        assert!(matches!(err, BackendError::RateLimited { .. }));
        let ok = backend.send_text("chat-1", "hello again").await.unwrap();
        assert_eq!(ok.message_id, 1);
    }

    #[tokio::test]
    async fn delete_message_is_recorded() {
        let backend = MockBackend::new();
        let sent = backend.send_text("chat-1", "hello").await.unwrap();
        backend.delete_message("chat-1", sent.message_id).await.unwrap();
        assert_eq!(backend.deleted_message_ids(), vec![sent.message_id]);
    }

    #[test]
    fn advertises_all_capabilities() {
        let backend = MockBackend::new();
        let caps = backend.capabilities();
        assert!(caps.contains(&Capability::SendText));
        assert!(caps.contains(&Capability::UploadLocalMedia));
        assert!(caps.contains(&Capability::DeleteMessage));
    }
}
