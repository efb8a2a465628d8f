// SPDX-License-Identifier: MIT OR Apache-2.0
//! A Telegram Bot API-shaped [`MessagingBackend`] and [`NotificationSource`]
//! (§4.3, §6). This is the one concrete upstream collaborator the harness
//! ships with; `ih-backend-core` only defines the trait and the retry
//! decorator, and `ih-backend-mock` only fakes it for tests.
//!
//! Wire details (field names, multipart part names, long-poll shape) follow
//! the public Telegram Bot API, the closest real messaging API whose shape
//! matches §4.3's capability set (text/photo/document/voice/audio,
//! reference-by-file-id or upload-by-path, rate-limit-with-retry-after).

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use ih_backend_core::{BackendError, Capability, MediaVariant, MessagingBackend, SendOutcome};
use ih_core::{MediaHandle, MessagePayload, NotificationMessage};
use ih_runner::NotificationSource;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// A thin HTTP client for the Telegram Bot API, used directly (never wrap
/// this in `RetryingBackend` more than once — the CLI wires that at the
/// call site in `main.rs`).
#[derive(Debug)]
pub struct TelegramBackend {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramBackend {
    /// Build a client against `https://api.telegram.org/bot<token>/`.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i32>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramIncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramIncomingMessage {
    chat: TelegramChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// Map a non-2xx Telegram envelope (or a transport failure) to a
/// [`BackendError`], per the contract in §4.3.
fn map_envelope_error(status: reqwest::StatusCode, envelope: &TelegramEnvelope<serde_json::Value>) -> BackendError {
    if status.as_u16() == 429 {
        let retry_after_ms = envelope
            .parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .map(|s| (s * 1000).max(0) as u64)
            .unwrap_or(1000);
        return BackendError::RateLimited { retry_after_ms };
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return BackendError::Unauthorized;
    }
    if status.as_u16() == 404 {
        return BackendError::NotFound {
            what: envelope.description.clone().unwrap_or_else(|| "resource".to_string()),
        };
    }
    BackendError::PayloadRejected {
        reason: envelope.description.clone().unwrap_or_else(|| format!("HTTP {status}")),
    }
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    BackendError::NetworkError { reason: err.to_string() }
}

async fn call<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: String,
    form: Option<serde_json::Value>,
) -> Result<T, BackendError> {
    let mut req = http.post(&url);
    if let Some(body) = form {
        req = req.json(&body);
    }
    let response = req.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let raw: serde_json::Value = response.json().await.map_err(map_transport_error)?;
    let envelope: TelegramEnvelope<serde_json::Value> =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::NetworkError { reason: e.to_string() })?;
    if !status.is_success() || !envelope.ok {
        return Err(map_envelope_error(status, &envelope));
    }
    let result = envelope
        .result
        .ok_or_else(|| BackendError::NetworkError { reason: "missing result field".to_string() })?;
    serde_json::from_value(result).map_err(|e| BackendError::NetworkError { reason: e.to_string() })
}

fn echo(chat_id: &str, variant: MediaVariant, handle: MediaHandle, caption: Option<&str>) -> MessagePayload {
    let chat_id = chat_id.to_string();
    let caption = caption.map(str::to_string);
    match variant {
        MediaVariant::Photo => MessagePayload::Photo { chat_id, handle, caption },
        MediaVariant::Document => MessagePayload::Document { chat_id, handle, caption },
        MediaVariant::Voice => MessagePayload::Voice { chat_id, handle },
        MediaVariant::Audio => MessagePayload::Audio { chat_id, handle },
    }
}

fn send_method(variant: MediaVariant) -> &'static str {
    match variant {
        MediaVariant::Photo => "sendPhoto",
        MediaVariant::Document => "sendDocument",
        MediaVariant::Voice => "sendVoice",
        MediaVariant::Audio => "sendAudio",
    }
}

fn media_field(variant: MediaVariant) -> &'static str {
    match variant {
        MediaVariant::Photo => "photo",
        MediaVariant::Document => "document",
        MediaVariant::Voice => "voice",
        MediaVariant::Audio => "audio",
    }
}

#[async_trait]
impl MessagingBackend for TelegramBackend {
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
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let message: TelegramMessage = call(&self.http, self.url("sendMessage"), Some(body)).await?;
        Ok(SendOutcome {
            message_id: message.message_id,
            message: MessagePayload::Text { chat_id: chat_id.to_string(), text: text.to_string() },
        })
    }

    async fn send_referenced_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, media_field(variant): file_id });
        if let Some(caption) = caption {
            body["caption"] = serde_json::Value::String(caption.to_string());
        }
        let message: TelegramMessage = call(&self.http, self.url(send_method(variant)), Some(body)).await?;
        let handle = MediaHandle::Remote { file_id: file_id.to_string() };
        Ok(SendOutcome { message_id: message.message_id, message: echo(chat_id, variant, handle, caption) })
    }

    async fn upload_local_media(
        &self,
        chat_id: &str,
        variant: MediaVariant,
        local_path: &Path,
        caption: Option<&str>,
    ) -> Result<SendOutcome, BackendError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| BackendError::PayloadRejected { reason: format!("read {}: {e}", local_path.display()) })?;
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(media_field(variant), reqwest::multipart::Part::bytes(bytes).file_name(filename));
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let response = self
            .http
            .post(self.url(send_method(variant)))
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let raw: serde_json::Value = response.json().await.map_err(map_transport_error)?;
        let envelope: TelegramEnvelope<serde_json::Value> =
            serde_json::from_value(raw).map_err(|e| BackendError::NetworkError { reason: e.to_string() })?;
        if !status.is_success() || !envelope.ok {
            return Err(map_envelope_error(status, &envelope));
        }
        let message: TelegramMessage = serde_json::from_value(
            envelope.result.ok_or_else(|| BackendError::NetworkError { reason: "missing result field".to_string() })?,
        )
        .map_err(|e| BackendError::NetworkError { reason: e.to_string() })?;
        let handle = MediaHandle::Local { path: local_path.to_path_buf() };
        Ok(SendOutcome { message_id: message.message_id, message: echo(chat_id, variant, handle, caption) })
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), BackendError> {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = call(&self.http, self.url("deleteMessage"), Some(body)).await?;
        Ok(())
    }
}

/// Polls `getUpdates` for the pipeline's notification messages (§6's wire
/// contract). Offset tracking is internal so repeated [`poll`](NotificationSource::poll)
/// calls never re-deliver the same update.
#[derive(Debug)]
pub struct TelegramNotifications {
    http: reqwest::Client,
    base_url: String,
    last_update_id: AtomicI64,
    // Telegram requires getUpdates calls to be serialised per bot token.
    fetch_lock: Mutex<()>,
}

impl TelegramNotifications {
    /// Poll against the same bot token as [`TelegramBackend`].
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{token}"),
            last_update_id: AtomicI64::new(0),
            fetch_lock: Mutex::new(()),
        }
    }
}

/// The subset of the pipeline's notification payload we recognise, per §6:
/// `status`, `pipeline`, `severity`, `output_paths`, `dropbox_path`, plus
/// any additional named fields preserved verbatim.
#[derive(Debug, Deserialize)]
struct NotificationPayload {
    #[serde(default)]
    pipeline: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    output_paths: Vec<String>,
    #[serde(default)]
    dropbox_path: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

fn parse_notification(body: String) -> NotificationMessage {
    match serde_json::from_str::<NotificationPayload>(&body) {
        Ok(payload) => NotificationMessage {
            body,
            pipeline: payload.pipeline,
            severity: payload.severity,
            output_paths: payload.output_paths,
            dropbox_path: payload.dropbox_path,
            fields: payload
                .fields
                .into_iter()
                .map(|(k, v)| (k, v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                .collect(),
        },
        Err(_) => NotificationMessage {
            body,
            pipeline: None,
            severity: None,
            output_paths: Vec::new(),
            dropbox_path: None,
            fields: BTreeMap::new(),
        },
    }
}

#[async_trait]
impl NotificationSource for TelegramNotifications {
    async fn poll(&self, channel_id: &str) -> Result<Vec<NotificationMessage>, BackendError> {
        let _guard = self.fetch_lock.lock().await;
        let offset = self.last_update_id.load(Ordering::SeqCst) + 1;
        let body = serde_json::json!({ "offset": offset, "timeout": 0, "allowed_updates": ["message"] });
        let updates: Vec<TelegramUpdate> = call(&self.http, format!("{}/getUpdates", self.base_url), Some(body)).await?;

        let mut notifications = Vec::new();
        for update in updates {
            self.last_update_id.fetch_max(update.update_id, Ordering::SeqCst);
            let Some(message) = update.message else { continue };
            if message.chat.id.to_string() != channel_id {
                continue;
            }
            let body = message.text.or(message.caption).unwrap_or_default();
            notifications.push(parse_notification(body));
        }
        Ok(notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_notification_payload() {
        let body = r#"{"status":"ok","pipeline":"archive","severity":"info","output_paths":["10-archive/x.md"],"dropbox_path":"archive/x.pdf"}"#;
        let note = parse_notification(body.to_string());
        assert_eq!(note.pipeline.as_deref(), Some("archive"));
        assert_eq!(note.severity.as_deref(), Some("info"));
        assert_eq!(note.output_paths, vec!["10-archive/x.md".to_string()]);
        assert_eq!(note.dropbox_path.as_deref(), Some("archive/x.pdf"));
    }

    #[test]
    fn falls_back_to_raw_body_when_not_json() {
        let body = "[TEST-SCOPE-001] processed ok".to_string();
        let note = parse_notification(body.clone());
        assert_eq!(note.body, body);
        assert!(note.pipeline.is_none());
        assert!(note.output_paths.is_empty());
    }

    #[test]
    fn rate_limit_maps_retry_after_seconds_to_millis() {
        let envelope: TelegramEnvelope<serde_json::Value> = TelegramEnvelope {
            ok: false,
            result: None,
            error_code: Some(429),
            description: Some("Too Many Requests".to_string()),
            parameters: Some(ResponseParameters { retry_after: Some(3) }),
        };
        let err = map_envelope_error(reqwest::StatusCode::TOO_MANY_REQUESTS, &envelope);
        assert!(matches!(err, BackendError::RateLimited { retry_after_ms: 3000 }));
    }

    #[test]
    fn unauthorized_status_maps_to_unauthorized() {
        let envelope: TelegramEnvelope<serde_json::Value> =
            TelegramEnvelope { ok: false, result: None, error_code: Some(401), description: None, parameters: None };
        let err = map_envelope_error(reqwest::StatusCode::UNAUTHORIZED, &envelope);
        assert!(matches!(err, BackendError::Unauthorized));
    }
}
