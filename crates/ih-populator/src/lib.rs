// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Fixture Populator (§4.4): drives the messaging backend from the test
//! spec catalog, producing or refreshing fixtures in smart or force mode.

use chrono::Utc;
use ih_backend_core::{MediaVariant, MessagingBackend};
use ih_core::{Fixture, FixtureMeta, InputKind, MediaHandle, TestSpec};
use ih_fixture_store::FixtureStore;

/// How aggressively the populator refreshes existing fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Skip specs whose existing fixture is already valid.
    Smart,
    /// Delete every known message first, then (re)send every spec.
    Force,
}

/// One spec the populator could not produce a fixture for.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateIssue {
    /// The spec that failed.
    pub test_id: String,
    /// Why it failed.
    pub reason: String,
}

/// Outcome of a populate run, per §4.4: "Produces a summary
/// `{existing, sent, skipped, errors}`."
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulateSummary {
    /// Specs whose existing fixture was already valid and left untouched.
    pub existing: usize,
    /// Specs a fresh fixture was sent and written for.
    pub sent: usize,
    /// Specs carrying a skip reason.
    pub skipped: usize,
    /// Specs that failed to populate.
    pub errors: Vec<PopulateIssue>,
}

/// Padding (in message-id units) added around the observed min/max backend
/// message id range when force-clearing, per §4.4 step 1.
pub const FORCE_CLEAR_PAD: i64 = 5;

/// Run the populate algorithm over `specs`, writing fresh fixtures through
/// `store` and sending through `backend` into `chat_id`.
pub async fn populate<B: MessagingBackend>(
    specs: &[TestSpec],
    store: &FixtureStore,
    backend: &B,
    chat_id: &str,
    mode: Mode,
) -> PopulateSummary {
    if mode == Mode::Force {
        force_clear(specs, store, backend, chat_id).await;
    }

    let mut summary = PopulateSummary::default();
    for spec in specs {
        if spec.meta.as_ref().is_some_and(|m| m.skip_reason.is_some()) {
            summary.skipped += 1;
            continue;
        }

        if mode == Mode::Smart {
            if let Ok(Some(fixture)) = store.find(&spec.id) {
                if store.is_valid(&fixture) {
                    summary.existing += 1;
                    continue;
                }
            }
        }

        match send_for_spec(spec, store, backend, chat_id).await {
            Ok(()) => summary.sent += 1,
            Err(reason) => summary.errors.push(PopulateIssue {
                test_id: spec.id.clone(),
                reason,
            }),
        }
    }
    summary
}

async fn force_clear<B: MessagingBackend>(specs: &[TestSpec], store: &FixtureStore, backend: &B, chat_id: &str) {
    let known_ids: Vec<i64> = specs
        .iter()
        .filter_map(|spec| store.find(&spec.id).ok().flatten())
        .filter_map(|fixture| fixture.backend_message_id)
        .collect();
    let Some(&min) = known_ids.iter().min() else {
        return;
    };
    let max = *known_ids.iter().max().unwrap_or(&min);
    let lo = (min - FORCE_CLEAR_PAD).max(1);
    let hi = max + FORCE_CLEAR_PAD;
    for id in lo..=hi {
        if let Err(err) = backend.delete_message(chat_id, id).await {
            tracing::debug!(message_id = id, %err, "force-clear delete failed, continuing");
        }
    }
}

fn media_variant(kind: InputKind) -> Option<MediaVariant> {
    match kind {
        InputKind::Photo => Some(MediaVariant::Photo),
        InputKind::Document => Some(MediaVariant::Document),
        InputKind::Voice => Some(MediaVariant::Voice),
        InputKind::Audio => Some(MediaVariant::Audio),
        InputKind::Text | InputKind::Url => None,
    }
}

fn reusable_remote_handle(store: &FixtureStore, test_id: &str) -> Option<String> {
    let fixture = store.find(test_id).ok().flatten()?;
    let handle = fixture.message.media_handle()?.clone();
    if handle.is_redacted() {
        return None;
    }
    match handle {
        MediaHandle::Remote { file_id } => Some(file_id),
        MediaHandle::Local { .. } => None,
    }
}

async fn send_for_spec<B: MessagingBackend>(
    spec: &TestSpec,
    store: &FixtureStore,
    backend: &B,
    chat_id: &str,
) -> Result<(), String> {
    let caption = spec.input.example_text.as_deref();
    let text = caption.unwrap_or_default();

    let send_result = match media_variant(spec.input.kind) {
        None => backend.send_text(chat_id, text).await,
        Some(variant) => {
            if let Some(file_id) = reusable_remote_handle(store, &spec.id) {
                backend.send_referenced_media(chat_id, variant, &file_id, caption).await
            } else if let Some(asset) = &spec.input.local_asset_path {
                backend.upload_local_media(chat_id, variant, asset, caption).await
            } else {
                return Err(format!("missing local asset for {} and no reusable remote handle", spec.id));
            }
        }
    };

    let outcome = send_result.map_err(|e| e.to_string())?;
    let fixture = Fixture {
        meta: FixtureMeta {
            test_id: spec.id.clone(),
            captured_at: Utc::now(),
            captured_by: "populator".to_string(),
            description: spec.name.clone(),
            synthetic: None,
        },
        message: outcome.message,
        backend_message_id: Some(outcome.message_id),
    };
    store.write(&spec.id, spec.category, &fixture).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_backend_mock::MockBackend;
    use ih_core::{Category, Expectations, InputDescriptor};

    fn text_spec(id: &str) -> TestSpec {
        TestSpec {
            id: id.to_string(),
            name: format!("{id} name"),
            category: Category::Scope,
            group: None,
            fixture_ref: format!("scope/{id}"),
            input: InputDescriptor {
                kind: InputKind::Text,
                example_text: Some(format!("[{id}] hello")),
                local_asset_path: None,
            },
            expectations: Expectations::default(),
            meta: None,
        }
    }

    #[tokio::test]
    async fn smart_populate_sends_missing_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let backend = MockBackend::new();
        let specs = vec![text_spec("TEST-SCOPE-001")];
        let summary = populate(&specs, &store, &backend, "chat-1", Mode::Smart).await;
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.existing, 0);
    }

    #[tokio::test]
    async fn smart_populate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let backend = MockBackend::new();
        let specs = vec![text_spec("TEST-SCOPE-001")];
        populate(&specs, &store, &backend, "chat-1", Mode::Smart).await;
        let second = populate(&specs, &store, &backend, "chat-1", Mode::Smart).await;
        assert_eq!(second.sent, 0);
        assert_eq!(second.existing, 1);
    }

    #[tokio::test]
    async fn force_then_smart_reports_all_existing_none_sent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let backend = MockBackend::new();
        let specs = vec![text_spec("TEST-SCOPE-001"), text_spec("TEST-SCOPE-002")];
        let forced = populate(&specs, &store, &backend, "chat-1", Mode::Force).await;
        assert_eq!(forced.sent, 2);
        let smart = populate(&specs, &store, &backend, "chat-1", Mode::Smart).await;
        assert_eq!(smart.existing, specs.len());
        assert_eq!(smart.sent, 0);
    }

    #[tokio::test]
    async fn skip_reason_is_counted_as_skipped_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let backend = MockBackend::new();
        let mut spec = text_spec("TEST-SCOPE-001");
        spec.meta = Some(ih_core::TestSpecMeta {
            doc_reference: None,
            skip_reason: Some("flaky upstream".to_string()),
        });
        let summary = populate(&[spec], &store, &backend, "chat-1", Mode::Smart).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.sent, 0);
    }

    #[tokio::test]
    async fn media_spec_without_asset_or_remote_handle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let backend = MockBackend::new();
        let mut spec = text_spec("TEST-ARC-001");
        spec.category = Category::Archive;
        spec.fixture_ref = "archive/TEST-ARC-001".to_string();
        spec.input = InputDescriptor {
            kind: InputKind::Document,
            example_text: Some("[TEST-ARC-001] archive this".to_string()),
            local_asset_path: None,
        };
        let summary = populate(&[spec], &store, &backend, "chat-1", Mode::Smart).await;
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.sent, 0);
    }
}
