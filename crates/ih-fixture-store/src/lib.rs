// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Fixture Store (§4.2): a filesystem of per-test JSON documents grouped by
//! category under `<fixtureRoot>/<category>/<testId>.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ih_core::{Category, Fixture, PLACEHOLDER_CHAT_ID};

/// Errors raised while reading or writing fixtures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureStoreError {
    /// Failed to read or write a fixture file.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A fixture document did not parse as valid JSON.
    #[error("malformed fixture at {path}: {source}")]
    Malformed {
        /// Path of the malformed document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl FixtureStoreError {
    /// Map to the harness-wide error taxonomy.
    pub fn into_ih_error(self) -> ih_error::IhError {
        ih_error::IhError::new(ih_error::ErrorCode::FixtureInvalid, self.to_string())
    }
}

type Result<T> = std::result::Result<T, FixtureStoreError>;

/// A filesystem-backed fixture store rooted at `<fixtureRoot>`.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    /// A store rooted at `root` (typically the configured `fixture_root`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a fixture for `test_id` under `category` would live at.
    #[must_use]
    pub fn path_for(&self, category: Category, test_id: &str) -> PathBuf {
        self.root.join(category.path_segment()).join(format!("{test_id}.json"))
    }

    /// Search every category sub-root for `test_id`'s fixture.
    pub fn find(&self, test_id: &str) -> Result<Option<Fixture>> {
        for category in Category::ALL {
            let path = self.path_for(category, test_id);
            if path.exists() {
                return Ok(Some(self.load(&path)?));
            }
        }
        Ok(None)
    }

    /// Write `fixture` to `<fixtureRoot>/<category>/<testId>.json`,
    /// atomically (write-then-rename) so concurrent readers never observe
    /// a partial file.
    pub fn write(&self, test_id: &str, category: Category, fixture: &Fixture) -> Result<()> {
        let path = self.path_for(category, test_id);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|source| FixtureStoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let body = serde_json::to_vec_pretty(fixture).map_err(|source| FixtureStoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| FixtureStoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tmp.write_all(&body).map_err(|source| FixtureStoreError::Io {
            path: path.clone(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| FixtureStoreError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(())
    }

    /// §4.2 validity rule, delegating to [`Fixture::is_valid`].
    #[must_use]
    pub fn is_valid(&self, fixture: &Fixture) -> bool {
        fixture.is_valid(Utc::now())
    }

    /// Rehydrate `fixture`'s placeholder chat id with `real_chat_id` and
    /// return it. Used right after [`FixtureStore::find`] loads a committed
    /// fixture, per §3's "MUST appear as a placeholder token ... rehydrated
    /// from config at runtime".
    pub fn rehydrate(&self, mut fixture: Fixture, real_chat_id: &str) -> Fixture {
        fixture.rehydrate_chat_id(real_chat_id);
        fixture
    }

    fn load(&self, path: &Path) -> Result<Fixture> {
        let body = fs::read(path).map_err(|source| FixtureStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| FixtureStoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `true` if `chat_id` is still the uncommitted placeholder sentinel.
#[must_use]
pub fn is_placeholder_chat_id(chat_id: &str) -> bool {
    chat_id == PLACEHOLDER_CHAT_ID
}
