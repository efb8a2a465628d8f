// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The Test Spec Catalog (§4.5): a static, in-memory, immutable list of
//! every integration test the harness knows how to run.

use std::path::PathBuf;
use std::sync::OnceLock;

use ih_core::filter::SpecFilter;
use ih_core::{
    Category, Expectations, InputDescriptor, InputKind, SemanticSubSpec, TargetFileClass, TestSpec,
};

/// The catalog: every known spec, built once and shared.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<TestSpec>,
}

impl Catalog {
    /// The process-wide catalog singleton.
    pub fn shared() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| Catalog::new(built_in_specs()))
    }

    /// Build a catalog from an explicit spec list, enforcing the §4.5
    /// uniqueness invariant and the fixture-reference category invariant.
    ///
    /// # Panics
    ///
    /// Panics if two specs share an id, or a spec's `fixture_ref` does not
    /// start with its own category's path segment — both are programmer
    /// errors in the catalog definition, not runtime conditions.
    #[must_use]
    pub fn new(specs: Vec<TestSpec>) -> Self {
        let mut seen = std::collections::BTreeSet::new();
        for spec in &specs {
            assert!(seen.insert(spec.id.clone()), "duplicate spec id in catalog: {}", spec.id);
            let expected_prefix = format!("{}/", spec.expected_fixture_category_segment());
            assert!(
                spec.fixture_ref.starts_with(&expected_prefix),
                "spec {} fixture_ref {:?} does not start with {expected_prefix:?}",
                spec.id,
                spec.fixture_ref
            );
        }
        Self { specs }
    }

    /// Every spec in the catalog, in definition order.
    #[must_use]
    pub fn all(&self) -> &[TestSpec] {
        &self.specs
    }

    /// Specs in `category`, preserving catalog order.
    #[must_use]
    pub fn by_category(&self, category: Category) -> Vec<&TestSpec> {
        SpecFilter::by_category(category).apply(&self.specs)
    }

    /// The spec with the given id, if any.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&TestSpec> {
        self.specs.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    /// Specs tagged with `group`, preserving catalog order.
    #[must_use]
    pub fn by_group(&self, group: &str) -> Vec<&TestSpec> {
        SpecFilter::by_group(group).apply(&self.specs)
    }

    /// Specs carrying a semantic judge sub-spec.
    #[must_use]
    pub fn with_semantic(&self) -> Vec<&TestSpec> {
        SpecFilter::with_semantic().apply(&self.specs)
    }
}

fn text_input(example_text: &str) -> InputDescriptor {
    InputDescriptor {
        kind: InputKind::Text,
        example_text: Some(example_text.to_string()),
        local_asset_path: None,
    }
}

fn document_input(caption: &str, asset: &str) -> InputDescriptor {
    InputDescriptor {
        kind: InputKind::Document,
        example_text: Some(caption.to_string()),
        local_asset_path: Some(PathBuf::from(asset)),
    }
}

fn voice_input(transcript_cue: &str, asset: &str) -> InputDescriptor {
    InputDescriptor {
        kind: InputKind::Voice,
        example_text: Some(transcript_cue.to_string()),
        local_asset_path: Some(PathBuf::from(asset)),
    }
}

/// The built-in spec list. Grouped by category, in the order §3 declares
/// them: scope, date, archive, regression, cli, acceptance, integration.
pub fn built_in_specs() -> Vec<TestSpec> {
    vec![
        TestSpec {
            id: "TEST-SCOPE-001".to_string(),
            name: "Explicit private scope sigil".to_string(),
            category: Category::Scope,
            group: None,
            fixture_ref: "scope/TEST-SCOPE-001".to_string(),
            input: text_input("[TEST-SCOPE-001] ~private This is a personal health note"),
            expectations: Expectations {
                required_tags: vec!["scope/private".to_string()],
                forbidden_tags: vec!["scope/work".to_string()],
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-SCOPE-002".to_string(),
            name: "Explicit work scope sigil".to_string(),
            category: Category::Scope,
            group: None,
            fixture_ref: "scope/TEST-SCOPE-002".to_string(),
            input: text_input("[TEST-SCOPE-002] ~work Quarterly planning notes"),
            expectations: Expectations {
                required_tags: vec!["scope/work".to_string()],
                forbidden_tags: vec!["scope/private".to_string()],
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-DATE-001".to_string(),
            name: "Relative date phrase resolves to an absolute filename date".to_string(),
            category: Category::Date,
            group: None,
            fixture_ref: "date/TEST-DATE-001".to_string(),
            input: text_input("[TEST-DATE-001] remind me about this next Tuesday"),
            expectations: Expectations {
                filename_pattern: Some(r"^\d{4}-\d{2}-\d{2}-.*".to_string()),
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-ARC-001".to_string(),
            name: "Document archive with dropbox sync".to_string(),
            category: Category::Archive,
            group: None,
            fixture_ref: "archive/TEST-ARC-001".to_string(),
            input: document_input("[TEST-ARC-001] archive this receipt", "arc-001-receipt.pdf"),
            expectations: Expectations {
                required_pipeline: Some("archive".to_string()),
                archive_filename_pattern: Some(r"^RECEIPT\s*-\s*\d{8}\s*-.*HOME".to_string()),
                archive_sync: Some(true),
                notification_severity: Some("info".to_string()),
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-REG-003".to_string(),
            name: "Hashtag and bracket metadata extraction".to_string(),
            category: Category::Regression,
            group: Some("pai".to_string()),
            fixture_ref: "regression/TEST-REG-003".to_string(),
            input: text_input(
                "[TEST-REG-003] #project/pai #ed_overy [source_shortcut:voice-memo][source_device:mac] Follow up on PR 123",
            ),
            expectations: Expectations {
                required_tags: vec!["project/pai".to_string(), "ed_overy".to_string()],
                frontmatter: std::collections::BTreeMap::from([
                    ("source_shortcut".to_string(), "voice-memo".to_string()),
                    ("source_device".to_string(), "mac".to_string()),
                ]),
                semantic: Some(SemanticSubSpec {
                    description: "checks that hashtag and bracket metadata hints are correctly \
                                   extracted into tags and frontmatter"
                        .to_string(),
                    checkpoints: vec![
                        "extracts the project/pai tag from the #project/pai hashtag".to_string(),
                        "extracts the ed_overy tag from the #ed_overy hashtag".to_string(),
                        "extracts source_shortcut and source_device frontmatter from the bracket \
                         metadata"
                            .to_string(),
                    ],
                    target_file_class: TargetFileClass::Raw,
                    confidence_threshold: 80,
                }),
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-PAT-001".to_string(),
            name: "Pattern-library note with a semantic judge dependency".to_string(),
            category: Category::Regression,
            group: Some("pai".to_string()),
            fixture_ref: "regression/TEST-PAT-001".to_string(),
            input: text_input("[TEST-PAT-001] #pattern/singleton Notes on the singleton anti-pattern"),
            expectations: Expectations {
                required_tags: vec!["pattern/singleton".to_string()],
                semantic: Some(SemanticSubSpec {
                    description: "checks that the note explains which pattern was matched and why"
                        .to_string(),
                    checkpoints: vec!["explains which pattern was matched".to_string()],
                    target_file_class: TargetFileClass::Derived,
                    confidence_threshold: 80,
                }),
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-CLI-001".to_string(),
            name: "Direct CLI ingest of a local file".to_string(),
            category: Category::Cli,
            group: None,
            fixture_ref: "cli/TEST-CLI-001".to_string(),
            input: text_input("[TEST-CLI-001] ingest via the direct CLI surface"),
            expectations: Expectations {
                verbose_contains: vec!["direct ingest".to_string()],
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-VOICE-002".to_string(),
            name: "Spoken test identifier in a voice memo transcript".to_string(),
            category: Category::Acceptance,
            group: Some("pai".to_string()),
            fixture_ref: "acceptance/TEST-VOICE-002".to_string(),
            input: voice_input("Test voice zero zero two, hashtag project pai", "voice-002-memo.ogg"),
            expectations: Expectations {
                required_tags: vec!["project/pai".to_string()],
                content_contains: vec!["TEST-VOICE-002".to_string()],
                ..Default::default()
            },
            meta: None,
        },
        TestSpec {
            id: "TEST-INT-001".to_string(),
            name: "End-to-end populate, forward, correlate, validate".to_string(),
            category: Category::Integration,
            group: None,
            fixture_ref: "integration/TEST-INT-001".to_string(),
            input: text_input("[TEST-INT-001] full pipeline smoke test"),
            expectations: Expectations {
                required_pipeline: Some("archive".to_string()),
                ..Default::default()
            },
            meta: None,
        },
    ]
}
