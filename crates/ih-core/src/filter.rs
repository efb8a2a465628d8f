// SPDX-License-Identifier: MIT OR Apache-2.0
//! Category/group filtering over the static [`TestSpec`] catalog.
//!
//! Matching is case-insensitive, mirroring how CLI flags like `--suite` and
//! `--group` are typed by an operator.

use crate::{Category, TestSpec};

/// Filter over a catalog's specs.
#[derive(Debug, Clone)]
pub struct SpecFilter {
    mode: FilterMode,
}

#[derive(Debug, Clone)]
enum FilterMode {
    Id(String),
    Category(Category),
    Group(String),
    WithSemantic,
    All,
}

impl SpecFilter {
    /// Select every spec in the catalog.
    #[must_use]
    pub fn all() -> Self {
        Self { mode: FilterMode::All }
    }

    /// Select by exact spec id.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            mode: FilterMode::Id(id.into()),
        }
    }

    /// Select by category.
    #[must_use]
    pub fn by_category(category: Category) -> Self {
        Self {
            mode: FilterMode::Category(category),
        }
    }

    /// Select by the `--suite <category>` flag, matching the category's
    /// lowercase path segment case-insensitively. Returns `None` if `suite`
    /// does not name a known category.
    #[must_use]
    pub fn by_suite_name(suite: &str) -> Option<Self> {
        let needle = suite.to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.path_segment() == needle)
            .map(Self::by_category)
    }

    /// Select by group tag, case-insensitively.
    #[must_use]
    pub fn by_group(group: impl Into<String>) -> Self {
        Self {
            mode: FilterMode::Group(group.into()),
        }
    }

    /// Select only specs carrying a semantic judge sub-spec.
    #[must_use]
    pub fn with_semantic() -> Self {
        Self {
            mode: FilterMode::WithSemantic,
        }
    }

    /// Returns `true` if `spec` passes this filter.
    #[must_use]
    pub fn matches(&self, spec: &TestSpec) -> bool {
        match &self.mode {
            FilterMode::All => true,
            FilterMode::Id(id) => spec.id.eq_ignore_ascii_case(id),
            FilterMode::Category(category) => spec.category == *category,
            FilterMode::Group(group) => spec
                .group
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(group)),
            FilterMode::WithSemantic => spec.has_semantic(),
        }
    }

    /// Apply this filter to a slice of specs, preserving catalog order.
    #[must_use]
    pub fn apply<'a>(&self, specs: &'a [TestSpec]) -> Vec<&'a TestSpec> {
        specs.iter().filter(|s| self.matches(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expectations, InputDescriptor, InputKind};

    fn spec(id: &str, category: Category, group: Option<&str>) -> TestSpec {
        TestSpec {
            id: id.to_string(),
            name: id.to_string(),
            category,
            group: group.map(str::to_string),
            fixture_ref: format!("{}/{}", category.path_segment(), id),
            input: InputDescriptor {
                kind: InputKind::Text,
                example_text: None,
                local_asset_path: None,
            },
            expectations: Expectations::default(),
            meta: None,
        }
    }

    #[test]
    fn all_passes_everything() {
        let specs = vec![spec("TEST-SCOPE-001", Category::Scope, None)];
        assert_eq!(SpecFilter::all().apply(&specs).len(), 1);
    }

    #[test]
    fn by_id_is_case_insensitive() {
        let specs = vec![spec("TEST-SCOPE-001", Category::Scope, None)];
        let matched = SpecFilter::by_id("test-scope-001").apply(&specs);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn by_category_filters_others_out() {
        let specs = vec![
            spec("TEST-SCOPE-001", Category::Scope, None),
            spec("TEST-ARC-001", Category::Archive, None),
        ];
        let matched = SpecFilter::by_category(Category::Archive).apply(&specs);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "TEST-ARC-001");
    }

    #[test]
    fn by_suite_name_resolves_path_segment() {
        let filter = SpecFilter::by_suite_name("ARCHIVE").expect("known suite");
        let specs = vec![spec("TEST-ARC-001", Category::Archive, None)];
        assert_eq!(filter.apply(&specs).len(), 1);
    }

    #[test]
    fn by_suite_name_rejects_unknown_suite() {
        assert!(SpecFilter::by_suite_name("nonexistent").is_none());
    }

    #[test]
    fn by_group_is_case_insensitive_and_skips_ungrouped() {
        let specs = vec![
            spec("TEST-REG-003", Category::Regression, Some("pai")),
            spec("TEST-SCOPE-001", Category::Scope, None),
        ];
        let matched = SpecFilter::by_group("PAI").apply(&specs);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "TEST-REG-003");
    }

    #[test]
    fn with_semantic_only_matches_specs_with_subspec() {
        let mut with_semantic = spec("TEST-REG-003", Category::Regression, None);
        with_semantic.expectations.semantic = Some(crate::SemanticSubSpec {
            description: "checks hint extraction".to_string(),
            checkpoints: vec!["extracts project hint".to_string()],
            target_file_class: crate::TargetFileClass::Raw,
            confidence_threshold: 80,
        });
        let without = spec("TEST-SCOPE-001", Category::Scope, None);
        let specs = vec![with_semantic, without];
        let matched = SpecFilter::with_semantic().apply(&specs);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "TEST-REG-003");
    }

    #[test]
    fn apply_preserves_catalog_order() {
        let specs = vec![
            spec("TEST-SCOPE-001", Category::Scope, None),
            spec("TEST-SCOPE-002", Category::Scope, None),
            spec("TEST-SCOPE-003", Category::Scope, None),
        ];
        let matched = SpecFilter::by_category(Category::Scope).apply(&specs);
        let ids: Vec<&str> = matched.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["TEST-SCOPE-001", "TEST-SCOPE-002", "TEST-SCOPE-003"]);
    }
}
