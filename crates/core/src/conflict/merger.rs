//! Folding constraints into the conflict section.
//!
//! [`ConflictMerger::merge`] handles one (package, constraint) pair;
//! [`ConflictMerger::evaluate_entry`] folds every affected range of a feed
//! entry through it. Both take the manifest by reference and return a new
//! value, so the caller's manifest is never mutated.

use serde::Serialize;
use tracing::{debug, warn};

use crate::conflict::constraint;
use crate::conflict::key;
use crate::conflict::manifest::ComposerManifest;
use crate::feed::{FeedEntry, SoftwareRecord};

/// Separator between alternative constraints for the same package.
pub const OR_SEPARATOR: &str = " || ";

/// The result of merging one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub manifest: ComposerManifest,
    /// The constraint that was merged (whether or not it changed anything).
    pub last_constraint: String,
    pub changed: bool,
}

/// One constraint an entry added to the conflict section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictChange {
    pub package: String,
    pub constraint: String,
}

/// The combined result of merging every range of a feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryEvaluation {
    pub manifest: ComposerManifest,
    /// Constraints that changed the manifest, in merge order.
    pub changes: Vec<ConflictChange>,
    /// The last constraint that changed the manifest, or the last one built
    /// if none did.
    pub last_constraint: Option<String>,
}

impl EntryEvaluation {
    fn unchanged(manifest: ComposerManifest) -> Self {
        Self {
            manifest,
            changes: Vec::new(),
            last_constraint: None,
        }
    }

    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    fn absorb(mut self, package: &str, outcome: MergeOutcome) -> Self {
        if outcome.changed {
            self.changes.push(ConflictChange {
                package: package.to_string(),
                constraint: outcome.last_constraint.clone(),
            });
            self.last_constraint = Some(outcome.last_constraint);
        } else if self.changes.is_empty() {
            self.last_constraint = Some(outcome.last_constraint);
        }
        self.manifest = outcome.manifest;
        self
    }

    fn combine(mut self, next: EntryEvaluation) -> Self {
        if next.changed() {
            self.last_constraint = next.last_constraint;
        } else if self.changes.is_empty() && next.last_constraint.is_some() {
            self.last_constraint = next.last_constraint;
        }
        self.changes.extend(next.changes);
        self.manifest = next.manifest;
        self
    }
}

/// Stateless conflict-section merge engine.
pub struct ConflictMerger;

impl ConflictMerger {
    /// Merge `constraint` for `package` into a copy of `manifest`.
    ///
    /// - absent package: inserted;
    /// - existing value not containing `constraint` verbatim: appended with `" || "`;
    /// - otherwise unchanged.
    ///
    /// A changed conflict section is re-sorted by package name.
    pub fn merge(manifest: &ComposerManifest, package: &str, constraint: &str) -> MergeOutcome {
        let merged = match manifest.constraint_for(package) {
            None => Some(constraint.to_string()),
            Some(existing) if !existing.contains(constraint) => {
                Some(format!("{existing}{OR_SEPARATOR}{constraint}"))
            }
            Some(_) => None,
        };

        let Some(value) = merged else {
            debug!(package, constraint, "constraint already present");
            return MergeOutcome {
                manifest: manifest.clone(),
                last_constraint: constraint.to_string(),
                changed: false,
            };
        };

        let mut next = manifest.clone();
        next.set_constraint(package.to_string(), value);
        next.sort_conflict();
        debug!(package, constraint, "constraint merged");
        MergeOutcome {
            manifest: next,
            last_constraint: constraint.to_string(),
            changed: true,
        }
    }

    /// Fold every affected range of `entry` into a copy of `base`.
    pub fn evaluate_entry(base: &ComposerManifest, entry: &FeedEntry) -> EntryEvaluation {
        let entry_id = entry.branch_name();
        entry
            .software
            .iter()
            .fold(EntryEvaluation::unchanged(base.clone()), |acc, software| {
                let next = Self::evaluate_software(&acc.manifest, software, &entry_id);
                acc.combine(next)
            })
    }

    fn evaluate_software(
        manifest: &ComposerManifest,
        software: &SoftwareRecord,
        entry_id: &str,
    ) -> EntryEvaluation {
        let start = EntryEvaluation::unchanged(manifest.clone());

        let Some(package) = key::resolve(software.software_type, &software.slug) else {
            warn!(
                entry = entry_id,
                software_type = %software.software_type,
                slug = %software.slug,
                "no composer package for software, skipping"
            );
            return start;
        };

        if software.affected_versions.is_empty() {
            warn!(entry = entry_id, package = %package, "software has no affected versions");
            return start;
        }

        software
            .affected_versions
            .iter()
            .enumerate()
            .fold(start, |acc, (index, range)| match constraint::try_build(range) {
                Ok(constraint) => {
                    let outcome = Self::merge(&acc.manifest, &package, &constraint);
                    acc.absorb(&package, outcome)
                }
                Err(reason) => {
                    warn!(
                        entry = entry_id,
                        package = %package,
                        range = index,
                        reason = %reason,
                        "could not build conflict constraint for affected range"
                    );
                    acc
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{AffectedVersionRange, SoftwareType};

    fn software(
        software_type: SoftwareType,
        slug: &str,
        ranges: Vec<AffectedVersionRange>,
    ) -> SoftwareRecord {
        SoftwareRecord {
            software_type,
            name: slug.to_string(),
            slug: slug.to_string(),
            affected_versions: ranges,
        }
    }

    fn up_to(version: &str) -> AffectedVersionRange {
        AffectedVersionRange {
            from_version: "*".into(),
            from_inclusive: true,
            to_version: Some(version.into()),
            to_inclusive: true,
        }
    }

    fn entry(software: Vec<SoftwareRecord>) -> FeedEntry {
        FeedEntry {
            id: Some("v1".into()),
            title: None,
            software,
            cvss_score: None,
            references: Vec::new(),
        }
    }

    #[test]
    fn test_insert_into_empty_manifest() {
        let outcome =
            ConflictMerger::merge(&ComposerManifest::default(), "wpackagist-plugin/a", "<=1.0");
        assert!(outcome.changed);
        assert_eq!(outcome.last_constraint, "<=1.0");
        assert_eq!(outcome.manifest.constraint_for("wpackagist-plugin/a"), Some("<=1.0"));
    }

    #[test]
    fn test_append_distinct_constraint() {
        let first = ConflictMerger::merge(&ComposerManifest::default(), "p/a", "<=1.0");
        let second = ConflictMerger::merge(&first.manifest, "p/a", ">=2.0,<2.1");
        assert!(second.changed);
        assert_eq!(second.manifest.constraint_for("p/a"), Some("<=1.0 || >=2.0,<2.1"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = ConflictMerger::merge(&ComposerManifest::default(), "p/a", "<=1.0");
        let twice = ConflictMerger::merge(&once.manifest, "p/a", "<=1.0");
        assert!(!twice.changed);
        assert_eq!(twice.manifest, once.manifest);
    }

    #[test]
    fn test_dedup_is_substring_containment() {
        let base = ConflictMerger::merge(&ComposerManifest::default(), "p/a", ">=1.0,<=1.0.5");
        let outcome = ConflictMerger::merge(&base.manifest, "p/a", "<=1.0.5");
        assert!(!outcome.changed);
    }

    #[test]
    fn test_changed_section_is_sorted_and_input_untouched() {
        let unsorted = ComposerManifest::from_json_str(
            r#"{"conflict": {"z/z": "<1", "b/b": "<1"}}"#,
        )
        .unwrap();
        let outcome = ConflictMerger::merge(&unsorted, "m/m", "<2");
        let keys: Vec<_> = outcome.manifest.conflict().keys().cloned().collect();
        assert_eq!(keys, vec!["b/b", "m/m", "z/z"]);
        assert!(!unsorted.is_conflict_sorted());

        let noop = ConflictMerger::merge(&unsorted, "z/z", "<1");
        assert!(!noop.changed);
        assert_eq!(noop.manifest, unsorted);
    }

    #[test]
    fn test_sorted_after_any_merge_sequence() {
        let pairs = [("w/c", "<1"), ("a/x", "<2"), ("w/c", "<3"), ("m/q", "1.0"), ("a/x", "<2")];
        let mut manifest = ComposerManifest::default();
        for (package, constraint) in pairs {
            manifest = ConflictMerger::merge(&manifest, package, constraint).manifest;
            assert!(manifest.is_conflict_sorted());
        }
        assert_eq!(manifest.constraint_for("w/c"), Some("<1 || <3"));
    }

    #[test]
    fn test_evaluate_entry_folds_all_ranges() {
        let e = entry(vec![
            software(
                SoftwareType::Plugin,
                "Acme-SEO",
                vec![up_to("2.1.0"), up_to("not-a-version")],
            ),
            software(SoftwareType::Core, "php", vec![up_to("8.0")]),
            software(SoftwareType::Theme, "twenty", vec![up_to("1.2")]),
        ]);
        let evaluation = ConflictMerger::evaluate_entry(&ComposerManifest::default(), &e);
        assert!(evaluation.changed());
        assert_eq!(
            evaluation.changes,
            vec![
                ConflictChange {
                    package: "wpackagist-plugin/acme-seo".into(),
                    constraint: "<=2.1.0".into()
                },
                ConflictChange {
                    package: "wpackagist-theme/twenty".into(),
                    constraint: "<=1.2".into()
                },
            ]
        );
        assert_eq!(evaluation.last_constraint.as_deref(), Some("<=1.2"));
        assert_eq!(evaluation.manifest.conflict().len(), 2);
    }

    #[test]
    fn test_evaluate_entry_without_changes_keeps_last_built_constraint() {
        let base =
            ConflictMerger::merge(&ComposerManifest::default(), "roots/wordpress", "<=6.4.2")
                .manifest;
        let e = entry(vec![software(SoftwareType::Core, "wordpress", vec![up_to("6.4.2")])]);
        let evaluation = ConflictMerger::evaluate_entry(&base, &e);
        assert!(!evaluation.changed());
        assert_eq!(evaluation.last_constraint.as_deref(), Some("<=6.4.2"));
        assert_eq!(evaluation.manifest, base);
    }

    #[test]
    fn test_evaluate_entry_with_no_software() {
        let evaluation =
            ConflictMerger::evaluate_entry(&ComposerManifest::default(), &entry(vec![]));
        assert!(!evaluation.changed());
        assert!(evaluation.last_constraint.is_none());
    }
}
