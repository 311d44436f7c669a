//! Reconciliation of a manifest tag against the local hash catalog.
//!
//! [`plan`] is a pure function: it reads the manifest and the catalog and
//! returns the ordered actions needed to bring the install up to date.
//! Fetch and skip actions follow the tag's file order; deletions for files
//! the catalog knows about but the tag no longer lists come last, in path
//! order.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::catalog::HashCatalog;
use crate::manifest::Manifest;

/// What to do with one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Download and install the manifest version.
    Fetch,
    /// Remove the local file and forget its hash.
    Delete,
    /// Already up to date.
    Skip,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Fetch => "fetch",
            ActionKind::Delete => "delete",
            ActionKind::Skip => "skip",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of an update plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub path: String,
    pub kind: ActionKind,
    /// Manifest hash for fetch/skip, last recorded hash for delete.
    pub expected_hash: String,
    pub expected_size: Option<u64>,
}

/// Errors raised while planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The requested tag is not declared in the manifest.
    #[error("Tag '{0}' is not declared in the manifest")]
    UnknownTag(String),
}

/// Ordered actions for one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    tag: String,
    actions: Vec<PlannedAction>,
}

impl Plan {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn actions(&self) -> &[PlannedAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions of the given kind.
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// True when nothing needs to be fetched or deleted.
    pub fn is_up_to_date(&self) -> bool {
        self.actions.iter().all(|a| a.kind == ActionKind::Skip)
    }

    /// Sum of declared sizes of the files to fetch.
    pub fn fetch_bytes(&self) -> u64 {
        self.actions
            .iter()
            .filter(|a| a.kind == ActionKind::Fetch)
            .filter_map(|a| a.expected_size)
            .sum()
    }

    /// Paths of the actions of the given kind, in plan order.
    pub fn paths(&self, kind: ActionKind) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.kind == kind)
            .map(|a| a.path.as_str())
            .collect()
    }
}

/// Compute the update plan for `tag`.
pub fn plan(manifest: &Manifest, tag: &str, catalog: &HashCatalog) -> Result<Plan, PlanError> {
    let tag_entry = manifest
        .tag(tag)
        .ok_or_else(|| PlanError::UnknownTag(tag.to_string()))?;

    let mut actions = Vec::with_capacity(tag_entry.files.len());
    let mut listed = HashSet::with_capacity(tag_entry.files.len());

    for file in &tag_entry.files {
        listed.insert(file.path.as_str());

        let up_to_date = catalog.get(&file.path).is_some_and(|known| {
            known.hash == file.hash && file.size.map_or(true, |size| size == known.size)
        });

        actions.push(PlannedAction {
            path: file.path.clone(),
            kind: if up_to_date {
                ActionKind::Skip
            } else {
                ActionKind::Fetch
            },
            expected_hash: file.hash.clone(),
            expected_size: file.size,
        });
    }

    for (path, known) in catalog.iter() {
        if !listed.contains(path) {
            actions.push(PlannedAction {
                path: path.to_string(),
                kind: ActionKind::Delete,
                expected_hash: known.hash.clone(),
                expected_size: Some(known.size),
            });
        }
    }

    Ok(Plan {
        tag: tag.to_string(),
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileEntry, Tag};

    fn manifest(files: Vec<FileEntry>) -> Manifest {
        Manifest::from_tags(vec![Tag {
            name: "Live".to_string(),
            title: "Live".to_string(),
            server: "http://example.com/live".to_string(),
            files,
        }])
    }

    fn kinds(plan: &Plan) -> Vec<(&str, ActionKind)> {
        plan.actions()
            .iter()
            .map(|a| (a.path.as_str(), a.kind))
            .collect()
    }

    #[test]
    fn test_empty_catalog_fetches_everything() {
        let manifest = manifest(vec![
            FileEntry::new("a.dat", "hashX", None),
            FileEntry::new("b.dat", "hashY", None),
        ]);
        let plan = plan(&manifest, "Live", &HashCatalog::in_memory()).unwrap();

        assert_eq!(
            kinds(&plan),
            vec![("a.dat", ActionKind::Fetch), ("b.dat", ActionKind::Fetch)]
        );
        assert!(!plan.is_up_to_date());
    }

    #[test]
    fn test_matching_entry_is_skipped() {
        let manifest = manifest(vec![FileEntry::new("a.dat", "hashX", Some(10))]);
        let mut catalog = HashCatalog::in_memory();
        catalog.put("a.dat", "hashX", 10).unwrap();

        let plan = plan(&manifest, "Live", &catalog).unwrap();
        assert_eq!(kinds(&plan), vec![("a.dat", ActionKind::Skip)]);
        assert!(plan.is_up_to_date());
    }

    #[test]
    fn test_hash_or_size_change_fetches() {
        let mut catalog = HashCatalog::in_memory();
        catalog.put("a.dat", "hashX", 10).unwrap();

        let changed_hash = manifest(vec![FileEntry::new("a.dat", "hashZ", Some(10))]);
        let changed_size = manifest(vec![FileEntry::new("a.dat", "hashX", Some(11))]);

        for m in [changed_hash, changed_size] {
            let plan = plan(&m, "Live", &catalog).unwrap();
            assert_eq!(plan.count(ActionKind::Fetch), 1);
        }
    }

    #[test]
    fn test_unknown_manifest_size_compares_hash_only() {
        let manifest = manifest(vec![FileEntry::new("a.dat", "hashX", None)]);
        let mut catalog = HashCatalog::in_memory();
        catalog.put("a.dat", "hashX", 12345).unwrap();

        let plan = plan(&manifest, "Live", &catalog).unwrap();
        assert_eq!(plan.count(ActionKind::Skip), 1);
    }

    #[test]
    fn test_unlisted_catalog_entries_are_deleted_last() {
        let manifest = manifest(vec![
            FileEntry::new("b.dat", "hashB", None),
            FileEntry::new("a.dat", "hashA", Some(1)),
        ]);
        let mut catalog = HashCatalog::in_memory();
        catalog.put("z/old.dat", "hashOld", 3).unwrap();
        catalog.put("c.dat", "hashC", 2).unwrap();
        catalog.put("b.dat", "hashB", 9).unwrap();

        let plan = plan(&manifest, "Live", &catalog).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                ("b.dat", ActionKind::Skip),
                ("a.dat", ActionKind::Fetch),
                ("c.dat", ActionKind::Delete),
                ("z/old.dat", ActionKind::Delete),
            ]
        );
        assert_eq!(plan.actions()[2].expected_hash, "hashC");
        assert_eq!(plan.fetch_bytes(), 1);
        assert_eq!(plan.paths(ActionKind::Delete), vec!["c.dat", "z/old.dat"]);
    }

    #[test]
    fn test_unknown_tag() {
        let manifest = manifest(Vec::new());
        assert_eq!(
            plan(&manifest, "Test", &HashCatalog::in_memory()),
            Err(PlanError::UnknownTag("Test".to_string()))
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn files_strategy() -> impl Strategy<Value = Vec<(String, String, Option<u64>)>> {
            proptest::collection::btree_map(
                "[a-z]{1,6}(/[a-z]{1,6})?",
                ("[0-9a-f]{4}", proptest::option::of(0u64..1000)),
                0..12,
            )
            .prop_map(|m| m.into_iter().map(|(p, (h, s))| (p, h, s)).collect())
        }

        fn catalog_from(entries: &[(String, String, Option<u64>)]) -> HashCatalog {
            let mut catalog = HashCatalog::in_memory();
            for (path, hash, size) in entries {
                catalog.put(path, hash, size.unwrap_or(0)).unwrap();
            }
            catalog
        }

        proptest! {
            #[test]
            fn prop_plan_is_deterministic(
                files in files_strategy(),
                known in files_strategy(),
            ) {
                let manifest = manifest(
                    files.iter().map(|(p, h, s)| FileEntry::new(p.clone(), h.clone(), *s)).collect(),
                );
                let catalog = catalog_from(&known);

                let first = plan(&manifest, "Live", &catalog).unwrap();
                let second = plan(&manifest, "Live", &catalog).unwrap();
                prop_assert_eq!(&first, &second);

                // Every listed file appears exactly once, in manifest order.
                let listed: Vec<&str> = first
                    .actions()
                    .iter()
                    .filter(|a| a.kind != ActionKind::Delete)
                    .map(|a| a.path.as_str())
                    .collect();
                let expected: Vec<&str> = files.iter().map(|(p, _, _)| p.as_str()).collect();
                prop_assert_eq!(listed, expected);
            }

            #[test]
            fn prop_exact_match_skips_and_any_change_fetches(
                files in files_strategy(),
                flip_hash in any::<bool>(),
            ) {
                prop_assume!(!files.is_empty());
                let sized: Vec<_> = files
                    .iter()
                    .map(|(p, h, s)| (p.clone(), h.clone(), Some(s.unwrap_or(7))))
                    .collect();
                let catalog = catalog_from(&sized);

                let same = manifest(
                    sized.iter().map(|(p, h, s)| FileEntry::new(p.clone(), h.clone(), *s)).collect(),
                );
                prop_assert!(plan(&same, "Live", &catalog).unwrap().is_up_to_date());

                let mut changed = sized.clone();
                if flip_hash {
                    changed[0].1.push('x');
                } else {
                    changed[0].2 = changed[0].2.map(|s| s + 1);
                }
                let changed = manifest(
                    changed.iter().map(|(p, h, s)| FileEntry::new(p.clone(), h.clone(), *s)).collect(),
                );
                let result = plan(&changed, "Live", &catalog).unwrap();
                prop_assert_eq!(result.actions()[0].kind, ActionKind::Fetch);
                prop_assert_eq!(result.count(ActionKind::Fetch), 1);
            }
        }
    }
}
