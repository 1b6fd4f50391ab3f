//! Property-based test generators using proptest.
//!
//! Forests are generated parents-first: page `i` may only hang under a page
//! with a smaller index, so every generated forest is acyclic and can be
//! seeded in order.

use pagesync_engine::{MemoryGateway, RemoteGateway};
use proptest::prelude::*;

/// A page to create in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Parent page id.
    pub parent_id: Option<String>,
    /// Page body.
    pub body: String,
}

impl PageSpec {
    /// Creates a page spec with a body derived from the title.
    pub fn new(id: &str, title: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            parent_id: parent_id.map(str::to_string),
            body: format!("<p>{title}</p>"),
        }
    }
}

/// Strategy for titles people actually write: words, punctuation, path
/// separators and a few accented letters.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 :/\\\\*?\"<>|.()&'_-]{0,40}|[A-Za-zéüßÅœ ]{1,20}")
        .expect("Invalid regex")
}

/// Strategy for arbitrary, possibly hostile titles.
pub fn hostile_title_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        Just("..".to_string()),
        Just("CON".to_string()),
        Just("attachments".to_string()),
        Just("_metadata".to_string()),
        prop::string::string_regex("[ ./\\\\-]{0,12}").expect("Invalid regex"),
    ]
}

/// Strategy for opaque page ids, including characters that need escaping.
pub fn page_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{1,10}|[A-Za-z0-9%/._-]{1,12}").expect("Invalid regex")
}

/// Strategy for an acyclic forest of 1 to `max_pages` pages with unique ids.
pub fn forest_strategy(max_pages: usize) -> impl Strategy<Value = Vec<PageSpec>> {
    prop::collection::vec(
        (title_strategy(), any::<usize>(), any::<bool>()),
        1..=max_pages.max(1),
    )
    .prop_map(|pages| {
        let ids: Vec<String> = (0..pages.len()).map(|i| (100 + i).to_string()).collect();
        pages
            .into_iter()
            .enumerate()
            .map(|(i, (title, parent, is_root))| {
                let parent_id = if i == 0 || is_root {
                    None
                } else {
                    Some(ids[parent % i].clone())
                };
                PageSpec {
                    id: ids[i].clone(),
                    body: format!("<p>{i}</p>"),
                    title,
                    parent_id,
                }
            })
            .collect()
    })
}

/// A remote change applied between sync passes.
///
/// Targets are picked modulo the number of pages still present.
#[derive(Debug, Clone)]
pub enum RemoteMutation {
    /// Replace the body of a page.
    Edit {
        /// Target page.
        target: usize,
    },
    /// Give a page a new title.
    Rename {
        /// Target page.
        target: usize,
        /// New title.
        title: String,
    },
    /// Re-parent a page under one created before it, or to the top level.
    Move {
        /// Target page.
        target: usize,
        /// New parent, chosen among earlier pages.
        parent: Option<usize>,
    },
    /// Delete a page that has no children.
    DeleteLeaf {
        /// Target page.
        target: usize,
    },
}

/// Strategy for a single remote mutation.
pub fn mutation_strategy() -> impl Strategy<Value = RemoteMutation> {
    prop_oneof![
        any::<usize>().prop_map(|target| RemoteMutation::Edit { target }),
        (any::<usize>(), title_strategy())
            .prop_map(|(target, title)| RemoteMutation::Rename { target, title }),
        (any::<usize>(), prop::option::of(any::<usize>()))
            .prop_map(|(target, parent)| RemoteMutation::Move { target, parent }),
        any::<usize>().prop_map(|target| RemoteMutation::DeleteLeaf { target }),
    ]
}

/// Strategy for a sequence of remote mutations.
pub fn mutation_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<RemoteMutation>> {
    prop::collection::vec(mutation_strategy(), 0..=max_len)
}

/// Applies a mutation to the pages of `pages` still present remotely.
///
/// Moves only pick parents created earlier, so the remote forest stays
/// acyclic. The last remaining page is never deleted, since an empty
/// listing is not treated as a deletion. Returns false if the mutation did
/// not apply.
pub fn apply_mutation(
    gateway: &MemoryGateway,
    space_key: &str,
    pages: &[PageSpec],
    mutation: &RemoteMutation,
) -> bool {
    let present: Vec<&PageSpec> = pages
        .iter()
        .filter(|p| gateway.version_of(&p.id).is_some())
        .collect();
    if present.is_empty() {
        return false;
    }

    match mutation {
        RemoteMutation::Edit { target } => {
            let page = present[target % present.len()];
            gateway.edit_page(&page.id, &format!("<p>edited {}</p>", page.id));
            true
        }
        RemoteMutation::Rename { target, title } => {
            let page = present[target % present.len()];
            gateway.rename_page(&page.id, title);
            true
        }
        RemoteMutation::Move { target, parent } => {
            let position = target % present.len();
            let page = present[position];
            let parent_id = match parent {
                Some(_) if position == 0 => return false,
                Some(parent) => Some(present[parent % position].id.as_str()),
                None => None,
            };
            gateway.move_page(&page.id, parent_id);
            true
        }
        RemoteMutation::DeleteLeaf { .. } if present.len() == 1 => false,
        RemoteMutation::DeleteLeaf { target } => {
            let page = present[target % present.len()];
            let has_children = gateway
                .list_full_tree(space_key)
                .map(|tree| {
                    tree.iter()
                        .any(|e| e.parent_id.as_deref() == Some(page.id.as_str()))
                })
                .unwrap_or(true);
            if has_children {
                return false;
            }
            gateway.delete_page(&page.id)
        }
    }
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn forests_are_parents_first(pages in forest_strategy(12)) {
            let mut seen = std::collections::HashSet::new();
            for page in &pages {
                if let Some(parent) = &page.parent_id {
                    prop_assert!(seen.contains(parent));
                }
                prop_assert!(seen.insert(page.id.clone()));
            }
            prop_assert!(pages[0].parent_id.is_none());
        }

        #[test]
        fn page_ids_are_never_empty(id in page_id_strategy()) {
            prop_assert!(!id.is_empty());
        }
    }

    #[test]
    fn move_never_targets_later_pages() {
        let gateway = MemoryGateway::new();
        let pages = vec![
            PageSpec::new("1", "A", None),
            PageSpec::new("2", "B", Some("1")),
        ];
        crate::fixtures::seed_remote(&gateway, "DEV", &pages);

        let applied = apply_mutation(
            &gateway,
            "DEV",
            &pages,
            &RemoteMutation::Move {
                target: 0,
                parent: Some(0),
            },
        );
        assert!(!applied);
    }

    #[test]
    fn delete_skips_pages_with_children() {
        let gateway = MemoryGateway::new();
        let pages = vec![
            PageSpec::new("1", "A", None),
            PageSpec::new("2", "B", Some("1")),
        ];
        crate::fixtures::seed_remote(&gateway, "DEV", &pages);

        let delete_root = RemoteMutation::DeleteLeaf { target: 0 };
        assert!(!apply_mutation(&gateway, "DEV", &pages, &delete_root));
        assert!(gateway.version_of("1").is_some());
    }

    #[test]
    fn delete_keeps_the_last_page() {
        let gateway = MemoryGateway::new();
        let pages = vec![PageSpec::new("1", "A", None)];
        crate::fixtures::seed_remote(&gateway, "DEV", &pages);

        let delete = RemoteMutation::DeleteLeaf { target: 0 };
        assert!(!apply_mutation(&gateway, "DEV", &pages, &delete));
        assert!(gateway.version_of("1").is_some());
    }
}
