//! Property tests for path mapping and sync convergence.

use pagesync_storage::{
    decode_segment, encode_segment, sanitize_title, PageRecord, PathCodec, SpaceIndex,
    StorageConfig,
};
use pagesync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::Component;

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn index_of(pages: &[PageSpec]) -> SpaceIndex {
    let mut index = SpaceIndex::new("DEV");
    for page in pages {
        index.upsert_page(PageRecord::new(
            page.id.clone(),
            page.title.clone(),
            1,
            page.parent_id.clone(),
        ));
    }
    index
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn sanitized_titles_are_safe(title in hostile_title_strategy(), max_len in 8usize..120) {
        let stem = sanitize_title(&title, max_len);
        prop_assert!(!stem.is_empty());
        prop_assert!(stem.len() <= max_len);
        prop_assert!(stem.is_ascii());
        prop_assert!(!stem.contains(FORBIDDEN));
        prop_assert!(!stem.chars().any(|c| c.is_ascii_control()));
        prop_assert!(!stem.starts_with(['.', ' ', '-']));
        prop_assert!(!stem.ends_with(['.', ' ', '-']));
    }

    #[test]
    fn sanitizing_is_idempotent(title in hostile_title_strategy()) {
        let once = sanitize_title(&title, 100);
        prop_assert_eq!(sanitize_title(&once, 100), once);
    }

    #[test]
    fn segments_round_trip_as_single_components(id in page_id_strategy()) {
        let segment = encode_segment(&id);
        prop_assert_eq!(decode_segment(&segment), Some(id));
        let path = std::path::Path::new(&segment);
        let components: Vec<_> = path.components().collect();
        prop_assert_eq!(components.len(), 1);
        prop_assert!(matches!(components[0], Component::Normal(_)));
    }

    #[test]
    fn paths_follow_ancestry(pages in forest_strategy(24)) {
        let codec = PathCodec::new(&StorageConfig::new("/mirror"));
        let index = index_of(&pages);
        let mut dirs = HashSet::new();

        for page in &pages {
            let path = codec.resolve_path(&index, &page.id).unwrap();
            let mut expected = codec.space_dir("DEV");
            for ancestor in index.ancestors_of(&page.id).unwrap() {
                expected.push(encode_segment(&ancestor));
            }
            expected.push(encode_segment(&page.id));
            prop_assert!(dirs.insert(expected.clone()), "two pages share {:?}", expected);
            expected.push(codec.leaf_name(&page.title, &page.id));
            prop_assert_eq!(&path, &expected);

            let container = match &page.parent_id {
                Some(parent) => codec.page_dir(&index, parent).unwrap(),
                None => codec.space_dir("DEV"),
            };
            let page_dir = path.parent().unwrap();
            prop_assert_eq!(page_dir.parent().unwrap(), container.as_path());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        ..PropTestConfig::quick().to_proptest_config()
    })]

    #[test]
    fn repeated_syncs_change_nothing(pages in forest_strategy(10)) {
        let mirror = TestMirror::with_config(|c| c.with_fetch_workers(3));
        mirror.seed("DEV", &pages);

        let first = mirror.sync("DEV");
        prop_assert_eq!(first.created, pages.len());
        prop_assert!(first.is_clean());

        let again = mirror.sync("DEV");
        prop_assert_eq!(again.changes(), 0);
        let full = mirror.full_sync("DEV");
        prop_assert_eq!(full.changes(), 0);
        prop_assert_eq!(full.swept, 0);

        check_one_file_per_page(mirror.codec(), &mirror.index("DEV"))
            .map_err(TestCaseError::fail)?;
    }

    #[test]
    fn mirror_converges_after_remote_edits(
        pages in forest_strategy(10),
        mutations in mutation_sequence_strategy(8),
        incremental_first in any::<bool>(),
    ) {
        let mirror = TestMirror::new();
        mirror.seed("DEV", &pages);
        mirror.sync("DEV");

        for mutation in &mutations {
            apply_mutation(mirror.gateway(), "DEV", &pages, mutation);
        }
        if incremental_first {
            let report = mirror.sync("DEV");
            prop_assert!(report.is_clean());
            check_one_file_per_page(mirror.codec(), &mirror.index("DEV"))
                .map_err(TestCaseError::fail)?;
        }

        let report = mirror.full_sync("DEV");
        prop_assert!(report.is_clean(), "failures: {:?}", report.failed);

        let index = mirror.index("DEV");
        check_index_matches_remote(mirror.gateway(), &index).map_err(TestCaseError::fail)?;
        check_one_file_per_page(mirror.codec(), &index).map_err(TestCaseError::fail)?;
    }
}
