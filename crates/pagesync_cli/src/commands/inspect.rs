//! Inspect command implementation.

use super::load_space;
use super::spaces::display_time;
use pagesync_engine::SyncConfig;
use pagesync_storage::{MetadataStore, SpaceIndex, Timestamp};
use serde::Serialize;

/// Space inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Space key.
    pub space_key: String,
    /// Display name.
    pub space_name: String,
    /// Index format version.
    pub format_version: u16,
    /// Number of indexed pages.
    pub page_count: usize,
    /// Number of top-level pages.
    pub root_count: usize,
    /// Deepest nesting level, 0 for top-level pages only.
    pub max_depth: usize,
    /// Incremental watermark.
    pub last_incremental_sync_at: Option<Timestamp>,
    /// Last complete full pass.
    pub last_full_sync_at: Option<Timestamp>,
    /// Whether the next pass would be a full one.
    pub full_sync_due: bool,
    /// Suggested time of the next incremental pass.
    pub next_incremental_due: Option<Timestamp>,
    /// Whether the index is a valid forest.
    pub forest_valid: bool,
    /// Page tree (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<Vec<TreeLine>>,
}

/// One page in the printed tree.
#[derive(Debug, Serialize)]
pub struct TreeLine {
    /// Nesting level.
    pub depth: usize,
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Local version.
    pub version: u64,
}

/// Builds the inspection result for an index.
pub fn inspect(config: &SyncConfig, index: &SpaceIndex, with_tree: bool, now: Timestamp) -> InspectResult {
    let max_depth = index
        .pages()
        .filter_map(|p| index.depth(&p.id))
        .max()
        .unwrap_or(0);

    InspectResult {
        space_key: index.space_key.clone(),
        space_name: index.space_name.clone(),
        format_version: index.format_version,
        page_count: index.len(),
        root_count: index.list_children(None).len(),
        max_depth,
        last_incremental_sync_at: index.last_incremental_sync_at,
        last_full_sync_at: index.last_full_sync_at,
        full_sync_due: config.full_sync_due(index, now),
        next_incremental_due: config.next_incremental_due(index),
        forest_valid: index.validate_forest().is_valid(),
        tree: with_tree.then(|| tree_lines(index)),
    }
}

/// Flattens the index into depth-first lines, siblings sorted by title.
fn tree_lines(index: &SpaceIndex) -> Vec<TreeLine> {
    let mut lines = Vec::new();
    let mut stack: Vec<(usize, &str)> = Vec::new();
    push_children(index, None, 0, &mut stack);

    while let Some((depth, id)) = stack.pop() {
        let Some(page) = index.page(id) else { continue };
        lines.push(TreeLine {
            depth,
            id: page.id.clone(),
            title: page.title.clone(),
            version: page.version,
        });
        push_children(index, Some(id), depth + 1, &mut stack);
    }
    lines
}

fn push_children<'a>(
    index: &'a SpaceIndex,
    parent: Option<&str>,
    depth: usize,
    stack: &mut Vec<(usize, &'a str)>,
) {
    // Reversed so the first child is popped first.
    stack.extend(
        index
            .list_children(parent)
            .iter()
            .rev()
            .map(|p| (depth, p.id.as_str())),
    );
}

/// Runs the inspect command.
pub fn run(
    config: &SyncConfig,
    space_key: &str,
    show_tree: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = load_space(&MetadataStore::new(&config.storage), space_key)?;
    let result = inspect(config, &index, show_tree, Timestamp::now());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Space: {} ({})", result.space_key, result.space_name);
    println!("Index format: v{}", result.format_version);
    println!();
    println!("Pages: {}", result.page_count);
    println!("  Top-level: {}", result.root_count);
    println!("  Max depth: {}", result.max_depth);
    println!(
        "  Forest:    {}",
        if result.forest_valid { "valid" } else { "INVALID" }
    );
    println!();
    println!("Last incremental sync: {}", display_time(result.last_incremental_sync_at));
    println!("Last full sync:        {}", display_time(result.last_full_sync_at));
    println!("Next incremental due:  {}", display_time(result.next_incremental_due));
    println!(
        "Full sync due:         {}",
        if result.full_sync_due { "yes" } else { "no" }
    );

    if let Some(tree) = &result.tree {
        println!();
        for line in tree {
            println!(
                "{}{} [{}] v{}",
                "  ".repeat(line.depth),
                line.title,
                line.id,
                line.version
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_storage::{PageRecord, StorageConfig};
    use std::time::Duration;

    fn sample() -> SpaceIndex {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(PageRecord::new("1", "Home", 1, None));
        index.upsert_page(PageRecord::new("3", "Zeta", 2, Some("1".into())));
        index.upsert_page(PageRecord::new("2", "Alpha", 1, Some("1".into())));
        index.upsert_page(PageRecord::new("4", "Deep", 1, Some("2".into())));
        index
    }

    #[test]
    fn counts_and_tree_order() {
        let config = SyncConfig::new(StorageConfig::new("/mirror"), "");
        let result = inspect(&config, &sample(), true, Timestamp(1_000));

        assert_eq!(result.page_count, 4);
        assert_eq!(result.root_count, 1);
        assert_eq!(result.max_depth, 2);
        assert!(result.forest_valid);

        let tree: Vec<_> = result
            .tree
            .unwrap()
            .into_iter()
            .map(|l| (l.depth, l.title))
            .collect();
        assert_eq!(
            tree,
            vec![
                (0, "Home".to_string()),
                (1, "Alpha".to_string()),
                (2, "Deep".to_string()),
                (1, "Zeta".to_string()),
            ]
        );
    }

    #[test]
    fn shows_space_name_reported_by_remote() {
        use pagesync_engine::{MemoryGateway, SyncEngine};

        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::new(StorageConfig::new(dir.path()), "");
        let gateway = MemoryGateway::new();
        gateway.set_space_name("DEV", "Development");
        gateway.create_page("DEV", "1", "Home", None, "<p>home</p>");
        SyncEngine::new(config.clone(), gateway)
            .sync_space("DEV", false)
            .unwrap();

        let index = load_space(&MetadataStore::new(&config.storage), "DEV").unwrap();
        let result = inspect(&config, &index, false, Timestamp::now());
        assert_eq!(result.space_key, "DEV");
        assert_eq!(result.space_name, "Development");
    }

    #[test]
    fn full_sync_due_follows_policy() {
        let config = SyncConfig::new(StorageConfig::new("/mirror"), "")
            .with_full_sync_interval(Duration::from_secs(60));
        let mut index = sample();
        assert!(inspect(&config, &index, false, Timestamp(0)).full_sync_due);

        index.last_full_sync_at = Some(Timestamp(1_000));
        index.last_incremental_sync_at = Some(Timestamp(1_000));
        let result = inspect(&config, &index, false, Timestamp(2_000));
        assert!(!result.full_sync_due);
        assert!(result.tree.is_none());
        assert!(inspect(&config, &index, false, Timestamp(61_000)).full_sync_due);
    }
}
