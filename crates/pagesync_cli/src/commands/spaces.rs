//! Spaces command implementation.

use pagesync_storage::{MetadataStore, StorageConfig, Timestamp};
use serde::Serialize;
use tracing::warn;

/// Summary of one synced space.
#[derive(Debug, Serialize)]
pub struct SpaceSummary {
    /// Space key.
    pub space_key: String,
    /// Display name.
    pub space_name: String,
    /// Number of indexed pages.
    pub page_count: usize,
    /// Incremental watermark.
    pub last_incremental_sync_at: Option<Timestamp>,
    /// Last complete full pass.
    pub last_full_sync_at: Option<Timestamp>,
}

/// Collects a summary of every readable space under the root.
pub fn collect(store: &MetadataStore) -> Result<Vec<SpaceSummary>, Box<dyn std::error::Error>> {
    let mut summaries = Vec::new();
    for key in store.list_spaces()? {
        match store.load(&key) {
            Ok(Some(index)) => summaries.push(SpaceSummary {
                space_key: index.space_key.clone(),
                space_name: index.space_name.clone(),
                page_count: index.len(),
                last_incremental_sync_at: index.last_incremental_sync_at,
                last_full_sync_at: index.last_full_sync_at,
            }),
            Ok(None) => {}
            Err(e) => warn!(space = %key, error = %e, "skipping unreadable space"),
        }
    }
    Ok(summaries)
}

/// Runs the spaces command.
pub fn run(config: &StorageConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let summaries = collect(&MetadataStore::new(config))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => {
            if summaries.is_empty() {
                println!("No synced spaces under {}", config.root().display());
                return Ok(());
            }
            println!("{:<12} {:>7}  {:<15} {:<15}", "SPACE", "PAGES", "INCREMENTAL", "FULL");
            for s in &summaries {
                println!(
                    "{:<12} {:>7}  {:<15} {:<15}",
                    s.space_key,
                    s.page_count,
                    display_time(s.last_incremental_sync_at),
                    display_time(s.last_full_sync_at),
                );
            }
        }
    }

    Ok(())
}

pub(crate) fn display_time(at: Option<Timestamp>) -> String {
    at.map(|t| t.to_string()).unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_storage::{PageRecord, SpaceIndex};
    use tempfile::tempdir;

    #[test]
    fn collects_saved_spaces() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(&StorageConfig::new(dir.path()));
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(PageRecord::new("1", "Home", 1, None));
        index.last_full_sync_at = Some(Timestamp(7));
        store.save(&index).unwrap();
        store.save(&SpaceIndex::new("OPS")).unwrap();

        let summaries = collect(&store).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].space_key, "DEV");
        assert_eq!(summaries[0].page_count, 1);
        assert_eq!(summaries[0].last_full_sync_at, Some(Timestamp(7)));
        assert_eq!(summaries[1].page_count, 0);
    }

    #[test]
    fn never_synced_displays_never() {
        assert_eq!(display_time(None), "never");
        assert_eq!(display_time(Some(Timestamp(5))), "5");
    }
}
