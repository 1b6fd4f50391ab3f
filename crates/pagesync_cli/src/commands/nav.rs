//! Nav command implementation.

use super::{load_space, CommandError};
use pagesync_storage::{navigation, MetadataStore, Navigation, StorageConfig};

/// Runs the nav command.
pub fn run(
    config: &StorageConfig,
    page_id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = MetadataStore::new(config);
    let (space_key, _) = store
        .locate(page_id)?
        .ok_or_else(|| CommandError::UnknownPage(page_id.to_string()))?;
    let index = load_space(&store, &space_key)?;
    let nav = navigation(store.codec(), &index, page_id)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&nav)?),
        _ => print_text_output(&nav),
    }
    Ok(())
}

fn print_text_output(nav: &Navigation) {
    println!("Space: {}", nav.space_key);

    println!();
    println!("Breadcrumb:");
    if nav.breadcrumb.is_empty() {
        println!("  (top level)");
    }
    for crumb in &nav.breadcrumb {
        println!(
            "  {}{} [{}]",
            "  ".repeat(crumb.level),
            crumb.title,
            crumb.id
        );
    }

    println!();
    println!("Siblings:");
    for entry in &nav.siblings {
        let marker = if entry.requested { "*" } else { " " };
        println!("  {marker} {} [{}]  {}", entry.title, entry.id, entry.path.display());
    }

    println!();
    println!("Children:");
    if nav.children.is_empty() {
        println!("  (none)");
    }
    for entry in &nav.children {
        println!("    {} [{}]  {}", entry.title, entry.id, entry.path.display());
    }
}
