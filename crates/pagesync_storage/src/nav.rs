//! Navigation context around a mirrored page.

use crate::error::{StorageError, StorageResult};
use crate::path::PathCodec;
use crate::types::{PageRecord, SpaceIndex};
use serde::Serialize;
use std::path::PathBuf;

/// One step of a breadcrumb, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    /// Depth below the space root, starting at 0.
    pub level: usize,
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Local content file.
    pub path: PathBuf,
}

/// A neighbouring page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Local content file.
    pub path: PathBuf,
    /// True for the page navigation was requested for.
    pub requested: bool,
}

/// Where a page sits in its space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    /// Owning space.
    pub space_key: String,
    /// Ancestors from the space root down to the immediate parent.
    pub breadcrumb: Vec<Crumb>,
    /// Pages sharing the parent, including the requested one.
    pub siblings: Vec<NavEntry>,
    /// Direct children.
    pub children: Vec<NavEntry>,
}

/// Builds the navigation context of an indexed page.
///
/// # Errors
///
/// Returns [`StorageError::Structural`] if the page is not indexed or its
/// ancestry cannot be resolved.
pub fn navigation(codec: &PathCodec, index: &SpaceIndex, page_id: &str) -> StorageResult<Navigation> {
    let record = index
        .page(page_id)
        .ok_or_else(|| StorageError::structural(page_id, "page is not indexed"))?;

    let breadcrumb = index
        .ancestors_of(page_id)?
        .into_iter()
        .enumerate()
        .map(|(level, id)| {
            let title = index.page(&id).map(|p| p.title.clone()).unwrap_or_default();
            let path = codec.resolve_path(index, &id)?;
            Ok(Crumb {
                level,
                id,
                title,
                path,
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    let entry = |page: &PageRecord| -> StorageResult<NavEntry> {
        Ok(NavEntry {
            id: page.id.clone(),
            title: page.title.clone(),
            path: codec.resolve_path(index, &page.id)?,
            requested: page.id == page_id,
        })
    };

    let siblings = index
        .list_children(record.parent_id.as_deref())
        .into_iter()
        .map(entry)
        .collect::<StorageResult<Vec<_>>>()?;
    let children = index
        .list_children(Some(page_id))
        .into_iter()
        .map(entry)
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(Navigation {
        space_key: index.space_key.clone(),
        breadcrumb,
        siblings,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn index() -> SpaceIndex {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(PageRecord::new("1", "Home", 1, None));
        index.upsert_page(PageRecord::new("2", "Guides", 1, Some("1".into())));
        index.upsert_page(PageRecord::new("3", "Reference", 1, Some("1".into())));
        index.upsert_page(PageRecord::new("4", "Install", 1, Some("2".into())));
        index.upsert_page(PageRecord::new("5", "Configure", 1, Some("2".into())));
        index
    }

    #[test]
    fn breadcrumb_siblings_and_children() {
        let codec = PathCodec::new(&StorageConfig::new("/m"));
        let nav = navigation(&codec, &index(), "2").unwrap();

        let crumbs: Vec<_> = nav.breadcrumb.iter().map(|c| (c.level, c.id.as_str())).collect();
        assert_eq!(crumbs, vec![(0, "1")]);
        assert_eq!(nav.breadcrumb[0].path, PathBuf::from("/m/DEV/1/Home.html"));

        let siblings: Vec<_> = nav
            .siblings
            .iter()
            .map(|s| (s.title.as_str(), s.requested))
            .collect();
        assert_eq!(siblings, vec![("Guides", true), ("Reference", false)]);

        let children: Vec<_> = nav.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(children, vec!["Configure", "Install"]);
    }

    #[test]
    fn root_page_has_no_breadcrumb() {
        let codec = PathCodec::new(&StorageConfig::new("/m"));
        let nav = navigation(&codec, &index(), "1").unwrap();
        assert!(nav.breadcrumb.is_empty());
        assert_eq!(nav.siblings.len(), 1);
        assert_eq!(nav.children.len(), 2);
    }

    #[test]
    fn unknown_page_is_an_error() {
        let codec = PathCodec::new(&StorageConfig::new("/m"));
        assert!(navigation(&codec, &index(), "404").is_err());
    }
}
