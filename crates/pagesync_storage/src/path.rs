//! Mapping between pages and filesystem paths.
//!
//! Layout of one space:
//!
//! ```text
//! <root>/<SPACE>/
//! ├─ _metadata.json
//! ├─ .lock
//! └─ <root page id>/
//!    ├─ <Root Title>.html
//!    ├─ attachments/
//!    └─ <child page id>/
//!       └─ <Child Title>.html
//! ```
//!
//! Directories are named by page id and never change while the page keeps its
//! parent. The leaf file is named from the sanitized title. Every path is a
//! pure function of the stored [`SpaceIndex`]; a rename or move only changes a
//! path once the index has been updated.

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::types::{PageRecord, SpaceIndex};
use std::path::{Path, PathBuf};

/// Extension of page content files.
pub const PAGE_EXTENSION: &str = "html";

/// Name of the per-page attachments folder.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Length of the id suffix used to disambiguate reserved file stems.
const DISAMBIGUATOR_LEN: usize = 8;

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Derives filesystem locations for pages of any space under one root.
#[derive(Debug, Clone)]
pub struct PathCodec {
    root: PathBuf,
    metadata_file: String,
    max_title_len: usize,
}

impl PathCodec {
    /// Creates a codec for the configured storage root.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            metadata_file: config.metadata_file.clone(),
            max_title_len: config.max_title_len,
        }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything for one space.
    pub fn space_dir(&self, space_key: &str) -> PathBuf {
        self.root.join(encode_segment(space_key))
    }

    /// Metadata index file of a space.
    pub fn metadata_path(&self, space_key: &str) -> PathBuf {
        self.space_dir(space_key).join(&self.metadata_file)
    }

    /// Directory of a page given its ancestor ids (root first).
    pub fn page_dir_for(&self, space_key: &str, ancestors: &[String], page_id: &str) -> PathBuf {
        let mut path = self.space_dir(space_key);
        for ancestor in ancestors {
            path.push(encode_segment(ancestor));
        }
        path.push(encode_segment(page_id));
        path
    }

    /// Leaf file name for a page: sanitized title, disambiguated when the
    /// stem collides with a reserved name.
    pub fn leaf_name(&self, title: &str, page_id: &str) -> String {
        let stem = sanitize_title(title, self.max_title_len);
        let stem = if is_reserved_stem(&stem) {
            let encoded = encode_segment(page_id);
            let start = encoded.len().saturating_sub(DISAMBIGUATOR_LEN);
            format!("{stem}-{}", &encoded[start..])
        } else {
            stem
        };
        format!("{stem}.{PAGE_EXTENSION}")
    }

    /// Directory of an indexed page.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Structural`] if the ancestry cannot be resolved.
    pub fn page_dir(&self, index: &SpaceIndex, page_id: &str) -> StorageResult<PathBuf> {
        let ancestors = index.ancestors_of(page_id)?;
        Ok(self.page_dir_for(&index.space_key, &ancestors, page_id))
    }

    /// Content file path of an indexed page.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Structural`] if the page is not indexed or its
    /// ancestry cannot be resolved.
    pub fn resolve_path(&self, index: &SpaceIndex, page_id: &str) -> StorageResult<PathBuf> {
        let record = index
            .page(page_id)
            .ok_or_else(|| StorageError::structural(page_id, "page is not indexed"))?;
        self.resolve_candidate(index, record)
    }

    /// Content file path `record` will have once it is upserted into `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Structural`] if the candidate's parent chain is
    /// not materialized or would form a cycle.
    pub fn resolve_candidate(&self, index: &SpaceIndex, record: &PageRecord) -> StorageResult<PathBuf> {
        let ancestors = index.ancestry(&record.id, record.parent_id.as_deref())?;
        Ok(self
            .page_dir_for(&index.space_key, &ancestors, &record.id)
            .join(self.leaf_name(&record.title, &record.id)))
    }

    /// Attachments folder of an indexed page.
    pub fn attachments_dir(&self, index: &SpaceIndex, page_id: &str) -> StorageResult<PathBuf> {
        Ok(self.page_dir(index, page_id)?.join(ATTACHMENTS_DIR))
    }
}

/// Sanitizes a page title into a portable file stem.
///
/// Accented Latin letters are folded to ASCII and other non-ASCII characters
/// dropped; path separators become dashes; characters rejected by common
/// filesystems are removed; whitespace and dash runs collapse; leading and
/// trailing spaces, dashes and dots are trimmed. Empty results become
/// `untitled`.
pub fn sanitize_title(title: &str, max_len: usize) -> String {
    let mut ascii = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii() {
            ascii.push(c);
        } else if let Some(folded) = fold_latin(c) {
            ascii.push_str(folded);
        }
    }

    let mut out = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        let mapped = match c {
            '/' | '\\' | ':' => Some('-'),
            '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_ascii_whitespace() => Some(' '),
            c if c.is_ascii_control() => None,
            c => Some(c),
        };
        let Some(c) = mapped else { continue };
        if (c == ' ' || c == '-') && out.ends_with(c) {
            continue;
        }
        out.push(c);
    }

    let trimmed = trim_stem(&out);
    let mut stem = trimmed.to_string();
    if stem.len() > max_len {
        stem.truncate(max_len);
        stem = trim_stem(&stem).to_string();
    }

    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}

fn trim_stem(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '-' || c == '.')
}

fn is_reserved_stem(stem: &str) -> bool {
    let lower = stem.to_ascii_lowercase();
    lower == ATTACHMENTS_DIR || lower.starts_with('_') || WINDOWS_DEVICE_NAMES.contains(&lower.as_str())
}

/// Encodes an opaque identifier as a single, reversible path segment.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte (and a
/// leading `.`) is written as `%XX`. Ids that would name a layout entry
/// (`attachments`, `_`-prefixed files such as the metadata index, Windows
/// device names) get their first byte escaped as well.
pub fn encode_segment(id: &str) -> String {
    let reserved = is_reserved_segment(id);
    let mut out = String::with_capacity(id.len());
    for (i, byte) in id.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || (byte == b'.' && i > 0);
        if plain && !(reserved && i == 0) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

fn is_reserved_segment(id: &str) -> bool {
    let lower = id.to_ascii_lowercase();
    let stem = lower.split_once('.').map_or(lower.as_str(), |(stem, _)| stem);
    lower == ATTACHMENTS_DIR || id.starts_with('_') || WINDOWS_DEVICE_NAMES.contains(&stem)
}

/// Reverses [`encode_segment`]. Returns `None` for malformed input.
pub fn decode_segment(segment: &str) -> Option<String> {
    if segment == "%" {
        return Some(String::new());
    }
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'Ç' => "C",
        'ç' => "c",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'Ñ' => "N",
        'ñ' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'Ý' => "Y",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        'Æ' => "AE",
        'æ' => "ae",
        'Œ' => "OE",
        'œ' => "oe",
        'Ł' => "L",
        'ł' => "l",
        'Đ' => "D",
        'đ' => "d",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PathCodec {
        PathCodec::new(&StorageConfig::new("/mirror"))
    }

    fn index() -> SpaceIndex {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(PageRecord::new("1", "Home", 1, None));
        index.upsert_page(PageRecord::new("2", "Guides", 1, Some("1".into())));
        index.upsert_page(PageRecord::new("3", "Setup: Linux/macOS", 1, Some("2".into())));
        index
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_title("Setup: Linux/macOS", 100), "Setup- Linux-macOS");
        assert_eq!(sanitize_title("a\\b", 100), "a-b");
    }

    #[test]
    fn sanitize_removes_forbidden_characters() {
        assert_eq!(sanitize_title("What? <Really> \"yes\" | *no*", 100), "What Really yes no");
    }

    #[test]
    fn sanitize_collapses_runs_and_trims() {
        assert_eq!(sanitize_title("  a\t\tb \n c  ", 100), "a b c");
        assert_eq!(sanitize_title("--a---b--", 100), "a-b");
        assert_eq!(sanitize_title("..hidden.", 100), "hidden");
    }

    #[test]
    fn sanitize_folds_accents() {
        assert_eq!(sanitize_title("Café Résumé", 100), "Cafe Resume");
        assert_eq!(sanitize_title("Straße 日本", 100), "Strasse");
    }

    #[test]
    fn sanitize_truncates_and_falls_back() {
        let long = "x".repeat(150);
        assert_eq!(sanitize_title(&long, 100).len(), 100);
        assert_eq!(sanitize_title("abc def", 4), "abc");
        assert_eq!(sanitize_title("???", 100), "untitled");
        assert_eq!(sanitize_title("日本語", 100), "untitled");
    }

    #[test]
    fn leaf_name_disambiguates_reserved_stems() {
        let codec = codec();
        assert_eq!(codec.leaf_name("Notes", "123"), "Notes.html");
        assert_eq!(codec.leaf_name("attachments", "123"), "attachments-123.html");
        assert_eq!(codec.leaf_name("CON", "1234567890"), "CON-34567890.html");
        assert_eq!(codec.leaf_name("_metadata", "9"), "_metadata-9.html");
    }

    #[test]
    fn leaf_name_is_deterministic() {
        let codec = codec();
        assert_eq!(codec.leaf_name("nul", "42"), codec.leaf_name("nul", "42"));
        assert_ne!(codec.leaf_name("nul", "42"), codec.leaf_name("nul", "43"));
    }

    #[test]
    fn resolve_path_nests_by_ancestor_ids() {
        let codec = codec();
        let index = index();

        assert_eq!(
            codec.resolve_path(&index, "1").unwrap(),
            PathBuf::from("/mirror/DEV/1/Home.html")
        );
        assert_eq!(
            codec.resolve_path(&index, "3").unwrap(),
            PathBuf::from("/mirror/DEV/1/2/3/Setup- Linux-macOS.html")
        );
        assert_eq!(
            codec.metadata_path("DEV"),
            PathBuf::from("/mirror/DEV/_metadata.json")
        );
        assert_eq!(
            codec.attachments_dir(&index, "2").unwrap(),
            PathBuf::from("/mirror/DEV/1/2/attachments")
        );
    }

    #[test]
    fn resolve_candidate_uses_new_parent() {
        let codec = codec();
        let index = index();

        let mut moved = index.page("3").unwrap().clone();
        moved.parent_id = Some("1".into());
        moved.title = "Setup".into();

        assert_eq!(
            codec.resolve_candidate(&index, &moved).unwrap(),
            PathBuf::from("/mirror/DEV/1/3/Setup.html")
        );
        // Stored metadata still decides the current path.
        assert_eq!(
            codec.resolve_path(&index, "3").unwrap(),
            PathBuf::from("/mirror/DEV/1/2/3/Setup- Linux-macOS.html")
        );
    }

    #[test]
    fn resolve_rejects_unmaterialized_parent() {
        let codec = codec();
        let index = index();
        let orphan = PageRecord::new("9", "Orphan", 1, Some("404".into()));
        assert!(codec.resolve_candidate(&index, &orphan).is_err());
        assert!(codec.resolve_path(&index, "9").is_err());
    }

    #[test]
    fn segments_round_trip() {
        for id in ["123", "a/b", "..", ".x", "%", "space key", "ü", ""] {
            let encoded = encode_segment(id);
            assert!(!encoded.contains('/'));
            assert!(!encoded.starts_with('.'));
            assert_eq!(decode_segment(&encoded).as_deref(), Some(id));
        }
        assert_ne!(encode_segment("a/b"), encode_segment("a_b"));
        assert_eq!(decode_segment("%zz"), None);
    }

    #[test]
    fn reserved_ids_do_not_collide_with_layout_entries() {
        assert_eq!(encode_segment("attachments"), "%61ttachments");
        assert_eq!(encode_segment("Attachments"), "%41ttachments");
        assert_eq!(encode_segment("_metadata.json"), "%5Fmetadata.json");
        assert_eq!(encode_segment("con"), "%63on");
        assert_eq!(encode_segment("nul.txt"), "%6Eul.txt");
        assert_eq!(encode_segment("console"), "console");
        for id in ["attachments", "_metadata.json", "COM1", "aux.x"] {
            assert_eq!(decode_segment(&encode_segment(id)).as_deref(), Some(id));
        }

        let codec = codec();
        let mut index = index();
        index.upsert_page(PageRecord::new("attachments", "Files", 1, Some("1".into())));
        assert_ne!(
            codec.page_dir(&index, "attachments").unwrap(),
            codec.attachments_dir(&index, "1").unwrap()
        );
        let mut root = SpaceIndex::new("DEV");
        root.upsert_page(PageRecord::new("_metadata.json", "Odd", 1, None));
        assert_ne!(
            codec.page_dir(&root, "_metadata.json").unwrap(),
            codec.metadata_path("DEV")
        );
    }
}
