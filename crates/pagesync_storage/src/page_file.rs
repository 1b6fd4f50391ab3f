//! Page content files with an embedded metadata header.
//!
//! ## File Format
//!
//! ```text
//! <!--
//!   Page ID: 123
//!   Title: Getting Started
//!   Space: DEV
//!   Version: 4
//!   URL: https://wiki.example.com/spaces/DEV/pages/123
//!   Synced: 1718000000000
//! -->
//! <body...>
//! ```
//!
//! Writes go through a temporary file in the destination directory that is
//! renamed into place, so readers see either the old or the new file.

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::path::PAGE_EXTENSION;
use crate::types::Timestamp;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_OPEN: &str = "<!--\n";
const HEADER_CLOSE: &str = "-->";

/// Metadata embedded at the top of every page file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    /// Remote page id.
    pub page_id: String,
    /// Page title at sync time.
    pub title: String,
    /// Owning space key.
    pub space_key: String,
    /// Remote version at sync time.
    pub version: u64,
    /// Canonical remote URL.
    pub url: String,
    /// When the file was written.
    pub synced_at: Timestamp,
}

impl PageHeader {
    /// Renders the header block, including the trailing newline.
    pub fn render(&self) -> String {
        format!(
            "<!--\n  Page ID: {}\n  Title: {}\n  Space: {}\n  Version: {}\n  URL: {}\n  Synced: {}\n-->\n",
            header_value(&self.page_id),
            header_value(&self.title),
            header_value(&self.space_key),
            self.version,
            header_value(&self.url),
            self.synced_at,
        )
    }

    /// Splits a page file into its header and body.
    ///
    /// Returns a description of the problem if the header is missing or
    /// unparseable.
    pub fn parse(text: &str) -> Result<(PageHeader, &str), String> {
        let rest = text
            .strip_prefix(HEADER_OPEN)
            .ok_or_else(|| "file does not start with a header block".to_string())?;
        let end = rest
            .find(HEADER_CLOSE)
            .ok_or_else(|| "header block is not terminated".to_string())?;
        let block = &rest[..end];
        let after = &rest[end + HEADER_CLOSE.len()..];
        let body = after.strip_prefix('\n').unwrap_or(after);

        let mut page_id = None;
        let mut title = None;
        let mut space_key = None;
        let mut version = None;
        let mut url = None;
        let mut synced_at = None;

        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| format!("malformed header line: {line}"))?;
            let value = value.trim().to_string();
            match key.trim() {
                "Page ID" => page_id = Some(value),
                "Title" => title = Some(value),
                "Space" => space_key = Some(value),
                "Version" => {
                    version = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| format!("invalid version: {value}"))?,
                    )
                }
                "URL" => url = Some(value),
                "Synced" => {
                    synced_at = Some(Timestamp(
                        value
                            .parse::<u64>()
                            .map_err(|_| format!("invalid sync timestamp: {value}"))?,
                    ))
                }
                _ => {}
            }
        }

        let header = PageHeader {
            page_id: page_id
                .filter(|id| !id.is_empty())
                .ok_or("missing Page ID")?,
            title: title.ok_or("missing Title")?,
            space_key: space_key.ok_or("missing Space")?,
            version: version.ok_or("missing Version")?,
            url: url.unwrap_or_default(),
            synced_at: synced_at.ok_or("missing Synced")?,
        };
        Ok((header, body))
    }
}

fn header_value(value: &str) -> String {
    value
        .replace(['\r', '\n'], " ")
        .replace(HEADER_CLOSE, "--&gt;")
}

/// A page file read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    /// The parsed header.
    pub header: PageHeader,
    /// The page body.
    pub content: String,
}

/// Returns the SHA-256 hex digest of a page body.
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Reads and writes page files.
#[derive(Debug, Clone)]
pub struct PageFileStore {
    sync_on_write: bool,
}

impl PageFileStore {
    /// Creates a file store.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            sync_on_write: config.sync_on_write,
        }
    }

    /// Writes `header` followed by `content` to `path`, atomically.
    ///
    /// Parent directories are created as needed. The temporary file is
    /// removed if any step fails.
    pub fn write(&self, path: &Path, content: &str, header: &PageHeader) -> StorageResult<()> {
        let mut data = header.render();
        data.push_str(content);
        self.write_atomic(path, data.as_bytes())
    }

    /// Reads a page file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CorruptHeader`] if the header is missing or
    /// unparseable.
    pub fn read(&self, path: &Path) -> StorageResult<PageFile> {
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| StorageError::corrupt_header(path, "file is not valid UTF-8"))?;
        let (header, body) =
            PageHeader::parse(&text).map_err(|reason| StorageError::corrupt_header(path, reason))?;
        Ok(PageFile {
            header,
            content: body.to_string(),
        })
    }

    /// Removes a file. Returns false if it did not exist.
    pub fn remove(&self, path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed page file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a file. Returns false if `from` did not exist.
    pub fn rename(&self, from: &Path, to: &Path) -> StorageResult<bool> {
        match fs::rename(from, to) {
            Ok(()) => {
                debug!(from = %from.display(), to = %to.display(), "renamed page file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes attachment bytes into `dir`, atomically. The file name is
    /// reduced to its final component.
    pub fn write_attachment(&self, dir: &Path, filename: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'))
            .ok_or_else(|| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid attachment file name: {filename}"),
                ))
            })?;
        let path = dir.join(name);
        self.write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Lists the page files (`*.html`) directly inside `dir`.
    pub fn leaf_files(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == PAGE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Removes `start` and then each parent while they are empty, stopping
    /// before `stop_at`. Returns the number of directories removed.
    pub fn prune_empty_dirs(&self, start: &Path, stop_at: &Path) -> StorageResult<usize> {
        let mut removed = 0;
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir == stop_at || !dir.starts_with(stop_at) || !dir.is_dir() {
                break;
            }
            if fs::read_dir(dir)?.next().is_some() {
                break;
            }
            fs::remove_dir(dir)?;
            debug!(dir = %dir.display(), "pruned empty directory");
            removed += 1;
            current = dir.parent();
        }
        Ok(removed)
    }

    /// Moves every entry of `from` except `skip` into `to`, merging
    /// directories that already exist there. On a file collision the copy
    /// already in `to` wins. Returns the number of entries moved.
    pub fn move_dir_contents(&self, from: &Path, to: &Path, skip: &Path) -> StorageResult<usize> {
        if !from.is_dir() {
            return Ok(0);
        }
        fs::create_dir_all(to)?;
        let mut moved = 0;
        for entry in fs::read_dir(from)? {
            let path = entry?.path();
            if path == skip {
                continue;
            }
            let Some(name) = path.file_name() else { continue };
            merge_move(&path, &to.join(name))?;
            moved += 1;
        }
        Ok(moved)
    }

    pub(crate) fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let dir = path.parent().ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path has no parent directory: {}", path.display()),
            ))
        })?;
        fs::create_dir_all(dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(".part")
            .tempfile_in(dir)?;
        temp.write_all(data)?;
        temp.flush()?;
        if self.sync_on_write {
            temp.as_file().sync_all()?;
        }
        temp.persist(path).map_err(|e| StorageError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        if self.sync_on_write {
            sync_directory(dir)?;
        }
        Ok(())
    }
}

fn merge_move(src: &Path, dst: &Path) -> StorageResult<()> {
    if !dst.exists() {
        fs::rename(src, dst)?;
        return Ok(());
    }
    if src.is_dir() && dst.is_dir() {
        for entry in fs::read_dir(src)? {
            let path = entry?.path();
            if let Some(name) = path.file_name() {
                merge_move(&path, &dst.join(name))?;
            }
        }
        fs::remove_dir(src)?;
    } else if src.is_dir() {
        fs::remove_dir_all(src)?;
    } else {
        fs::remove_file(src)?;
    }
    Ok(())
}

/// Fsyncs a directory so a rename inside it is durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> StorageResult<()> {
    Ok(())
}
