//! Walks a working copy and produces one ordered record per document directory.
//!
//! The supported layout is two levels deep: the root holds directories, each
//! directory holds Markdown documents and an optional `meta.json`. Anything
//! that cannot be read is logged and skipped so that one bad file never costs
//! the rest of the tree.

use crate::error::{DocShelfError, Result};
use crate::hash::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-directory metadata file, matched case-insensitively.
pub const META_FILE_NAME: &str = "meta.json";

/// Extension of the documents that get published, matched case-insensitively.
pub const DOCUMENT_EXTENSION: &str = "md";

/// A document found during a scan. Lives for one sync pass only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    /// File name without its extension
    pub name: String,
    pub path: PathBuf,
    pub id: DocumentId,
}

/// Contents of a directory's `meta.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryMeta {
    pub title: String,
    pub category: String,
    /// Document base names to list first, in this order
    pub order: Vec<String>,
}

impl DirectoryMeta {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A scanned directory with its documents in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryRecord {
    pub name: String,
    pub title: String,
    pub category: String,
    pub files: Vec<DocumentRecord>,
}

enum EntryKind {
    Document(String),
    Meta,
    Other,
}

fn classify(path: &Path) -> EntryKind {
    let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
        return EntryKind::Other;
    };
    if file_name.eq_ignore_ascii_case(META_FILE_NAME) {
        return EntryKind::Meta;
    }
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION) => path
            .file_stem()
            .and_then(OsStr::to_str)
            .map(|stem| EntryKind::Document(stem.to_string()))
            .unwrap_or(EntryKind::Other),
        _ => EntryKind::Other,
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn list_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let read = fs::read_dir(dir).map_err(|source| DocShelfError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries: Vec<fs::DirEntry> = read
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .collect();
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

/// Scan every non-hidden directory directly under `root`.
///
/// Only a failure to list `root` itself is returned as an error. Directories
/// that cannot be listed or that contain no documents are left out of the
/// result, which is ordered by directory name.
pub fn scan(root: &Path) -> Result<Vec<DirectoryRecord>> {
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let entries = list_entries(&root)?;

    let mut records = Vec::new();
    for entry in entries {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir || is_hidden(&entry.file_name()) {
            continue;
        }

        let path = entry.path();
        match scan_directory(&path) {
            Ok(record) if record.files.is_empty() => {
                log::debug!("No documents in {}, leaving it out", path.display());
            }
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping directory {}: {e}", path.display()),
        }
    }

    Ok(records)
}

/// Scan the immediate files of one directory.
pub fn scan_directory(dir: &Path) -> Result<DirectoryRecord> {
    let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let entries = list_entries(&dir)?;

    let mut documents: BTreeMap<String, DocumentRecord> = BTreeMap::new();
    let mut meta: Option<DirectoryMeta> = None;

    for entry in entries {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }

        let path = entry.path();
        match classify(&path) {
            EntryKind::Document(name) => {
                match DocumentId::of_file(&path) {
                    Ok(id) => {
                        // Entries come in name order; a later one with the same base name wins
                        let record = DocumentRecord { name: name.clone(), path, id };
                        if let Some(replaced) = documents.insert(name, record) {
                            log::warn!(
                                "{} is shadowed by a later document with the same base name",
                                replaced.path.display()
                            );
                        }
                    }
                    Err(e) => log::warn!("Failed to fingerprint {}: {e}", path.display()),
                }
            }
            EntryKind::Meta => match DirectoryMeta::read(&path) {
                Ok(parsed) => meta = Some(parsed),
                Err(e) => log::warn!("Ignoring malformed {}: {e}", path.display()),
            },
            EntryKind::Other => {}
        }
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meta = meta.unwrap_or_default();
    let title = if meta.title.is_empty() {
        name.clone()
    } else {
        meta.title
    };

    Ok(DirectoryRecord {
        name,
        title,
        category: meta.category,
        files: order_documents(documents, &meta.order),
    })
}

/// Put the documents named in `order` first, in that order, then the rest by
/// base name. Names in `order` that match no document are skipped.
pub fn order_documents(
    mut documents: BTreeMap<String, DocumentRecord>,
    order: &[String],
) -> Vec<DocumentRecord> {
    let mut files = Vec::with_capacity(documents.len());
    for name in order {
        if let Some(doc) = documents.remove(name) {
            files.push(doc);
        }
    }
    files.extend(documents.into_values());
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(record: &DirectoryRecord) -> Vec<&str> {
        record.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_meta_order_then_alphabetical() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "guide/a.md", "# A");
        write(tmp.path(), "guide/c.md", "# C");
        write(tmp.path(), "guide/b.md", "# B");
        write(tmp.path(), "guide/meta.json", r#"{"order": ["b", "a"]}"#);

        let record = scan_directory(&tmp.path().join("guide")).unwrap();
        assert_eq!(names(&record), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_order_skips_unknown_and_repeated_names() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "guide/intro.md", "intro");
        write(tmp.path(), "guide/setup.md", "setup");
        write(tmp.path(), "guide/faq.md", "faq");
        write(
            tmp.path(),
            "guide/meta.json",
            r#"{"order": ["missing", "setup", "setup", "intro"]}"#,
        );

        let record = scan_directory(&tmp.path().join("guide")).unwrap();
        assert_eq!(names(&record), vec!["setup", "intro", "faq"]);
    }

    #[test]
    fn test_defaults_without_meta() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "notes/one.md", "1");

        let record = scan_directory(&tmp.path().join("notes")).unwrap();
        assert_eq!(record.name, "notes");
        assert_eq!(record.title, "notes");
        assert_eq!(record.category, "");
    }

    #[test]
    fn test_meta_overrides_title_and_category() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "notes/one.md", "1");
        write(
            tmp.path(),
            "notes/META.JSON",
            r#"{"title": "Field Notes", "category": "Guides"}"#,
        );

        let record = scan_directory(&tmp.path().join("notes")).unwrap();
        assert_eq!(record.title, "Field Notes");
        assert_eq!(record.category, "Guides");
    }

    #[test]
    fn test_malformed_meta_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "notes/b.md", "b");
        write(tmp.path(), "notes/a.md", "a");
        write(tmp.path(), "notes/meta.json", "{ not json");

        let record = scan_directory(&tmp.path().join("notes")).unwrap();
        assert_eq!(record.title, "notes");
        assert_eq!(record.category, "");
        assert_eq!(names(&record), vec!["a", "b"]);
    }

    #[test]
    fn test_only_markdown_is_recorded() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "mixed/page.md", "page");
        write(tmp.path(), "mixed/LOUD.MD", "loud");
        write(tmp.path(), "mixed/image.png", "png");
        write(tmp.path(), "mixed/other.json", "{}");
        write(tmp.path(), "mixed/nested/deep.md", "too deep");

        let record = scan_directory(&tmp.path().join("mixed")).unwrap();
        assert_eq!(names(&record), vec!["LOUD", "page"]);
    }

    #[test]
    fn test_document_id_comes_from_content() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "one/first.md", "same bytes");
        write(tmp.path(), "two/renamed.md", "same bytes");

        let dirs = scan(tmp.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].files[0].id, dirs[1].files[0].id);
        assert_eq!(dirs[0].files[0].id, DocumentId::of(b"same bytes"));
        assert!(dirs[0].files[0].path.is_absolute());
    }

    #[test]
    fn test_scan_skips_hidden_and_empty_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), ".git/HEAD.md", "hidden");
        write(tmp.path(), "empty/readme.txt", "no markdown here");
        write(tmp.path(), "b-docs/x.md", "x");
        write(tmp.path(), "a-docs/y.md", "y");
        write(tmp.path(), "top-level.md", "files at the root are ignored");

        let dirs = scan(tmp.path()).unwrap();
        let dir_names: Vec<&str> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dir_names, vec!["a-docs", "b-docs"]);
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = scan(&tmp.path().join("does-not-exist")).unwrap_err();
        assert!(matches!(err, DocShelfError::Scan { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_document_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "guide/good.md", "fine");
        std::os::unix::fs::symlink(
            tmp.path().join("nowhere.md"),
            tmp.path().join("guide/broken.md"),
        )
        .unwrap();

        let dirs = scan(tmp.path()).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(names(&dirs[0]), vec!["good"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_duplicate_base_name_keeps_last_in_name_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "dup/a.md", "lower");
        write(tmp.path(), "dup/a.MD", "upper");

        // "a.MD" sorts before "a.md"
        let record = scan_directory(&tmp.path().join("dup")).unwrap();
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].id, DocumentId::of(b"lower"));
        assert!(record.files[0].path.ends_with("a.md"));
    }
}
