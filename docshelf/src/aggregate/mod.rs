//! Turns scanned directories into a publishable [`Snapshot`].
//!
//! Rendering is the expensive step, so it only happens for document IDs that
//! the previous snapshot does not already hold. Because IDs are fingerprints
//! of content, a document that was moved, renamed or recategorised keeps its
//! rendered text without being read again.

use crate::error::{DocShelfError, Result};
use crate::hash::{CategoryId, DocumentId};
use crate::render::Renderer;
use crate::scanner::{DirectoryRecord, DocumentRecord};
use crate::snapshot::{CategoryItem, CategoryTreeItem, CategoryTreeParent, Snapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Category assigned to directories that do not name one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A document that could not be read or rendered. It is published with empty
/// content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub path: PathBuf,
    pub id: DocumentId,
    pub error: String,
    /// The bytes behind `id` were never rendered (the file could not be read
    /// or no longer matched its fingerprint), so the next build tries again.
    /// A renderer error is final for those bytes and is cached like any output.
    pub retry: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub directories: usize,
    /// Tree entries, counting a document once per place it appears
    pub documents: usize,
    /// Renderer calls, whether or not they succeeded
    pub rendered: usize,
    pub reused: usize,
    pub failures: Vec<RenderFailure>,
}

#[derive(Debug)]
pub struct Build {
    pub snapshot: Snapshot,
    pub report: BuildReport,
}

/// Read the bytes a scanned document was fingerprinted from.
fn read_scanned(doc: &DocumentRecord) -> Result<Vec<u8>> {
    let bytes = std::fs::read(&doc.path)?;
    // The file may have been rewritten after it was scanned; caching the new
    // text under the old ID would serve it for the wrong content.
    if DocumentId::of(&bytes) != doc.id {
        return Err(DocShelfError::Other(format!(
            "{} changed after it was scanned",
            doc.path.display()
        )));
    }
    Ok(bytes)
}

/// Build a snapshot from `directories`, reusing rendered text from `previous`
/// wherever the document ID matches.
pub fn build(
    directories: &[DirectoryRecord],
    previous: &HashMap<DocumentId, Arc<str>>,
    renderer: &dyn Renderer,
) -> Build {
    let mut contents: HashMap<DocumentId, Arc<str>> = HashMap::new();
    let mut failed: HashSet<DocumentId> = HashSet::new();
    let mut buckets: BTreeMap<&str, Vec<CategoryTreeParent>> = BTreeMap::new();
    let mut report = BuildReport {
        directories: directories.len(),
        ..BuildReport::default()
    };

    for dir in directories {
        let mut parent = CategoryTreeParent {
            title: dir.title.clone(),
            files: Vec::with_capacity(dir.files.len()),
        };

        for doc in &dir.files {
            report.documents += 1;
            parent.files.push(CategoryTreeItem {
                id: doc.id,
                file: doc.name.clone(),
            });

            if contents.contains_key(&doc.id) {
                continue;
            }
            if let Some(rendered) = previous.get(&doc.id) {
                report.reused += 1;
                contents.insert(doc.id, Arc::clone(rendered));
                continue;
            }

            let (html, failure) = match read_scanned(doc) {
                Ok(bytes) => {
                    report.rendered += 1;
                    match renderer.render(&bytes) {
                        Ok(html) => (html, None),
                        Err(e) => (String::new(), Some((e, false))),
                    }
                }
                Err(e) => (String::new(), Some((e, true))),
            };
            if let Some((e, retry)) = failure {
                if retry {
                    failed.insert(doc.id);
                }
                report.failures.push(RenderFailure {
                    path: doc.path.clone(),
                    id: doc.id,
                    error: e.to_string(),
                    retry,
                });
            }
            contents.insert(doc.id, Arc::from(html));
        }

        let category = if dir.category.is_empty() {
            UNCATEGORIZED
        } else {
            dir.category.as_str()
        };
        buckets.entry(category).or_default().push(parent);
    }

    let mut categories = Vec::with_capacity(buckets.len());
    let mut category_tree = HashMap::with_capacity(buckets.len());
    for (name, mut parents) in buckets {
        let id = CategoryId::of_name(name);
        parents.sort_by(|a, b| a.title.cmp(&b.title));
        categories.push(CategoryItem {
            id,
            name: name.to_string(),
        });
        category_tree.insert(id, parents);
    }

    Build {
        snapshot: Snapshot::from_parts(contents, categories, category_tree, failed),
        report,
    }
}
