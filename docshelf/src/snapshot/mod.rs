// Published data model: what readers see after a sync

use crate::hash::{CategoryId, DocumentId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryItem {
    pub id: CategoryId,
    pub name: String,
}

/// One document entry under a directory in the navigation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTreeItem {
    pub id: DocumentId,
    /// Display name: the document's file name without extension
    pub file: String,
}

/// One scanned directory in the navigation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTreeParent {
    pub title: String,
    pub files: Vec<CategoryTreeItem>,
}

/// A complete, immutable view of the published tree.
///
/// Built once per sync and never modified afterwards. Every document reachable
/// from the category tree has an entry in the contents, even when rendering
/// it failed (the entry is then empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    contents: HashMap<DocumentId, Arc<str>>,
    categories: Vec<CategoryItem>,
    category_tree: HashMap<CategoryId, Vec<CategoryTreeParent>>,
    failed: HashSet<DocumentId>,
}

impl Snapshot {
    /// The snapshot served before anything has been published.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        contents: HashMap<DocumentId, Arc<str>>,
        categories: Vec<CategoryItem>,
        category_tree: HashMap<CategoryId, Vec<CategoryTreeParent>>,
        failed: HashSet<DocumentId>,
    ) -> Self {
        Snapshot {
            contents,
            categories,
            category_tree,
            failed,
        }
    }

    pub fn contents(&self) -> &HashMap<DocumentId, Arc<str>> {
        &self.contents
    }

    /// Rendered text of a document, or `""` if the ID is unknown.
    pub fn content(&self, id: &DocumentId) -> &str {
        self.contents.get(id).map(|c| c.as_ref()).unwrap_or("")
    }

    /// Categories ordered by name.
    pub fn categories(&self) -> &[CategoryItem] {
        &self.categories
    }

    /// Directories of a category ordered by title, or an empty slice if the
    /// ID is unknown.
    pub fn category_tree(&self, id: &CategoryId) -> &[CategoryTreeParent] {
        self.category_tree.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tree(&self) -> &HashMap<CategoryId, Vec<CategoryTreeParent>> {
        &self.category_tree
    }

    /// Documents that could not be read for rendering in the build that
    /// produced this snapshot.
    pub fn failed(&self) -> &HashSet<DocumentId> {
        &self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.contents.is_empty()
    }

    /// Rendered contents the next build may reuse. Documents that were never
    /// read are left out so they get another attempt.
    pub fn reuse_cache(&self) -> HashMap<DocumentId, Arc<str>> {
        self.contents
            .iter()
            .filter(|(id, _)| !self.failed.contains(*id))
            .map(|(id, content)| (*id, Arc::clone(content)))
            .collect()
    }
}
