use crate::hash::{CategoryId, DocumentId};
use crate::snapshot::{CategoryItem, CategoryTreeParent, Snapshot};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Holds the currently published snapshot.
///
/// Publishing is a single pointer swap and reading is a single pointer load,
/// so readers never wait on the sync pipeline and never see half of one
/// snapshot and half of another. A superseded snapshot is freed when the last
/// reader holding it lets go.
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    generation: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// A store serving the empty snapshot.
    pub fn new() -> Self {
        SnapshotStore {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            generation: AtomicU64::new(0),
        }
    }

    /// Install `snapshot` as the one every subsequent read observes.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        self.generation.fetch_add(1, Ordering::Release);
        snapshot
    }

    /// The published snapshot. Hold on to the returned `Arc` to answer several
    /// queries from the same snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn categories(&self) -> Vec<CategoryItem> {
        self.current.load().categories().to_vec()
    }

    pub fn category_tree(&self, id: &CategoryId) -> Vec<CategoryTreeParent> {
        self.current.load().category_tree(id).to_vec()
    }

    pub fn content(&self, id: &DocumentId) -> Arc<str> {
        self.current
            .load()
            .contents()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }

    /// A copy of every rendered document, detached from the published snapshot.
    pub fn all_content(&self) -> HashMap<DocumentId, Arc<str>> {
        self.current.load().contents().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CategoryTreeItem;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::thread;

    /// A snapshot whose every field carries the same tag.
    fn tagged(tag: u64) -> Snapshot {
        let name = format!("gen-{tag}");
        let doc = DocumentId::from_raw(tag);
        let category = CategoryId::of_name(&name);
        Snapshot::from_parts(
            HashMap::from([(doc, Arc::from(name.as_str()))]),
            vec![CategoryItem {
                id: category,
                name: name.clone(),
            }],
            HashMap::from([(
                category,
                vec![CategoryTreeParent {
                    title: name.clone(),
                    files: vec![CategoryTreeItem {
                        id: doc,
                        file: name.clone(),
                    }],
                }],
            )]),
            HashSet::new(),
        )
    }

    #[test]
    fn test_empty_before_first_publish() {
        let store = SnapshotStore::new();
        assert!(store.current().is_empty());
        assert_eq!(store.generation(), 0);
        assert!(store.categories().is_empty());
        assert!(store.category_tree(&CategoryId::from_raw(7)).is_empty());
        assert_eq!(store.content(&DocumentId::from_raw(7)).as_ref(), "");
        assert!(store.all_content().is_empty());
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = SnapshotStore::new();
        store.publish(tagged(1));
        let first = store.current();

        store.publish(tagged(2));
        assert_eq!(store.generation(), 2);
        assert_eq!(store.categories()[0].name, "gen-2");
        assert_eq!(store.content(&DocumentId::from_raw(2)).as_ref(), "gen-2");
        assert_eq!(store.content(&DocumentId::from_raw(1)).as_ref(), "");

        // A reader holding the old snapshot keeps seeing it unchanged
        assert_eq!(first.categories()[0].name, "gen-1");
    }

    #[test]
    fn test_all_content_is_a_copy() {
        let store = SnapshotStore::new();
        store.publish(tagged(1));

        let mut copy = store.all_content();
        copy.insert(DocumentId::from_raw(99), Arc::from("injected"));
        copy.remove(&DocumentId::from_raw(1));

        assert_eq!(store.content(&DocumentId::from_raw(1)).as_ref(), "gen-1");
        assert_eq!(store.content(&DocumentId::from_raw(99)).as_ref(), "");
    }

    #[test]
    fn test_readers_never_see_mixed_snapshots() {
        let store = Arc::new(SnapshotStore::new());
        store.publish(tagged(0));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = store.current();
                        let name = &snapshot.categories()[0].name;
                        let category = snapshot.categories()[0].id;
                        let parents = snapshot.category_tree(&category);
                        assert_eq!(&parents[0].title, name);
                        let doc = parents[0].files[0].id;
                        assert_eq!(snapshot.content(&doc), name);
                    }
                })
            })
            .collect();

        for tag in 1..=500 {
            store.publish(tagged(tag));
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.generation(), 501);
    }
}
