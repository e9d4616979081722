//! In-memory store of loaded capture files.
//!
//! The store holds a copy-on-write map from file key to parsed file. Writers
//! replace the map under a short lock; readers clone the current `Arc` and
//! keep a consistent view for as long as they need it, unaffected by later
//! writes.

use crate::har::{HarEntry, HarFile};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type FileMap = BTreeMap<String, Arc<HarFile>>;

/// Normalize a capture file name into its store key.
pub fn file_key(name: &str) -> String {
    name.to_lowercase()
}

/// Concurrent mapping of file key to parsed capture file.
#[derive(Default)]
pub struct TraceStore {
    files: RwLock<Arc<FileMap>>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `file` as the current value for `key`, replacing any previous file wholesale.
    /// Returns whether a previous file was replaced.
    pub fn upsert(&self, key: &str, file: HarFile) -> bool {
        let file = Arc::new(file);
        let mut files = self.files.write();
        // Clones the map only if a reader still holds the previous snapshot
        Arc::make_mut(&mut *files)
            .insert(file_key(key), file)
            .is_some()
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> bool {
        let key = file_key(key);
        let mut files = self.files.write();
        if !files.contains_key(&key) {
            return false;
        }
        Arc::make_mut(&mut *files).remove(&key).is_some()
    }

    /// Drop every loaded file.
    pub fn clear(&self) {
        *self.files.write() = Arc::new(FileMap::new());
    }

    /// Consistent view of all loaded files as of this call.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            files: Arc::clone(&*self.files.read()),
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Loaded file keys in resolution order.
    pub fn keys(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }
}

/// Immutable view of the store used for one resolution pass.
#[derive(Clone, Default)]
pub struct Snapshot {
    files: Arc<FileMap>,
}

impl Snapshot {
    /// Files in ascending key order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &HarFile)> {
        self.files.iter().map(|(key, file)| (key.as_str(), file.as_ref()))
    }

    /// All entries of all files, lazily concatenated in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &HarEntry)> {
        self.files()
            .flat_map(|(key, file)| file.log.entries.iter().map(move |entry| (key, entry)))
    }

    pub fn get(&self, key: &str) -> Option<&HarFile> {
        self.files.get(&file_key(key)).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::har::parse_har;
    use std::thread;

    fn har_with_paths(paths: &[&str]) -> HarFile {
        let entries: Vec<String> = paths
            .iter()
            .map(|p| format!(r#"{{ "request": {{ "url": "http://api.test{p}" }}, "response": {{ "status": 200 }} }}"#))
            .collect();
        let raw = format!(r#"{{ "log": {{ "entries": [{}] }} }}"#, entries.join(","));
        parse_har(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_upsert_normalizes_key() {
        let store = TraceStore::new();
        store.upsert("Session.HAR", har_with_paths(&["/a"]));
        assert_eq!(store.keys(), vec!["session.har".to_string()]);
        assert!(store.snapshot().get("SESSION.har").is_some());
    }

    #[test]
    fn test_upsert_replaces_wholesale() {
        let store = TraceStore::new();
        assert!(!store.upsert("a.har", har_with_paths(&["/one", "/two"])));
        assert!(store.upsert("A.har", har_with_paths(&["/three"])));

        let snapshot = store.snapshot();
        let paths: Vec<_> = snapshot
            .entries()
            .filter_map(|(_, e)| e.match_path())
            .collect();
        assert_eq!(paths, vec!["/three"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let store = TraceStore::new();
        assert!(!store.remove("missing.har"));
        store.upsert("present.har", har_with_paths(&["/x"]));
        assert!(store.remove("PRESENT.har"));
        assert!(store.is_empty());
        assert!(!store.remove("present.har"));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = TraceStore::new();
        store.upsert("a.har", har_with_paths(&["/old"]));
        let before = store.snapshot();

        store.upsert("a.har", har_with_paths(&["/new"]));
        store.upsert("b.har", har_with_paths(&["/b"]));
        store.remove("a.har");

        assert_eq!(before.len(), 1);
        let paths: Vec<_> = before.entries().filter_map(|(_, e)| e.match_path()).collect();
        assert_eq!(paths, vec!["/old"]);

        let after = store.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.get("b.har").is_some());
    }

    #[test]
    fn test_entries_follow_key_order() {
        let store = TraceStore::new();
        store.upsert("zeta.har", har_with_paths(&["/z"]));
        store.upsert("alpha.har", har_with_paths(&["/a1", "/a2"]));
        store.upsert("Mid.har", har_with_paths(&["/m"]));

        let snapshot = store.snapshot();
        let order: Vec<_> = snapshot
            .entries()
            .map(|(key, e)| (key, e.match_path().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alpha.har", "/a1"),
                ("alpha.har", "/a2"),
                ("mid.har", "/m"),
                ("zeta.har", "/z"),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let store = TraceStore::new();
        store.upsert("a.har", har_with_paths(&["/a"]));
        store.upsert("b.har", har_with_paths(&["/b"]));
        store.clear();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_readers_never_observe_partial_files() {
        let store = Arc::new(TraceStore::new());
        let old = ["/old/1", "/old/2", "/old/3"];
        let new = ["/new/1", "/new/2", "/new/3", "/new/4"];
        store.upsert("swap.har", har_with_paths(&old));

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500 {
                    let paths: &[&str] = if i % 2 == 0 { &new } else { &old };
                    store.upsert("swap.har", har_with_paths(paths));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.snapshot();
                        let paths: Vec<_> = snapshot
                            .entries()
                            .filter_map(|(_, e)| e.match_path())
                            .collect();
                        let all_old = paths.len() == 3 && paths.iter().all(|p| p.starts_with("/old"));
                        let all_new = paths.len() == 4 && paths.iter().all(|p| p.starts_with("/new"));
                        assert!(all_old || all_new, "mixed view: {paths:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
