use crate::error::Result;
use crate::scanner::{DOCUMENT_EXTENSION, META_FILE_NAME};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Watches a working copy and calls back once per burst of relevant changes.
/// Used as the refresh signal for trees that are edited in place rather than
/// fetched from a remote.
pub struct TreeWatcher {
    _watcher: RecommendedWatcher,
    /// Handle to the background thread debouncing events
    _thread: std::thread::JoinHandle<()>,
}

impl TreeWatcher {
    /// Start watching `root` recursively. `on_change` runs on the watcher's
    /// own thread after `debounce` has passed without further events.
    pub fn start<F>(root: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        // Event paths are reported under the watched path; resolve links so
        // the hidden-path check below is made relative to the real root.
        let root: PathBuf = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let thread = std::thread::spawn(move || {
            let mut pending = false;
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(debounce) {
                    Ok(Ok(event)) => {
                        let relevant = matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) && event.paths.iter().any(|p| is_relevant(&root, p));

                        if relevant {
                            pending = true;
                            last_event = Instant::now();
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("File watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if pending && last_event.elapsed() >= debounce {
                            pending = false;
                            log::debug!("Changes detected under {}", root.display());
                            on_change();
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // Watcher was dropped
                        break;
                    }
                }
            }
        });

        Ok(TreeWatcher {
            _watcher: watcher,
            _thread: thread,
        })
    }
}

/// A change matters if it touches a document, a metadata file or a directory
/// (directories may be added, renamed or removed), and nothing on its path
/// below `root` is hidden.
fn is_relevant(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let hidden = rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if hidden {
        return false;
    }

    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if file_name.eq_ignore_ascii_case(META_FILE_NAME) {
        return true;
    }
    match path.extension() {
        Some(ext) => ext.to_string_lossy().eq_ignore_ascii_case(DOCUMENT_EXTENSION),
        // No extension: most likely a directory
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    fn test_burst_of_writes_calls_back_once() {
        let tmp = tempfile::Builder::new().prefix("docshelf-watch").tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("guide")).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let debounce = Duration::from_millis(200);
        let _watcher = TreeWatcher::start(tmp.path(), debounce, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::fs::write(tmp.path().join("guide/one.md"), "# One").unwrap();
        std::fs::write(tmp.path().join("guide/two.md"), "# Two").unwrap();

        assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) > 0));
        // Nothing else changed, so no further callback arrives
        std::thread::sleep(debounce * 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_changes_under_hidden_directories_are_ignored() {
        let tmp = tempfile::Builder::new().prefix("docshelf-watch").tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let debounce = Duration::from_millis(100);
        let _watcher = TreeWatcher::start(tmp.path(), debounce, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::fs::write(tmp.path().join(".git/index.md"), "not a document").unwrap();
        std::thread::sleep(debounce * 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_relevant_paths() {
        let root = Path::new("/srv/docs");
        assert!(is_relevant(root, Path::new("/srv/docs/guide/intro.md")));
        assert!(is_relevant(root, Path::new("/srv/docs/guide/INTRO.MD")));
        assert!(is_relevant(root, Path::new("/srv/docs/guide/Meta.json")));
        assert!(is_relevant(root, Path::new("/srv/docs/new-section")));
    }

    #[test]
    fn test_irrelevant_paths() {
        let root = Path::new("/srv/docs");
        assert!(!is_relevant(root, Path::new("/srv/docs/.git/index")));
        assert!(!is_relevant(root, Path::new("/srv/docs/.git/refs/heads")));
        assert!(!is_relevant(root, Path::new("/srv/docs/guide/.intro.md.swp")));
        assert!(!is_relevant(root, Path::new("/srv/docs/guide/diagram.png")));
        assert!(!is_relevant(root, Path::new("/srv/docs/guide/other.json")));
    }

    #[test]
    fn test_hidden_root_is_not_held_against_children() {
        let root = Path::new("/home/me/.docs");
        assert!(is_relevant(root, Path::new("/home/me/.docs/guide/intro.md")));
    }
}
