//! Directory watching and live result cursors.
//!
//! One filesystem watcher exists per distinct watched path, shared by
//! every open cursor on that path. The registry reference-counts
//! subscribers: the watcher is created on the 0→1 transition and torn
//! down on 1→0. Event delivery and cursor close synchronize on the
//! same registry mutex, so an event can never reach a torn-down cursor
//! list.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use notify::{RecursiveMode, Watcher};

use crate::source::ChangeNotifier;
use crate::types::DocumentRow;

/// Identifies one cursor's subscription within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CursorId(u64);

/// Change-callback invoked when the watched directory mutates.
type InvalidationCallback = Box<dyn Fn() + Send + Sync>;

/// Shared state between a cursor and the registry.
struct CursorState {
    changed: AtomicBool,
    callback: Mutex<Option<InvalidationCallback>>,
}

impl CursorState {
    fn mark_changed(&self) {
        self.changed.store(true, Ordering::SeqCst);
        let callback = self.callback.lock().expect("cursor callback poisoned");
        if let Some(callback) = callback.as_ref() {
            callback();
        }
    }
}

struct WatchEntry {
    // Kept alive by ownership; dropping it stops the watch.
    _watcher: notify::RecommendedWatcher,
    notify_uri: String,
    subscribers: Vec<(CursorId, Arc<CursorState>)>,
}

struct RegistryInner {
    notifier: Arc<dyn ChangeNotifier>,
    watches: Mutex<HashMap<PathBuf, WatchEntry>>,
    next_cursor: AtomicU64,
}

/// Registry of per-path directory watchers.
///
/// Cheap to clone; clones share the same watcher table.
#[derive(Clone)]
pub struct WatcherRegistry {
    inner: Arc<RegistryInner>,
}

impl WatcherRegistry {
    /// Create a registry delivering URI broadcasts to `notifier`.
    pub fn new(notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                notifier,
                watches: Mutex::new(HashMap::new()),
                next_cursor: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live directory watches. One per distinct watched path.
    pub fn active_watch_count(&self) -> usize {
        self.inner.watches.lock().expect("watch registry poisoned").len()
    }

    fn subscribe(&self, path: &Path, notify_uri: &str, state: Arc<CursorState>) -> CursorId {
        let id = CursorId(self.inner.next_cursor.fetch_add(1, Ordering::Relaxed));
        let mut watches = self.inner.watches.lock().expect("watch registry poisoned");
        if let Some(entry) = watches.get_mut(path) {
            entry.subscribers.push((id, state));
            return id;
        }

        match self.spawn_watcher(path) {
            Ok(watcher) => {
                watches.insert(
                    path.to_path_buf(),
                    WatchEntry {
                        _watcher: watcher,
                        notify_uri: notify_uri.to_string(),
                        subscribers: vec![(id, state)],
                    },
                );
            }
            Err(e) => {
                // The cursor still works, it just won't see live changes.
                tracing::warn!(path = %path.display(), error = %e, "failed to start directory watch");
            }
        }
        id
    }

    fn unsubscribe(&self, path: &Path, id: CursorId) {
        let removed = {
            let mut watches = self.inner.watches.lock().expect("watch registry poisoned");
            let Some(entry) = watches.get_mut(path) else {
                return;
            };
            entry.subscribers.retain(|(cursor, _)| *cursor != id);
            if entry.subscribers.is_empty() {
                watches.remove(path)
            } else {
                None
            }
        };
        // The watcher is dropped outside the registry lock: its backend
        // thread may be blocked on that same lock delivering an event.
        drop(removed);
    }

    fn spawn_watcher(&self, path: &Path) -> notify::Result<notify::RecommendedWatcher> {
        let watched = path.to_path_buf();
        let weak = Arc::downgrade(&self.inner);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if !is_relevant(&event.kind) {
                return;
            }
            let Some(inner) = weak.upgrade() else { return };
            let uri = {
                let watches = inner.watches.lock().expect("watch registry poisoned");
                let Some(entry) = watches.get(&watched) else {
                    return;
                };
                for (_, state) in &entry.subscribers {
                    state.mark_changed();
                }
                entry.notify_uri.clone()
            };
            inner.notifier.notify_change(&uri);
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("active_watches", &self.active_watch_count())
            .finish_non_exhaustive()
    }
}

/// Which event classes mark cursors changed: creations, deletions,
/// renames/moves, content and attribute modifications. Pure access
/// events do not.
fn is_relevant(kind: &notify::EventKind) -> bool {
    matches!(
        kind,
        notify::EventKind::Create(_)
            | notify::EventKind::Modify(_)
            | notify::EventKind::Remove(_)
            | notify::EventKind::Any
    )
}

/// A query result set bound to one parent directory, kept live by a
/// shared directory watch.
///
/// The cursor subscribes to its path's watcher at construction and
/// unsubscribes when dropped. External changes to the directory mark
/// the cursor changed and invoke its invalidation callback.
pub struct DirectoryCursor {
    rows: Vec<DocumentRow>,
    path: PathBuf,
    id: CursorId,
    state: Arc<CursorState>,
    registry: WatcherRegistry,
}

impl DirectoryCursor {
    /// An empty cursor with no rows and no directory watch. Used while
    /// the store is locked, where listings deliberately look empty.
    pub(crate) fn detached(registry: &WatcherRegistry) -> Self {
        Self {
            rows: Vec::new(),
            path: PathBuf::new(),
            id: CursorId(u64::MAX),
            state: Arc::new(CursorState {
                changed: AtomicBool::new(false),
                callback: Mutex::new(None),
            }),
            registry: registry.clone(),
        }
    }

    pub(crate) fn new(
        rows: Vec<DocumentRow>,
        path: &Path,
        notify_uri: &str,
        registry: &WatcherRegistry,
    ) -> Self {
        let state = Arc::new(CursorState {
            changed: AtomicBool::new(false),
            callback: Mutex::new(None),
        });
        let id = registry.subscribe(path, notify_uri, Arc::clone(&state));
        Self {
            rows,
            path: path.to_path_buf(),
            id,
            state,
            registry: registry.clone(),
        }
    }

    /// The result rows.
    pub fn rows(&self) -> &[DocumentRow] {
        &self.rows
    }

    /// Whether the watched directory has changed since this cursor was
    /// built. A changed cursor should be re-queried.
    pub fn has_changed(&self) -> bool {
        self.state.changed.load(Ordering::SeqCst)
    }

    /// Install a callback invoked (from the watcher's thread) whenever
    /// the directory changes.
    ///
    /// The callback runs while the watch registry is held: it must not
    /// block excessively and must not open or close cursors.
    pub fn set_invalidation_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.state.callback.lock().expect("cursor callback poisoned") = Some(Box::new(callback));
    }
}

impl Drop for DirectoryCursor {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.path, self.id);
    }
}

impl std::fmt::Debug for DirectoryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCursor")
            .field("path", &self.path)
            .field("rows", &self.rows.len())
            .field("changed", &self.has_changed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NullNotifier;
    use std::time::{Duration, Instant};

    fn registry() -> WatcherRegistry {
        WatcherRegistry::new(Arc::new(NullNotifier))
    }

    fn cursor(registry: &WatcherRegistry, path: &Path) -> DirectoryCursor {
        DirectoryCursor::new(Vec::new(), path, "uri://test", registry)
    }

    #[test]
    fn cursors_on_same_path_share_one_watch() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();

        let first = cursor(&registry, tmp.path());
        let second = cursor(&registry, tmp.path());
        assert_eq!(registry.active_watch_count(), 1);

        drop(first);
        assert_eq!(registry.active_watch_count(), 1);
        drop(second);
        assert_eq!(registry.active_watch_count(), 0);
    }

    #[test]
    fn distinct_paths_get_distinct_watches() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let registry = registry();

        let _a = cursor(&registry, tmp.path());
        let _b = cursor(&registry, &sub);
        assert_eq!(registry.active_watch_count(), 2);
    }

    #[test]
    fn directory_change_marks_surviving_cursor() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();

        let closed = cursor(&registry, tmp.path());
        let surviving = cursor(&registry, tmp.path());
        drop(closed);

        std::fs::write(tmp.path().join("new-file.txt"), b"x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !surviving.has_changed() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(surviving.has_changed());
    }
}
