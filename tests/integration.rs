//! Integration tests driving the public surface end-to-end.
//!
//! These tests verify that:
//! 1. The composition root wires services explicitly (no globals) and
//!    the provider works over a real sandbox directory
//! 2. Document ids and paths stay mutual inverses through CRUD flows
//! 3. The lock gate hides content and blocks mutation until unlock
//! 4. Cursors share directory watches and see external changes
//! 5. The engine is generic over a custom [`DocumentSource`]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lockerfs::{
    CancelSignal, ChangeNotifier, DocumentSource, FileSystemProvider, HomeConfig,
    HomeEnvironment, LockStore, LockerProvider, NullNotifier, Projection, ProviderConfig,
    ProviderError, ROOT_DOC_ID, ROOT_ID, SearchQuery,
};

// =============================================================================
// Test composition root
// =============================================================================

struct Fixture {
    provider: LockerProvider,
    lock: Arc<LockStore>,
    sandbox: PathBuf,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sandbox = tmp.path().join("sandbox");
    let home = Arc::new(
        HomeEnvironment::new(HomeConfig {
            preferred: Some(sandbox.clone()),
            ..Default::default()
        })
        .expect("home"),
    );
    let lock = Arc::new(LockStore::new(tmp.path().join("lock.json")));
    let provider = LockerProvider::new(
        home,
        Arc::clone(&lock),
        Arc::new(NullNotifier),
        ProviderConfig {
            title: "Locker".into(),
            summary: "Private storage".into(),
            unlock_hint: "locker://unlock".into(),
        },
    );
    Fixture {
        provider,
        lock,
        sandbox,
        _tmp: tmp,
    }
}

// =============================================================================
// CRUD + id round-trips
// =============================================================================

#[test]
fn full_document_lifecycle() {
    let fx = fixture();
    let provider = &fx.provider;

    // Create a folder tree with documents.
    let folder = provider
        .create_document(ROOT_DOC_ID, "inode/directory", "Reports")
        .unwrap();
    assert_eq!(folder, format!("{ROOT_DOC_ID}/Reports"));
    let doc = provider
        .create_document(&folder, "text/plain", "summary")
        .unwrap();
    assert_eq!(doc, format!("{ROOT_DOC_ID}/Reports/summary.txt"));

    // Id → path → id round-trip.
    let source = provider.engine().source();
    let path = source.path_for_id(&doc).unwrap();
    assert_eq!(source.doc_id_for_path(&path), doc);

    // Write through a handle; the file lands on disk when it closes.
    {
        use std::io::Write;
        let mut handle = provider.open_document(&doc, "w").unwrap();
        handle.write_all(b"quarterly numbers").unwrap();
    }
    assert_eq!(
        std::fs::read(fx.sandbox.join("Reports/summary.txt")).unwrap(),
        b"quarterly numbers"
    );

    // Copy the folder, then rename and move pieces around.
    let copied = provider.copy_document(&folder, ROOT_DOC_ID).unwrap();
    assert_eq!(copied, format!("{ROOT_DOC_ID}/Reports (1)"));
    assert!(fx.sandbox.join("Reports (1)/summary.txt").is_file());

    let renamed = provider
        .rename_document(&doc, "final.txt")
        .unwrap()
        .expect("identity changed");
    assert_eq!(renamed, format!("{ROOT_DOC_ID}/Reports/final.txt"));

    let moved = provider
        .move_document(&renamed, &folder, ROOT_DOC_ID)
        .unwrap();
    assert_eq!(moved, format!("{ROOT_DOC_ID}/final.txt"));

    // Aggregate metadata over the copied subtree.
    let summary = provider.document_metadata(&copied).unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(summary.size, "quarterly numbers".len() as u64);

    // Delete the original folder; a second delete is a silent no-op.
    provider.delete_document(&folder).unwrap();
    assert!(!fx.sandbox.join("Reports").exists());
    provider.delete_document(&folder).unwrap();
}

#[test]
fn listing_reflects_disk_contents() {
    let fx = fixture();
    std::fs::write(fx.sandbox.join("a.txt"), b"x").unwrap();
    std::fs::create_dir(fx.sandbox.join("dir")).unwrap();

    let cursor = fx
        .provider
        .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
        .unwrap();
    let mut rows: Vec<_> = cursor
        .rows()
        .iter()
        .map(|r| (r.doc_id.clone(), r.mime_type.clone()))
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        [
            (format!("{ROOT_DOC_ID}/a.txt"), "text/plain".to_string()),
            (format!("{ROOT_DOC_ID}/dir"), "inode/directory".to_string()),
        ]
    );
}

// =============================================================================
// Lock gate
// =============================================================================

#[test]
fn lock_gate_hides_then_reveals() {
    let fx = fixture();
    let doc = fx
        .provider
        .create_document(ROOT_DOC_ID, "text/plain", "hidden")
        .unwrap();

    let before: Vec<_> = fx
        .provider
        .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
        .unwrap()
        .rows()
        .to_vec();
    assert_eq!(before.len(), 1);

    fx.lock.lock().unwrap();

    // Listings look empty, mutations demand authentication.
    assert!(fx.provider.query_roots().is_empty());
    assert!(
        fx.provider
            .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
            .unwrap()
            .rows()
            .is_empty()
    );
    let err = fx.provider.open_document(&doc, "r").unwrap_err();
    assert!(matches!(err, ProviderError::AuthenticationRequired { .. }));

    fx.lock.unlock().unwrap();

    // The identical call now returns the previously hidden rows.
    let after: Vec<_> = fx
        .provider
        .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
        .unwrap()
        .rows()
        .to_vec();
    assert_eq!(before, after);
    assert!(fx.provider.open_document(&doc, "r").is_ok());
}

#[test]
fn eject_locks_the_store() {
    let fx = fixture();
    assert!(!fx.lock.is_locked());
    fx.provider.eject_root(ROOT_ID).unwrap();
    assert!(fx.lock.is_locked());
}

// =============================================================================
// Search
// =============================================================================

#[test]
fn search_matches_conjunction_of_filters() {
    let fx = fixture();
    std::fs::write(fx.sandbox.join("report-2026.txt"), vec![b'x'; 4096]).unwrap();
    std::fs::write(fx.sandbox.join("report-note.txt"), b"short").unwrap();
    std::fs::write(fx.sandbox.join("image.png"), vec![b'x'; 4096]).unwrap();

    let rows = fx
        .provider
        .query_search_documents(
            ROOT_ID,
            &Projection::all(),
            &SearchQuery {
                display_name: Some("report".into()),
                min_size: Some(1000),
                ..Default::default()
            },
            &CancelSignal::new(),
        )
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ids, [format!("{ROOT_DOC_ID}/report-2026.txt")]);
}

#[test]
fn search_visit_budget_is_23() {
    let fx = fixture();
    for i in 0..50 {
        std::fs::write(fx.sandbox.join(format!("f{i:02}.txt")), b"x").unwrap();
    }

    let rows = fx
        .provider
        .query_search_documents(
            ROOT_ID,
            &Projection::all(),
            &SearchQuery::default(),
            &CancelSignal::new(),
        )
        .unwrap();
    // 23 visited entries, the sandbox root among them.
    assert_eq!(rows.len(), 23);
}

// =============================================================================
// Watchers
// =============================================================================

#[test]
fn cursors_share_one_watch_and_outlive_each_other() {
    let fx = fixture();
    let registry = fx.provider.engine().watcher_registry();

    let first = fx
        .provider
        .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
        .unwrap();
    let second = fx
        .provider
        .query_child_documents(ROOT_DOC_ID, &Projection::all(), None)
        .unwrap();
    assert_eq!(registry.active_watch_count(), 1);

    drop(first);
    assert_eq!(registry.active_watch_count(), 1);

    // The surviving cursor still sees external changes.
    std::fs::write(fx.sandbox.join("appeared.txt"), b"x").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !second.has_changed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(second.has_changed());

    drop(second);
    assert_eq!(registry.active_watch_count(), 0);
}

#[test]
fn writable_handle_close_broadcasts_change() {
    struct Recorder(Mutex<Vec<String>>);
    impl ChangeNotifier for Recorder {
        fn notify_change(&self, uri: &str) {
            self.0.lock().unwrap().push(uri.to_string());
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let home = Arc::new(
        HomeEnvironment::new(HomeConfig {
            preferred: Some(tmp.path().join("sandbox")),
            ..Default::default()
        })
        .unwrap(),
    );
    let lock = Arc::new(LockStore::new(tmp.path().join("lock.json")));
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let provider = LockerProvider::new(
        home,
        lock,
        Arc::clone(&recorder) as Arc<dyn ChangeNotifier>,
        ProviderConfig {
            title: "Locker".into(),
            summary: "Private".into(),
            unlock_hint: "locker://unlock".into(),
        },
    );

    let doc = provider
        .create_document(ROOT_DOC_ID, "text/plain", "tracked")
        .unwrap();
    recorder.0.lock().unwrap().clear();

    let handle = provider.open_document(&doc, "w").unwrap();
    assert!(recorder.0.lock().unwrap().is_empty());
    drop(handle);
    let uris = recorder.0.lock().unwrap();
    assert_eq!(uris.len(), 1);
    assert!(uris[0].contains(&doc));
}

// =============================================================================
// Engine genericity
// =============================================================================

/// A source with its own id scheme, proving the engine works against
/// any [`DocumentSource`] implementation.
struct FlatSource {
    base: PathBuf,
}

impl DocumentSource for FlatSource {
    fn path_for_id(&self, doc_id: &str) -> Result<PathBuf, ProviderError> {
        let path = match doc_id.strip_prefix("flat:") {
            Some("") => self.base.clone(),
            Some(name) => self.base.join(name),
            None => {
                return Err(ProviderError::NotFound {
                    doc_id: doc_id.into(),
                });
            }
        };
        if path.exists() {
            Ok(path)
        } else {
            Err(ProviderError::NotFound {
                doc_id: doc_id.into(),
            })
        }
    }

    fn doc_id_for_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.base) {
            Ok(rel) if rel.as_os_str().is_empty() => "flat:".to_string(),
            Ok(rel) => format!("flat:{}", rel.display()),
            Err(_) => "flat:".to_string(),
        }
    }

    fn notification_uri(&self, doc_id: &str) -> String {
        format!("flat://{doc_id}")
    }
}

#[test]
fn engine_accepts_custom_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = FileSystemProvider::new(
        Arc::new(FlatSource {
            base: tmp.path().to_path_buf(),
        }),
        Arc::new(NullNotifier),
    );

    let created = engine.create_document("flat:", "text/plain", "doc").unwrap();
    assert_eq!(created, "flat:doc.txt");

    let cursor = engine
        .query_child_documents("flat:", &Projection::all(), None)
        .unwrap();
    assert_eq!(cursor.rows().len(), 1);
    assert_eq!(cursor.rows()[0].doc_id, "flat:doc.txt");

    engine.delete_document("flat:doc.txt").unwrap();
    assert!(!tmp.path().join("doc.txt").exists());
}
