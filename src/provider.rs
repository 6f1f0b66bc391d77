//! The concrete provider binding.
//!
//! Wires the engine to the sandbox root ([`HomeEnvironment`]) and the
//! [`LockStore`] gate. While locked, listing-shaped operations return
//! deliberately empty results (the store hides its existence) and
//! mutating or content-revealing operations fail with an
//! authentication-required signal carrying a relaunch hint for the
//! unlock flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::FileSystemProvider;
use crate::handle::{DocumentHandle, OpenMode};
use crate::home::{AUTHORITY, HomeEnvironment, ROOT_DOC_ID, ROOT_ID};
use crate::lock::{ListenerId, LockStore};
use crate::names;
use crate::source::{ChangeNotifier, DocumentSource};
use crate::thumbs::Thumbnail;
use crate::types::{
    CancelSignal, DocumentPath, DocumentRow, Projection, RootFlags, RootInfo, SearchQuery,
    TreeSummary,
};
use crate::watch::DirectoryCursor;
use crate::ProviderError;

/// Presentation and relaunch strings supplied by the host.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Root row title.
    pub title: String,
    /// Root row summary.
    pub summary: String,
    /// Where callers are sent to unlock the store.
    pub unlock_hint: String,
}

/// Document source over the sandbox root.
///
/// The id scheme: the fixed [`ROOT_DOC_ID`], or [`ROOT_DOC_ID`] plus a
/// `/`-separated relative path. Resolution demands that the target
/// exists (the root always resolves) and never escapes the root.
#[derive(Debug)]
pub struct LockerSource {
    home: Arc<HomeEnvironment>,
}

impl LockerSource {
    /// Create a source scoped to `home`.
    pub fn new(home: Arc<HomeEnvironment>) -> Self {
        Self { home }
    }
}

impl DocumentSource for LockerSource {
    fn path_for_id(&self, doc_id: &str) -> Result<PathBuf, ProviderError> {
        let base = self.home.base_dir();
        if doc_id == ROOT_DOC_ID {
            return Ok(base.to_path_buf());
        }
        let Some(split) = doc_id.get(1..).and_then(|rest| rest.find('/')) else {
            return Err(ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            });
        };
        let relative = &doc_id[split + 2..];
        // Ids encode paths inside the root only.
        if relative.split('/').any(|segment| segment == "..") {
            return Err(ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            });
        }
        let target = base.join(relative);
        if target.exists() {
            Ok(target)
        } else {
            Err(ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            })
        }
    }

    fn doc_id_for_path(&self, path: &Path) -> String {
        if self.home.is_root(path) {
            ROOT_DOC_ID.to_string()
        } else {
            match path.strip_prefix(self.home.base_dir()) {
                Ok(rel) => format!("{ROOT_DOC_ID}/{}", rel.display()),
                Err(_) => ROOT_DOC_ID.to_string(),
            }
        }
    }

    fn notification_uri(&self, doc_id: &str) -> String {
        format!("content://{AUTHORITY}/document/{doc_id}/children")
    }

    fn is_not_essential(&self, path: &Path) -> bool {
        !self.home.is_root(path)
    }
}

/// The lockable document provider.
///
/// Owns the engine, consults the lock gate before every operation, and
/// re-broadcasts root visibility on lock transitions.
pub struct LockerProvider {
    engine: FileSystemProvider<LockerSource>,
    lock: Arc<LockStore>,
    config: ProviderConfig,
    lock_listener: ListenerId,
}

impl LockerProvider {
    /// Compose the provider from its collaborators.
    ///
    /// Registers a lock-state listener that re-broadcasts the roots
    /// notification URI on every transition, so callers re-query root
    /// visibility.
    pub fn new(
        home: Arc<HomeEnvironment>,
        lock: Arc<LockStore>,
        notifier: Arc<dyn ChangeNotifier>,
        config: ProviderConfig,
    ) -> Self {
        let engine =
            FileSystemProvider::new(Arc::new(LockerSource::new(home)), Arc::clone(&notifier));
        let lock_listener = lock.add_listener(move |_| {
            notifier.notify_change(&Self::roots_uri());
        });
        Self {
            engine,
            lock,
            config,
            lock_listener,
        }
    }

    /// The notification URI describing root visibility.
    pub fn roots_uri() -> String {
        format!("content://{AUTHORITY}/roots")
    }

    /// The engine, for callers needing direct access (tests, tools).
    pub fn engine(&self) -> &FileSystemProvider<LockerSource> {
        &self.engine
    }

    /// Advertise the single root.
    ///
    /// Empty while locked: the store hides its existence rather than
    /// refusing visibly.
    pub fn query_roots(&self) -> Vec<RootInfo> {
        if self.lock.is_locked() {
            return Vec::new();
        }
        let flags = RootFlags::LOCAL_ONLY
            .with(RootFlags::SUPPORTS_CREATE)
            .with(RootFlags::SUPPORTS_IS_CHILD)
            .with(RootFlags::SUPPORTS_EJECT)
            .with(RootFlags::SUPPORTS_SEARCH);
        vec![RootInfo {
            root_id: ROOT_ID.to_string(),
            doc_id: ROOT_DOC_ID.to_string(),
            flags,
            title: self.config.title.clone(),
            summary: self.config.summary.clone(),
        }]
    }

    /// Single-document query. Zero rows while locked.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the id does not resolve.
    pub fn query_document(
        &self,
        doc_id: &str,
        projection: &Projection,
    ) -> Result<Vec<DocumentRow>, ProviderError> {
        if self.lock.is_locked() {
            return Ok(Vec::new());
        }
        Ok(vec![self.engine.query_document(doc_id, projection)?])
    }

    /// Child listing with a live watch. Empty and watch-less while
    /// locked.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the parent id does not resolve.
    pub fn query_child_documents(
        &self,
        parent_doc_id: &str,
        projection: &Projection,
        _sort_order: Option<&str>,
    ) -> Result<DirectoryCursor, ProviderError> {
        if self.lock.is_locked() {
            return Ok(DirectoryCursor::detached(self.engine.watcher_registry()));
        }
        self.engine
            .query_child_documents(parent_doc_id, projection, _sort_order)
    }

    /// Recursive search under the root. Empty while locked.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidFilter`] for malformed MIME filters;
    /// [`ProviderError::NotFound`] for an unknown root id.
    pub fn query_search_documents(
        &self,
        root_id: &str,
        projection: &Projection,
        query: &SearchQuery,
        signal: &CancelSignal,
    ) -> Result<Vec<DocumentRow>, ProviderError> {
        if self.lock.is_locked() {
            return Ok(Vec::new());
        }
        if root_id != ROOT_ID && root_id != ROOT_DOC_ID {
            return Err(ProviderError::NotFound {
                doc_id: root_id.to_string(),
            });
        }
        self.engine
            .query_search_documents(ROOT_DOC_ID, projection, query, signal)
    }

    /// Path segments from parent to child. Empty while locked.
    pub fn find_document_path(
        &self,
        parent_doc_id: Option<&str>,
        child_doc_id: &str,
    ) -> DocumentPath {
        if self.lock.is_locked() {
            return DocumentPath {
                parent_doc_id: None,
                segments: Vec::new(),
            };
        }
        self.engine.find_document_path(parent_doc_id, child_doc_id)
    }

    /// Substring-containment child test (ungated).
    pub fn is_child_document(&self, parent_doc_id: &str, doc_id: &str) -> bool {
        self.engine.is_child_document(parent_doc_id, doc_id)
    }

    /// Aggregate subtree metadata for directory documents (ungated;
    /// `None` is the non-error "no metadata" answer).
    pub fn document_metadata(&self, doc_id: &str) -> Option<TreeSummary> {
        self.engine.document_metadata(doc_id)
    }

    /// MIME type of a document.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the id does not resolve.
    pub fn get_document_type(&self, doc_id: &str) -> Result<&'static str, ProviderError> {
        let path = self.engine.source().path_for_id(doc_id)?;
        Ok(names::document_type(doc_id, &path))
    }

    /// Open a document by platform mode string.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked;
    /// [`ProviderError::NotFound`] / [`ProviderError::Io`] from the
    /// engine.
    pub fn open_document(
        &self,
        doc_id: &str,
        mode: &str,
    ) -> Result<DocumentHandle, ProviderError> {
        self.assert_unlocked()?;
        self.engine.open_document(doc_id, OpenMode::parse(mode)?)
    }

    /// Open an image document's thumbnail.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn open_document_thumbnail(
        &self,
        doc_id: &str,
        size_hint: (u32, u32),
        signal: &CancelSignal,
    ) -> Result<Thumbnail, ProviderError> {
        self.assert_unlocked()?;
        self.engine
            .open_document_thumbnail(doc_id, size_hint, signal)
    }

    /// Create a document.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn create_document(
        &self,
        parent_doc_id: &str,
        mime_type: &str,
        display_name: &str,
    ) -> Result<String, ProviderError> {
        self.assert_unlocked()?;
        self.engine
            .create_document(parent_doc_id, mime_type, display_name)
    }

    /// Delete a document (missing ids are a silent no-op).
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn delete_document(&self, doc_id: &str) -> Result<(), ProviderError> {
        self.assert_unlocked()?;
        self.engine.delete_document(doc_id)
    }

    /// Remove a document from a parent. This store has no multi-parent
    /// documents, so removal is deletion.
    ///
    /// # Errors
    ///
    /// Same as [`delete_document`](Self::delete_document).
    pub fn remove_document(
        &self,
        doc_id: &str,
        _parent_doc_id: &str,
    ) -> Result<(), ProviderError> {
        self.delete_document(doc_id)
    }

    /// Copy a document.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn copy_document(
        &self,
        source_doc_id: &str,
        target_parent_doc_id: &str,
    ) -> Result<String, ProviderError> {
        self.assert_unlocked()?;
        self.engine
            .copy_document(source_doc_id, target_parent_doc_id)
    }

    /// Move a document.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn move_document(
        &self,
        source_doc_id: &str,
        source_parent_doc_id: &str,
        target_parent_doc_id: &str,
    ) -> Result<String, ProviderError> {
        self.assert_unlocked()?;
        self.engine
            .move_document(source_doc_id, source_parent_doc_id, target_parent_doc_id)
    }

    /// Rename a document. `None` means the identity did not change.
    ///
    /// # Errors
    ///
    /// [`ProviderError::AuthenticationRequired`] while locked; engine
    /// failures otherwise.
    pub fn rename_document(
        &self,
        doc_id: &str,
        display_name: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.assert_unlocked()?;
        self.engine.rename_document(doc_id, display_name)
    }

    /// Eject the root: re-locks the store as a side effect. Unknown
    /// root ids are ignored.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if the lock state cannot be persisted.
    pub fn eject_root(&self, root_id: &str) -> Result<(), ProviderError> {
        if root_id == ROOT_ID {
            self.lock.lock()?;
        }
        Ok(())
    }

    fn assert_unlocked(&self) -> Result<(), ProviderError> {
        if self.lock.is_locked() {
            Err(ProviderError::AuthenticationRequired {
                unlock_hint: self.config.unlock_hint.clone(),
            })
        } else {
            Ok(())
        }
    }
}

impl Drop for LockerProvider {
    fn drop(&mut self) {
        self.lock.remove_listener(self.lock_listener);
    }
}

impl std::fmt::Debug for LockerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockerProvider")
            .field("locked", &self.lock.is_locked())
            .finish_non_exhaustive()
    }
}
