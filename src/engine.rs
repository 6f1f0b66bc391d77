//! The document engine.
//!
//! Translates document identifiers to paths through a
//! [`DocumentSource`], performs the filesystem work for every provider
//! operation, and emits change notifications. The engine never decides
//! the id scheme or the lock policy — those belong to the binding.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::handle::{DocumentHandle, OpenMode};
use crate::mime::{self, MIME_TYPE_DIRECTORY};
use crate::names;
use crate::source::{ChangeNotifier, DocumentSource};
use crate::thumbs::{self, Thumbnail};
use crate::types::{
    CancelSignal, Column, DocumentFlags, DocumentPath, DocumentRow, Projection, SearchQuery,
    TreeSummary,
};
use crate::watch::{DirectoryCursor, WatcherRegistry};
use crate::ProviderError;

/// Search visits at most this many entries, match or not. The cap
/// bounds work done, not results found: a walk can end with fewer
/// matches than exist if the budget is spent on non-matches.
const MAX_QUERY_RESULTS: u32 = 23;

/// Last-modified timestamps at or below this value (one year past the
/// epoch, in milliseconds) are considered bogus and never published.
const MTIME_SANITY_FLOOR_MS: u64 = 31_536_000_000;

/// Document engine generic over the binding's [`DocumentSource`].
pub struct FileSystemProvider<S> {
    source: Arc<S>,
    notifier: Arc<dyn ChangeNotifier>,
    registry: WatcherRegistry,
}

impl<S: DocumentSource + 'static> FileSystemProvider<S> {
    /// Create an engine over `source`, delivering notifications and
    /// rescan requests to `notifier`.
    pub fn new(source: Arc<S>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        let registry = WatcherRegistry::new(Arc::clone(&notifier));
        Self {
            source,
            notifier,
            registry,
        }
    }

    /// The binding's document source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The watcher registry backing live cursors.
    pub fn watcher_registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    /// Aggregate size and file count for a directory document.
    ///
    /// Returns `None` — never an error — for ids that do not resolve,
    /// paths that are not readable directories, and subtrees that fail
    /// mid-walk.
    pub fn document_metadata(&self, doc_id: &str) -> Option<TreeSummary> {
        let path = self.source.path_for_id(doc_id).ok()?;
        if !path.is_dir() {
            return None;
        }
        let mut summary = TreeSummary::default();
        for entry in WalkDir::new(&path) {
            let entry = entry.ok()?;
            if entry.file_type().is_file() {
                summary.size += entry.metadata().ok()?.len();
                summary.count += 1;
            }
        }
        Some(summary)
    }

    /// Create an empty file or directory under `parent_doc_id`.
    ///
    /// The display name is sanitized to a FAT-valid name and made
    /// unique under the parent; whether a directory or file is created
    /// depends on `mime_type`. Returns the new document id.
    ///
    /// # Errors
    ///
    /// [`ProviderError::IllegalState`] if the parent does not resolve
    /// to a directory or the filesystem operation fails.
    pub fn create_document(
        &self,
        parent_doc_id: &str,
        mime_type: &str,
        display_name: &str,
    ) -> Result<String, ProviderError> {
        let doc_name = names::build_valid_file_name(display_name);
        tracing::debug!(parent = parent_doc_id, name = %doc_name, mime = mime_type, "create document");

        let result = (|| {
            let parent = self.source.path_for_id(parent_doc_id)?;
            if !parent.is_dir() {
                return Err(ProviderError::NotADirectory { path: parent });
            }
            let path = names::build_unique_path(&parent, mime_type, &doc_name)?;
            if mime_type == MIME_TYPE_DIRECTORY {
                std::fs::create_dir(&path).map_err(|e| ProviderError::io("create", &path, e))?;
            } else {
                std::fs::File::create(&path)
                    .map_err(|e| ProviderError::io("create", &path, e))?;
            }
            let child_id = self.source.doc_id_for_path(&path);
            self.source.on_doc_id_changed(&child_id);
            self.notifier.request_rescan(&path);
            Ok(child_id)
        })();

        result.map_err(|e| {
            tracing::error!(error = %e, "failed to create document");
            ProviderError::illegal_state("create_document", e)
        })
    }

    /// Copy a document (recursively, for directories) under a new
    /// parent, picking a collision-free destination name. Returns the
    /// new document id.
    ///
    /// A copy that fails partway leaves already-copied files in place;
    /// no rollback is attempted.
    ///
    /// # Errors
    ///
    /// [`ProviderError::IllegalState`] if either id fails to resolve or
    /// any filesystem operation fails.
    pub fn copy_document(
        &self,
        source_doc_id: &str,
        target_parent_doc_id: &str,
    ) -> Result<String, ProviderError> {
        let result = (|| {
            let source = self.source.path_for_id(source_doc_id)?;
            let parent = self.source.path_for_id(target_parent_doc_id)?;
            let file_name = file_name_of(&source);
            let target = names::build_unique_path_keeping_extension(&parent, &file_name)?;
            tracing::debug!(from = %source.display(), to = %target.display(), "copy document");

            if source.is_dir() {
                // Pre-order walk: each directory is mirrored before its
                // contents are copied. Destination paths are fresh, so
                // plain copies cannot clobber.
                for entry in WalkDir::new(&source) {
                    let entry =
                        entry.map_err(|e| walk_error("copy", &source, e))?;
                    let rel = entry
                        .path()
                        .strip_prefix(&source)
                        .expect("walk stays under its root");
                    let dest = target.join(rel);
                    if entry.file_type().is_dir() {
                        std::fs::create_dir_all(&dest)
                            .map_err(|e| ProviderError::io("copy", &dest, e))?;
                    } else {
                        std::fs::copy(entry.path(), &dest)
                            .map_err(|e| ProviderError::io("copy", &dest, e))?;
                    }
                }
            } else {
                std::fs::copy(&source, &target)
                    .map_err(|e| ProviderError::io("copy", &target, e))?;
            }

            self.notifier.request_rescan(&target);
            let target_id = self.source.doc_id_for_path(&target);
            self.source.on_doc_id_changed(&target_id);
            Ok(target_id)
        })();

        result.map_err(|e| {
            tracing::error!(error = %e, "failed to copy document");
            ProviderError::illegal_state("copy_document", e)
        })
    }

    /// Rename a document in place, picking a collision-free name under
    /// the same parent.
    ///
    /// Returns `None` when the resolved new document id equals the old
    /// one (a same-identity rename), otherwise the new id.
    ///
    /// # Errors
    ///
    /// [`ProviderError::IllegalState`] if the id fails to resolve or
    /// the move fails.
    pub fn rename_document(
        &self,
        doc_id: &str,
        display_name: &str,
    ) -> Result<Option<String>, ProviderError> {
        let doc_name = names::build_valid_file_name(display_name);
        let result = (|| {
            let before = self.source.path_for_id(doc_id)?;
            let parent = before.parent().ok_or_else(|| ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            })?;
            let after = names::build_unique_path_keeping_extension(parent, &doc_name)?;
            tracing::debug!(from = %before.display(), to = %after.display(), "rename document");
            std::fs::rename(&before, &after)
                .map_err(|e| ProviderError::io("rename", &before, e))?;

            self.notifier.request_rescan(&before);
            self.notifier.request_rescan(&after);
            self.source.on_doc_id_changed(doc_id);
            self.source.on_doc_id_deleted(doc_id);

            let after_id = self.source.doc_id_for_path(&after);
            if after_id == doc_id {
                Ok(None)
            } else {
                self.source.on_doc_id_changed(&after_id);
                Ok(Some(after_id))
            }
        })();

        result.map_err(|e| {
            tracing::error!(error = %e, "failed to rename document");
            ProviderError::illegal_state("rename_document", e)
        })
    }

    /// Move a document under a new parent, keeping its filename.
    ///
    /// Uniqueness is deliberately not reapplied: a name collision in
    /// the target surfaces as a filesystem error. Returns the new
    /// document id.
    ///
    /// # Errors
    ///
    /// [`ProviderError::IllegalState`] if either id fails to resolve or
    /// the move fails.
    pub fn move_document(
        &self,
        source_doc_id: &str,
        _source_parent_doc_id: &str,
        target_parent_doc_id: &str,
    ) -> Result<String, ProviderError> {
        let result = (|| {
            let before = self.source.path_for_id(source_doc_id)?;
            let parent = self.source.path_for_id(target_parent_doc_id)?;
            let after = parent.join(file_name_of(&before));
            tracing::debug!(from = %before.display(), to = %after.display(), "move document");
            if after.exists() {
                return Err(ProviderError::io(
                    "move",
                    &after,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target exists"),
                ));
            }
            std::fs::rename(&before, &after)
                .map_err(|e| ProviderError::io("move", &before, e))?;

            self.notifier.request_rescan(&before);
            self.notifier.request_rescan(&after);
            self.source.on_doc_id_changed(source_doc_id);
            self.source.on_doc_id_deleted(source_doc_id);

            let after_id = self.source.doc_id_for_path(&after);
            self.source.on_doc_id_changed(&after_id);
            Ok(after_id)
        })();

        result.map_err(|e| {
            tracing::error!(error = %e, "failed to move document");
            ProviderError::illegal_state("move_document", e)
        })
    }

    /// Delete a document; directories are removed with their whole
    /// subtree.
    ///
    /// An id that does not resolve is a silent no-op, not an error.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if a removal fails for a reason other than
    /// absence.
    pub fn delete_document(&self, doc_id: &str) -> Result<(), ProviderError> {
        let Ok(path) = self.source.path_for_id(doc_id) else {
            return Ok(());
        };
        tracing::debug!(doc_id, path = %path.display(), "delete document");

        if path.is_dir() {
            names::delete_contents(&path)?;
            std::fs::remove_dir(&path).map_err(|e| ProviderError::io("delete", &path, e))?;
        } else {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ProviderError::io("delete", &path, e)),
            }
        }

        self.source.on_doc_id_changed(doc_id);
        self.source.on_doc_id_deleted(doc_id);
        self.notifier.request_rescan(&path);
        Ok(())
    }

    /// Open a document with the requested access mode.
    ///
    /// For any mode other than strict read-only the returned handle
    /// carries an on-close hook that notifies a change and requests a
    /// media rescan once the handle is dropped.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the id does not resolve;
    /// [`ProviderError::Io`] if the open itself fails.
    pub fn open_document(
        &self,
        doc_id: &str,
        mode: OpenMode,
    ) -> Result<DocumentHandle, ProviderError> {
        let path = self
            .source
            .path_for_id(doc_id)
            .map_err(|_| ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            })?;

        let file = mode
            .open_options()
            .open(&path)
            .map_err(|e| ProviderError::io("open", &path, e))?;

        let on_close = if mode.is_read_only() {
            None
        } else {
            let source = Arc::clone(&self.source);
            let notifier = Arc::clone(&self.notifier);
            let doc_id = doc_id.to_string();
            let path = path.clone();
            Some(Box::new(move || {
                source.on_doc_id_changed(&doc_id);
                notifier.notify_change(&source.notification_uri(&doc_id));
                notifier.request_rescan(&path);
            }) as Box<dyn FnOnce() + Send>)
        };

        Ok(DocumentHandle::new(file, on_close))
    }

    /// Open a thumbnail view of an image document.
    ///
    /// Only valid for `image/*` documents. The embedded EXIF thumbnail
    /// range and orientation are used when present; otherwise the whole
    /// file is returned for the caller to decode.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the id does not resolve or the
    /// document is not an image; [`ProviderError::Io`] on read failure
    /// or cancellation.
    pub fn open_document_thumbnail(
        &self,
        doc_id: &str,
        _size_hint: (u32, u32),
        signal: &CancelSignal,
    ) -> Result<Thumbnail, ProviderError> {
        let path = self
            .source
            .path_for_id(doc_id)
            .map_err(|_| ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            })?;
        if !names::document_type(doc_id, &path).starts_with("image/") {
            return Err(ProviderError::NotFound {
                doc_id: doc_id.to_string(),
            });
        }
        thumbs::probe_thumbnail(&path, signal)
    }

    /// Build the single result row for a document.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the id does not resolve.
    pub fn query_document(
        &self,
        doc_id: &str,
        projection: &Projection,
    ) -> Result<DocumentRow, ProviderError> {
        let path = self.source.path_for_id(doc_id)?;
        Ok(self.build_row(&path, Some(doc_id), projection))
    }

    /// List the immediate children of a directory document.
    ///
    /// The returned cursor holds a live watch on the parent directory:
    /// external changes mark it changed and broadcast its notification
    /// URI. A parent that is not a directory yields zero rows (with a
    /// warning), not an error. A sort order is accepted but not
    /// applied; the caller sorts.
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
        let parent = self.source.path_for_id(parent_doc_id)?;

        let mut rows = Vec::new();
        if parent.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&parent) {
                for entry in entries.flatten() {
                    rows.push(self.build_row(&entry.path(), None, projection));
                }
            }
        } else {
            tracing::warn!(parent = parent_doc_id, "not a directory");
        }

        let uri = self.source.notification_uri(parent_doc_id);
        Ok(DirectoryCursor::new(rows, &parent, &uri, &self.registry))
    }

    /// Recursively search the subtree under `root_doc_id`.
    ///
    /// Filters combine in conjunction; directories go through the MIME
    /// filter typed as directories. The walk visits at most 23
    /// entries — the budget bounds work done, not results found, so
    /// fewer matches than exist may be returned. Cancellation stops the
    /// walk and returns what was found so far.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::InvalidFilter`] for malformed MIME filters,
    ///   raised before the walk starts
    /// - [`ProviderError::NotFound`] if the root id does not resolve
    pub fn query_search_documents(
        &self,
        root_doc_id: &str,
        projection: &Projection,
        query: &SearchQuery,
        signal: &CancelSignal,
    ) -> Result<Vec<DocumentRow>, ProviderError> {
        for filter in &query.mime_types {
            mime::mime_type_matches(None, filter)?;
        }

        let root = self.source.path_for_id(root_doc_id)?;
        let mut rows = Vec::new();
        let mut budget = MAX_QUERY_RESULTS;

        for entry in WalkDir::new(&root) {
            if signal.is_cancelled() {
                break;
            }
            let Ok(entry) = entry else { continue };
            if matches_search(entry.path(), query) {
                rows.push(self.build_row(entry.path(), None, projection));
            }
            budget -= 1;
            if budget == 0 {
                break;
            }
        }
        Ok(rows)
    }

    /// Compute the path segments between a parent document and a child.
    ///
    /// The parent id's prefix is stripped off the child id by string
    /// length, the remainder split on `/` with trailing empty segments
    /// dropped.
    pub fn find_document_path(
        &self,
        parent_doc_id: Option<&str>,
        child_doc_id: &str,
    ) -> DocumentPath {
        let path_str = match parent_doc_id {
            Some(parent) => child_doc_id.get(parent.len()..).unwrap_or(""),
            None => child_doc_id,
        };
        let mut segments: Vec<String> = path_str.split('/').map(str::to_string).collect();
        while segments.last().is_some_and(String::is_empty) {
            segments.pop();
        }
        DocumentPath {
            parent_doc_id: parent_doc_id.map(str::to_string),
            segments,
        }
    }

    /// Whether `doc_id` is considered a child of `parent_doc_id`.
    ///
    /// Platform convention: string containment of the parent id inside
    /// the child id. Sibling ids sharing a prefix therefore also test
    /// positive.
    pub fn is_child_document(&self, parent_doc_id: &str, doc_id: &str) -> bool {
        doc_id.contains(parent_doc_id)
    }

    /// Assemble a row for `path`, computing the doc id when the caller
    /// does not already have one.
    pub(crate) fn build_row(
        &self,
        path: &Path,
        doc_id: Option<&str>,
        projection: &Projection,
    ) -> DocumentRow {
        let doc_id = match doc_id {
            Some(id) => id.to_string(),
            None => self.source.doc_id_for_path(path),
        };
        let mime_type = names::document_type(&doc_id, path);
        let metadata = path.metadata().ok();

        let flags = projection.contains(Column::Flags).then(|| {
            let mut flags = DocumentFlags::empty();
            let writable = metadata
                .as_ref()
                .is_some_and(|m| !m.permissions().readonly());
            if writable {
                if mime_type == MIME_TYPE_DIRECTORY {
                    flags = flags.with(DocumentFlags::DIR_SUPPORTS_CREATE);
                    if self.source.is_not_essential(path) {
                        flags = flags.with(DocumentFlags::all_mutations());
                    }
                } else {
                    flags = flags.with(DocumentFlags::all_mutations());
                }
            }
            if mime_type.starts_with("image/") {
                flags = flags.with(DocumentFlags::SUPPORTS_THUMBNAIL);
            }
            flags
        });

        let display_name = projection
            .contains(Column::DisplayName)
            .then(|| file_name_of(path));

        let last_modified = if projection.contains(Column::LastModified) {
            metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                // Only publish dates reasonably after the epoch.
                .filter(|millis| *millis > MTIME_SANITY_FLOOR_MS)
        } else {
            None
        };

        let size = if projection.contains(Column::Size) {
            metadata.as_ref().map(std::fs::Metadata::len)
        } else {
            None
        };

        DocumentRow {
            doc_id,
            mime_type: mime_type.to_string(),
            flags,
            display_name,
            last_modified,
            size,
        }
    }
}

impl<S> std::fmt::Debug for FileSystemProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemProvider")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn walk_error(operation: &'static str, root: &Path, e: walkdir::Error) -> ProviderError {
    let path = e.path().unwrap_or(root).to_path_buf();
    let io = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("walk failed"));
    ProviderError::io(operation, path, io)
}

/// Test one visited entry against the query filters, in conjunction.
fn matches_search(path: &Path, query: &SearchQuery) -> bool {
    let file_name = file_name_of(path).to_lowercase();

    if let Some(needle) = &query.display_name {
        if !needle.is_empty() && !file_name.contains(&needle.to_lowercase()) {
            return false;
        }
    }

    let metadata = path.metadata().ok();
    if let Some(min_size) = query.min_size {
        let size = metadata.as_ref().map_or(0, std::fs::Metadata::len);
        if size < min_size {
            return false;
        }
    }

    if let Some(after) = query.modified_after {
        let modified = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as u64);
        if modified < after {
            return false;
        }
    }

    if !query.mime_types.is_empty() {
        let file_mime = if path.is_dir() {
            Some(MIME_TYPE_DIRECTORY)
        } else {
            file_name
                .rfind('.')
                .and_then(|dot| mime::mime_from_extension(&file_name[dot + 1..]))
        };
        return query
            .mime_types
            .iter()
            .any(|filter| mime::mime_type_matches(file_mime, filter).unwrap_or(false));
    }
    true
}
