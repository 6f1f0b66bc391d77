//! Binding traits between the engine and a concrete provider.
//!
//! The engine is generic over these capability seams so a binding can
//! decide the document-id scheme and where change notifications go —
//! and so tests can substitute an in-memory fake.

use std::path::{Path, PathBuf};

use crate::ProviderError;

/// Maps document identifiers to filesystem paths and back.
///
/// Implemented by the concrete provider binding. The engine never
/// interprets document ids itself; every resolution goes through this
/// trait, and failures are threaded through operations as values.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods take `&self` to
/// allow concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn DocumentSource`.
pub trait DocumentSource: Send + Sync {
    /// Resolve a document id to an existing filesystem path.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::NotFound`] if the id is malformed or the
    ///   path it denotes does not exist
    fn path_for_id(&self, doc_id: &str) -> Result<PathBuf, ProviderError>;

    /// Compute the document id for a path inside the sandbox.
    ///
    /// Inverse of [`path_for_id`](Self::path_for_id) for every path
    /// under the root; the root path itself maps to the root doc id.
    fn doc_id_for_path(&self, path: &Path) -> String;

    /// Build the change-notification URI for a document id.
    fn notification_uri(&self, doc_id: &str) -> String;

    /// Called after the given document has been modified.
    ///
    /// A hook for the binding to invalidate cached data. Default: no-op.
    fn on_doc_id_changed(&self, _doc_id: &str) {}

    /// Called after the given document has been deleted or moved away.
    ///
    /// A hook for the binding to revoke outstanding grants. Default:
    /// no-op.
    fn on_doc_id_deleted(&self, _doc_id: &str) {}

    /// Whether delete/rename/move/copy capabilities may be granted for
    /// `path` when it is a directory.
    ///
    /// Bindings return `false` for root-protected entries. Default:
    /// everything is non-essential, i.e. always mutable.
    fn is_not_essential(&self, _path: &Path) -> bool {
        true
    }
}

/// Where change notifications and media-rescan requests are delivered.
///
/// The watcher registry broadcasts the shared notification URI through
/// this trait once per filesystem event, and the engine calls it after
/// every mutation.
pub trait ChangeNotifier: Send + Sync {
    /// Broadcast a content change for the given notification URI.
    fn notify_change(&self, uri: &str);

    /// Ask the host's media index to rescan `path`.
    ///
    /// Fired after create, copy, rename, move, delete and when a
    /// writable document handle closes. Default: no-op.
    fn request_rescan(&self, _path: &Path) {}
}

/// A notifier that drops everything. Useful for tests and for bindings
/// without a content-change channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify_change(&self, _uri: &str) {}
}
