//! # lockerfs
//!
//! The virtual-filesystem core of a **sandboxed, lockable document
//! store**: a document-oriented view over a real directory tree, gated
//! by a persisted lock.
//!
//! The crate maps opaque document identifiers to filesystem paths,
//! performs CRUD/search/open operations scoped to a single sandbox
//! root, watches directories to keep result cursors live, and builds
//! FAT-safe, MIME-aware, collision-free file names. Host-UI concerns
//! (unlock prompts, auto-lock scheduling, configuration screens) stay
//! outside; the crate consumes only a lock store and a root-resolution
//! policy.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lockerfs::{
//!     HomeConfig, HomeEnvironment, LockStore, LockerProvider, NullNotifier,
//!     Projection, ProviderConfig, ROOT_DOC_ID,
//! };
//!
//! # fn main() -> Result<(), lockerfs::ProviderError> {
//! // Composition root: every service is constructed explicitly, once.
//! let home = Arc::new(HomeEnvironment::new(HomeConfig {
//!     preferred: Some("/data/locker".into()),
//!     ..Default::default()
//! })?);
//! let lock = Arc::new(LockStore::new("/data/locker-state.json"));
//! let provider = LockerProvider::new(
//!     home,
//!     Arc::clone(&lock),
//!     Arc::new(NullNotifier),
//!     ProviderConfig {
//!         title: "Locker".into(),
//!         summary: "Private storage".into(),
//!         unlock_hint: "locker://unlock".into(),
//!     },
//! );
//!
//! let doc_id = provider.create_document(ROOT_DOC_ID, "text/plain", "notes")?;
//! let cursor = provider.query_child_documents(ROOT_DOC_ID, &Projection::all(), None)?;
//! for row in cursor.rows() {
//!     println!("{} ({})", row.doc_id, row.mime_type);
//! }
//! # let _ = doc_id;
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`LockerProvider`] | The lock-gated provider binding — the main entry point |
//! | [`FileSystemProvider`] | The document engine, generic over a [`DocumentSource`] |
//! | [`DocumentSource`] | Trait mapping document ids to paths and back |
//! | [`ChangeNotifier`] | Trait receiving change broadcasts and rescan requests |
//! | [`HomeEnvironment`] | The resolved sandbox root |
//! | [`LockStore`] | Persisted lock flag + password digest with listeners |
//! | [`DirectoryCursor`] | Live listing backed by a shared directory watch |
//! | [`ProviderError`] | Error taxonomy for every operation |
//!
//! ---
//!
//! ## Lock semantics
//!
//! While locked, listing-shaped operations (roots, single-document
//! query, child listing, search, find-path) return **empty** results —
//! the store hides its existence instead of refusing visibly. Mutating
//! or content-revealing operations (open, thumbnail, create, delete,
//! copy, move, rename) fail with
//! [`ProviderError::AuthenticationRequired`], carrying a hint the
//! caller uses to relaunch the unlock flow and retry. Ejecting the
//! root re-locks the store.
//!
//! ---
//!
//! ## Concurrency
//!
//! Operations are synchronous and blocking on the calling thread; the
//! host invokes them from its own workers. The watcher registry and
//! the lock store guard their state with mutexes, and lock-state
//! listeners run synchronously on the transitioning thread. Directory
//! watch events arrive on the watcher backend's threads and
//! synchronize with cursor close through the registry mutex. No
//! operation retries internally; every failure is terminal for that
//! invocation.

// Private modules
mod engine;
mod error;
mod handle;
mod home;
mod lock;
pub mod mime;
mod names;
mod provider;
mod source;
mod thumbs;
mod types;
mod watch;

// Public re-exports - error type
pub use error::ProviderError;

// Public re-exports - naming and MIME helpers
pub use names::{
    build_unique_path, build_unique_path_keeping_extension, build_valid_file_name,
    delete_contents, document_type, split_file_name,
};

// Public re-exports - composition services
pub use home::{AUTHORITY, HomeConfig, HomeEnvironment, ROOT_DOC_ID, ROOT_ID};
pub use lock::{ListenerId, LockStore};

// Public re-exports - engine and binding
pub use engine::FileSystemProvider;
pub use provider::{LockerProvider, LockerSource, ProviderConfig};
pub use source::{ChangeNotifier, DocumentSource, NullNotifier};

// Public re-exports - operation surface types
pub use handle::{DocumentHandle, OpenMode};
pub use thumbs::{probe_thumbnail, Thumbnail};
pub use types::{
    CancelSignal, Column, DocumentFlags, DocumentPath, DocumentRow, Projection, RootFlags,
    RootInfo, SearchQuery, TreeSummary,
};
pub use watch::{DirectoryCursor, WatcherRegistry};
