//! Core types for the document-provider surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capability flags for a single document row, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DocumentFlags(u32);

impl DocumentFlags {
    /// Document contents may be written.
    pub const SUPPORTS_WRITE: Self = Self(1 << 0);
    /// Document may be deleted.
    pub const SUPPORTS_DELETE: Self = Self(1 << 1);
    /// Document may be renamed.
    pub const SUPPORTS_RENAME: Self = Self(1 << 2);
    /// Document may be copied.
    pub const SUPPORTS_COPY: Self = Self(1 << 3);
    /// Document may be moved to another parent.
    pub const SUPPORTS_MOVE: Self = Self(1 << 4);
    /// Directory accepts new child documents.
    pub const DIR_SUPPORTS_CREATE: Self = Self(1 << 5);
    /// A thumbnail can be produced for this document.
    pub const SUPPORTS_THUMBNAIL: Self = Self(1 << 6);

    /// No capabilities.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The full mutation set granted to writable, non-protected entries.
    #[inline]
    pub const fn all_mutations() -> Self {
        Self(
            Self::SUPPORTS_WRITE.0
                | Self::SUPPORTS_DELETE.0
                | Self::SUPPORTS_RENAME.0
                | Self::SUPPORTS_COPY.0
                | Self::SUPPORTS_MOVE.0,
        )
    }

    /// Set the given flag(s).
    #[inline]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// The raw bitmask value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Capability flags advertised for the root, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RootFlags(u32);

impl RootFlags {
    /// The root lives on local storage only.
    pub const LOCAL_ONLY: Self = Self(1 << 0);
    /// Documents may be created under this root.
    pub const SUPPORTS_CREATE: Self = Self(1 << 1);
    /// The root answers child-containment queries.
    pub const SUPPORTS_IS_CHILD: Self = Self(1 << 2);
    /// The root may be ejected.
    pub const SUPPORTS_EJECT: Self = Self(1 << 3);
    /// The root supports recursive search.
    pub const SUPPORTS_SEARCH: Self = Self(1 << 4);

    /// No capabilities.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set the given flag(s).
    #[inline]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// Columns a caller may request for result rows.
///
/// Document id and MIME type are always produced; the remaining columns
/// are filled only when the projection asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// The opaque document identifier.
    DocumentId,
    /// The document MIME type.
    MimeType,
    /// The bare filename.
    DisplayName,
    /// Last modification time, epoch milliseconds.
    LastModified,
    /// Capability flags.
    Flags,
    /// Size in bytes.
    Size,
}

/// The set of columns requested for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(Vec<Column>);

impl Projection {
    /// Projection with every supported column.
    pub fn all() -> Self {
        Self(vec![
            Column::DocumentId,
            Column::MimeType,
            Column::DisplayName,
            Column::LastModified,
            Column::Flags,
            Column::Size,
        ])
    }

    /// Projection with exactly the given columns.
    pub fn of(columns: impl Into<Vec<Column>>) -> Self {
        Self(columns.into())
    }

    /// Whether the caller asked for `column`.
    pub fn contains(&self, column: Column) -> bool {
        self.0.contains(&column)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::all()
    }
}

/// One result row describing a document.
///
/// Optional fields are `None` either because the projection did not
/// request them or because the value could not be retrieved (a
/// last-modified timestamp before the sanity floor, an unreadable size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    /// The opaque document identifier.
    pub doc_id: String,
    /// The document MIME type.
    pub mime_type: String,
    /// Capability flags, if projected.
    pub flags: Option<DocumentFlags>,
    /// Bare filename, if projected.
    pub display_name: Option<String>,
    /// Last modification time in epoch milliseconds, if projected and sane.
    pub last_modified: Option<u64>,
    /// Size in bytes, if projected and retrievable.
    pub size: Option<u64>,
}

/// The advertisement row for the single root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootInfo {
    /// Stable root identifier.
    pub root_id: String,
    /// Document id of the root directory.
    pub doc_id: String,
    /// Root capability flags.
    pub flags: RootFlags,
    /// Presentation title.
    pub title: String,
    /// Presentation summary.
    pub summary: String,
}

/// Filters for a recursive document search, combined in conjunction.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring to match against display names.
    pub display_name: Option<String>,
    /// Minimum file size in bytes.
    pub min_size: Option<u64>,
    /// Minimum last-modified time, epoch milliseconds.
    pub modified_after: Option<u64>,
    /// Acceptable MIME type patterns (`type/subtype`, `*` wildcards).
    /// Directories are matched as the directory MIME type. Empty means
    /// no filter.
    pub mime_types: Vec<String>,
}

/// Aggregate size and file count of a directory subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeSummary {
    /// Total bytes across all files in the subtree.
    pub size: u64,
    /// Number of files in the subtree.
    pub count: u64,
}

/// Resolved path segments between a parent document and a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    /// The parent document id the segments are relative to, if any.
    pub parent_doc_id: Option<String>,
    /// Path segments from parent to child.
    pub segments: Vec<String>,
}

/// Cooperative cancellation flag for long-running operations.
///
/// Cloning shares the flag. Only operations documented as honoring a
/// signal (search, thumbnail probing) check it.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// A fresh, un-cancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_flags_compose() {
        let flags = DocumentFlags::empty()
            .with(DocumentFlags::SUPPORTS_WRITE)
            .with(DocumentFlags::SUPPORTS_THUMBNAIL);
        assert!(flags.contains(DocumentFlags::SUPPORTS_WRITE));
        assert!(flags.contains(DocumentFlags::SUPPORTS_THUMBNAIL));
        assert!(!flags.contains(DocumentFlags::SUPPORTS_DELETE));
    }

    #[test]
    fn all_mutations_excludes_create_and_thumbnail() {
        let flags = DocumentFlags::all_mutations();
        assert!(flags.contains(DocumentFlags::SUPPORTS_WRITE));
        assert!(flags.contains(DocumentFlags::SUPPORTS_MOVE));
        assert!(!flags.contains(DocumentFlags::DIR_SUPPORTS_CREATE));
        assert!(!flags.contains(DocumentFlags::SUPPORTS_THUMBNAIL));
    }

    #[test]
    fn projection_membership() {
        let projection = Projection::of([Column::DocumentId, Column::Size]);
        assert!(projection.contains(Column::Size));
        assert!(!projection.contains(Column::Flags));
        assert!(Projection::all().contains(Column::Flags));
    }

    #[test]
    fn cancel_signal_is_shared_between_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DocumentFlags>();
        assert_send_sync::<RootFlags>();
        assert_send_sync::<DocumentRow>();
        assert_send_sync::<SearchQuery>();
        assert_send_sync::<CancelSignal>();
    }
}
