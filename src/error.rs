//! Error types for the document-provider core.

use std::path::PathBuf;

/// Error type for every provider operation, with contextual variants.
///
/// All variants carry the context needed to act on the failure (document
/// id, path, operation). Uses `#[non_exhaustive]` for forward
/// compatibility.
///
/// Locked-state short-circuits ([`ProviderError::AuthenticationRequired`])
/// are raised before any path resolution is attempted; resolution failures
/// are threaded through operations as values and only surface at the
/// public operation boundary.
///
/// # Examples
///
/// ```rust
/// use lockerfs::ProviderError;
///
/// let err = ProviderError::NotFound { doc_id: "locker_root/missing.txt".into() };
/// assert!(err.to_string().contains("missing.txt"));
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A document id failed to resolve to an existing path.
    #[error("not found: {doc_id}")]
    NotFound {
        /// The document id that did not resolve.
        doc_id: String,
    },

    /// The operation requires the store to be unlocked.
    ///
    /// Carries a hint the caller can use to relaunch the unlock flow and
    /// retry the operation afterwards.
    #[error("authentication required (unlock via {unlock_hint})")]
    AuthenticationRequired {
        /// Where the caller should send the user to unlock the store.
        unlock_hint: String,
    },

    /// An I/O operation failed for a reason other than absence.
    ///
    /// No partial-completion rollback is attempted; the cause is logged
    /// before this is surfaced.
    #[error("{operation} failed unrecoverably")]
    IllegalState {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<ProviderError>,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: PathBuf,
    },

    /// A MIME type filter string is malformed.
    ///
    /// Filters must be exactly `type/subtype` with both segments
    /// non-empty (`*` wildcards allowed). Raised immediately at the call
    /// boundary, never deferred.
    #[error("invalid MIME filter {filter:?}: {reason}")]
    InvalidFilter {
        /// The offending filter string.
        filter: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An access-mode string could not be parsed.
    #[error("unsupported access mode {mode:?}")]
    UnsupportedMode {
        /// The mode string the caller supplied.
        mode: String,
    },

    /// The home environment could not be resolved.
    #[error("configuration error at {path}: {reason}")]
    Config {
        /// The path that failed to resolve as the sandbox root.
        path: PathBuf,
        /// Why resolution failed.
        reason: String,
    },

    /// I/O error with operation and path context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    /// Attach operation and path context to a raw I/O error.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProviderError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap a failure as an unrecoverable state for `operation`.
    pub fn illegal_state(operation: &'static str, source: ProviderError) -> Self {
        ProviderError::IllegalState {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether this is a not-found failure (directly or wrapped).
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound { .. } => true,
            ProviderError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = ProviderError::NotFound {
            doc_id: "locker_root/a/b".into(),
        };
        assert_eq!(err.to_string(), "not found: locker_root/a/b");
    }

    #[test]
    fn io_display_includes_operation_and_path() {
        let err = ProviderError::io(
            "create",
            "/locker/file.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("create"));
        assert!(msg.contains("/locker/file.txt"));
    }

    #[test]
    fn illegal_state_preserves_cause() {
        let cause = ProviderError::io(
            "copy",
            "/locker/a",
            std::io::Error::new(std::io::ErrorKind::StorageFull, "full"),
        );
        let err = ProviderError::illegal_state("copy_document", cause);
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("/locker/a"));
    }

    #[test]
    fn is_not_found_sees_through_io() {
        let err = ProviderError::io(
            "open",
            "/locker/gone",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());

        let err = ProviderError::InvalidFilter {
            filter: "bad".into(),
            reason: "must be type/subtype",
        };
        assert!(!err.is_not_found());
    }
}
