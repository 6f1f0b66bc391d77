//! MIME type registry and filter matching.
//!
//! Replaces the host platform's MIME registry with a local
//! extension↔type table. Lookups are case-insensitive on the extension
//! side; reverse lookups return the canonical (first listed) extension
//! for a type.

use crate::ProviderError;

/// MIME type describing a directory entry.
pub const MIME_TYPE_DIRECTORY: &str = "inode/directory";

/// Fallback MIME type for files with no (or unknown) extension.
pub const MIME_TYPE_DEFAULT: &str = "application/octet-stream";

/// Extension → MIME type table.
///
/// Order matters for reverse lookups: the first extension listed for a
/// type is its canonical extension (`jpg` over `jpeg`).
const REGISTRY: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("xml", "text/xml"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("heic", "image/heic"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/x-wav"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("bin", "application/octet-stream"),
];

/// Look up the MIME type implied by a file extension.
///
/// The extension is matched case-insensitively and must not include the
/// leading dot. Returns `None` for unknown extensions.
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    REGISTRY
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Look up the canonical extension for a MIME type.
///
/// Returns `None` for unknown types and for [`MIME_TYPE_DIRECTORY`].
pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    REGISTRY.iter().find(|(_, m)| *m == mime).map(|(e, _)| *e)
}

/// Test a MIME type against a `type/subtype` filter.
///
/// Either filter segment may be the `*` wildcard (`image/*`, `*/*`).
/// A `None` MIME type matches nothing.
///
/// # Errors
///
/// [`ProviderError::InvalidFilter`] if the filter is not exactly two
/// non-empty `/`-separated segments. Raised immediately, before the
/// MIME type is inspected.
pub fn mime_type_matches(mime: Option<&str>, filter: &str) -> Result<bool, ProviderError> {
    let parts: Vec<&str> = filter.split('/').collect();
    if parts.len() != 2 {
        return Err(ProviderError::InvalidFilter {
            filter: filter.to_string(),
            reason: "must be type/subtype",
        });
    }
    if parts[0].is_empty() || parts[1].is_empty() {
        return Err(ProviderError::InvalidFilter {
            filter: filter.to_string(),
            reason: "type or subtype empty",
        });
    }

    let Some(mime) = mime else {
        return Ok(false);
    };
    let mime_parts: Vec<&str> = mime.split('/').collect();
    if mime_parts.len() != 2 {
        return Ok(false);
    }
    if parts[0] != "*" && parts[0] != mime_parts[0] {
        return Ok(false);
    }
    Ok(parts[1] == "*" || parts[1] == mime_parts[1])
}
