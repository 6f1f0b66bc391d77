//! File-name construction and subtree deletion.
//!
//! Builds FAT-safe, MIME-aware, collision-free names for newly created
//! documents, and owns the recursive-delete primitive the engine uses
//! for directory removal.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::mime::{self, MIME_TYPE_DEFAULT, MIME_TYPE_DIRECTORY};
use crate::ProviderError;

/// Placeholder used when a display name sanitizes to nothing.
const INVALID_NAME: &str = "(invalid)";

/// Maximum number of ` (n)` suffixes probed before giving up.
const MAX_UNIQUE_ATTEMPTS: u32 = 32;

/// Mutate a display name so it is valid on a FAT filesystem.
///
/// Control characters (0x00–0x1F), `" * / : < > ? \ |` and 0x7F are each
/// replaced with `_`. An empty name, or exactly `.`, becomes
/// `(invalid)`.
pub fn build_valid_file_name(name: &str) -> String {
    if name.is_empty() || name == "." {
        return INVALID_NAME.to_string();
    }
    name.chars()
        .map(|c| if is_valid_fat_char(c) { c } else { '_' })
        .collect()
}

fn is_valid_fat_char(c: char) -> bool {
    if (c as u32) <= 0x1f || c as u32 == 0x7f {
        return false;
    }
    !matches!(c, '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|')
}

/// Split a display name into base name and extension, reconciling the
/// typed extension with the caller's MIME type.
///
/// For [`MIME_TYPE_DIRECTORY`] the display name is the base and there is
/// no extension. Otherwise the extension typed by the user is kept only
/// when it is compatible with the requested MIME type (the extension
/// implies that type, or the type implies that extension). On a
/// mismatch the whole display name becomes the base and the extension
/// implied by the requested MIME type is appended instead — the
/// caller's MIME type wins. A requested type of
/// [`MIME_TYPE_DEFAULT`] implies no extension.
///
/// The returned extension is `""` when there is none.
pub fn split_file_name(mime_type: &str, display_name: &str) -> (String, String) {
    if mime_type == MIME_TYPE_DIRECTORY {
        return (display_name.to_string(), String::new());
    }

    let (name, ext, mime_from_ext) = match display_name.rfind('.') {
        Some(dot) => {
            let ext = &display_name[dot + 1..];
            (
                &display_name[..dot],
                Some(ext),
                mime::mime_from_extension(ext).unwrap_or(MIME_TYPE_DEFAULT),
            )
        }
        None => (display_name, None, MIME_TYPE_DEFAULT),
    };

    let ext_from_mime = if mime_type == MIME_TYPE_DEFAULT {
        None
    } else {
        mime::extension_from_mime(mime_type)
    };

    if mime_type == mime_from_ext || ext == ext_from_mime {
        (
            name.to_string(),
            ext.map(str::to_owned).unwrap_or_default(),
        )
    } else {
        // No match; insist that the created file matches the requested MIME
        (
            display_name.to_string(),
            ext_from_mime.map(str::to_owned).unwrap_or_default(),
        )
    }
}

/// Build a path under `parent` that does not exist, reconciling the
/// display name with the requested MIME type first.
///
/// Probes `name.ext`, then `name (1).ext`, `name (2).ext`, and so on.
///
/// # Errors
///
/// A not-found I/O failure after 32 colliding probes.
pub fn build_unique_path(
    parent: &Path,
    mime_type: &str,
    display_name: &str,
) -> Result<PathBuf, ProviderError> {
    let (name, ext) = split_file_name(mime_type, display_name);
    build_unique_path_with_extension(parent, &name, &ext)
}

/// Build a path under `parent` that does not exist, keeping whatever
/// extension the display name already has.
///
/// Used by copy and rename, where no MIME type is being requested.
///
/// # Errors
///
/// A not-found I/O failure after 32 colliding probes.
pub fn build_unique_path_keeping_extension(
    parent: &Path,
    display_name: &str,
) -> Result<PathBuf, ProviderError> {
    let (name, ext) = match display_name.rfind('.') {
        Some(dot) => (&display_name[..dot], &display_name[dot + 1..]),
        None => (display_name, ""),
    };
    build_unique_path_with_extension(parent, name, ext)
}

fn build_unique_path_with_extension(
    parent: &Path,
    name: &str,
    ext: &str,
) -> Result<PathBuf, ProviderError> {
    let mut path = build_path(parent, name, ext);

    let mut n = 0;
    while path.exists() {
        if n >= MAX_UNIQUE_ATTEMPTS {
            return Err(ProviderError::io(
                "build_unique_path",
                path,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "failed to build a unique file name",
                ),
            ));
        }
        n += 1;
        path = build_path(parent, &format!("{name} ({n})"), ext);
    }
    Ok(path)
}

fn build_path(parent: &Path, name: &str, ext: &str) -> PathBuf {
    if ext.is_empty() {
        parent.join(name)
    } else {
        parent.join(format!("{name}.{ext}"))
    }
}

/// Compute the MIME type of a document.
///
/// Directories map to [`MIME_TYPE_DIRECTORY`]. Files are typed by the
/// document id's extension (lowercased), not the on-disk name, falling
/// back to [`MIME_TYPE_DEFAULT`] when there is no extension or no
/// registry match.
pub fn document_type(doc_id: &str, path: &Path) -> &'static str {
    if path.is_dir() {
        return MIME_TYPE_DIRECTORY;
    }
    match doc_id.rfind('.') {
        Some(dot) => mime::mime_from_extension(&doc_id[dot + 1..]).unwrap_or(MIME_TYPE_DEFAULT),
        None => MIME_TYPE_DEFAULT,
    }
}

/// Recursively delete everything inside `path`, leaving `path` itself in
/// place.
///
/// Files are removed before their parent directories (post-order). The
/// caller deletes `path` separately if desired.
///
/// # Errors
///
/// The first I/O failure encountered; already-deleted entries do not
/// abort the walk.
pub fn delete_contents(path: &Path) -> Result<(), ProviderError> {
    for entry in WalkDir::new(path).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk failed"));
            ProviderError::io("delete_contents", path, io)
        })?;
        let target = entry.path();
        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir(target)
        } else {
            std::fs::remove_file(target)
        };
        result.map_err(|e| ProviderError::io("delete_contents", target, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name_passes_through() {
        assert_eq!(build_valid_file_name("report.txt"), "report.txt");
        assert_eq!(build_valid_file_name("über straße"), "über straße");
    }

    #[test]
    fn illegal_characters_become_underscores() {
        assert_eq!(build_valid_file_name("a/b:c"), "a_b_c");
        assert_eq!(build_valid_file_name("x<y>z?"), "x_y_z_");
        assert_eq!(build_valid_file_name("tab\there"), "tab_here");
    }

    #[test]
    fn degenerate_names_become_placeholder() {
        assert_eq!(build_valid_file_name(""), "(invalid)");
        assert_eq!(build_valid_file_name("."), "(invalid)");
    }

    #[test]
    fn split_appends_extension_for_bare_name() {
        let (name, ext) = split_file_name("text/plain", "notes");
        assert_eq!(name, "notes");
        assert_eq!(ext, "txt");
    }

    #[test]
    fn split_keeps_compatible_extension() {
        let (name, ext) = split_file_name("text/plain", "notes.txt");
        assert_eq!(name, "notes");
        assert_eq!(ext, "txt");
    }

    #[test]
    fn split_replaces_incompatible_extension() {
        // The typed extension folds into the base name; the extension
        // implied by the requested MIME type is appended.
        let (name, ext) = split_file_name("text/plain", "notes.bin");
        assert_eq!(name, "notes.bin");
        assert_eq!(ext, "txt");
    }

    #[test]
    fn split_directory_has_no_extension() {
        let (name, ext) = split_file_name(MIME_TYPE_DIRECTORY, "My Folder.d");
        assert_eq!(name, "My Folder.d");
        assert_eq!(ext, "");
    }

    #[test]
    fn split_default_mime_keeps_any_extension() {
        let (name, ext) = split_file_name(MIME_TYPE_DEFAULT, "data.xyz");
        assert_eq!(name, "data");
        assert_eq!(ext, "xyz");
    }

    #[test]
    fn unique_path_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.txt"), b"").unwrap();
        std::fs::write(dir.path().join("foo (1).txt"), b"").unwrap();

        let path = build_unique_path(dir.path(), "text/plain", "foo.txt").unwrap();
        assert_eq!(path, dir.path().join("foo (2).txt"));
        assert!(!path.exists());
    }

    #[test]
    fn unique_path_fails_after_32_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.txt"), b"").unwrap();
        for n in 1..=32 {
            std::fs::write(dir.path().join(format!("foo ({n}).txt")), b"").unwrap();
        }

        let err = build_unique_path(dir.path(), "text/plain", "foo.txt").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn document_type_prefers_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            document_type("locker_root/x.txt", dir.path()),
            MIME_TYPE_DIRECTORY
        );
    }

    #[test]
    fn document_type_uses_doc_id_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(document_type("locker_root/a.PNG", &file), "image/png");
        assert_eq!(document_type("locker_root/a", &file), MIME_TYPE_DEFAULT);
    }

    #[test]
    fn delete_contents_leaves_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("f.txt"), b"data").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"data").unwrap();

        delete_contents(dir.path()).unwrap();
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
