//! Open modes and the document handle returned by open operations.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::ProviderError;

/// Access mode for opening a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Append writes to the end.
    pub append: bool,
}

impl OpenMode {
    /// Strict read-only access.
    pub const READ: Self = Self {
        read: true,
        write: false,
        truncate: false,
        append: false,
    };

    /// Write access with truncation.
    pub const WRITE_TRUNCATE: Self = Self {
        read: false,
        write: true,
        truncate: true,
        append: false,
    };

    /// Parse a platform-convention mode string.
    ///
    /// Recognized: `r`, `w`, `wt`, `wa`, `rw`, `rwt`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnsupportedMode`] for unrecognized mode strings.
    pub fn parse(mode: &str) -> Result<Self, ProviderError> {
        let parsed = match mode {
            "r" => Self::READ,
            "w" | "wt" => Self::WRITE_TRUNCATE,
            "wa" => Self {
                read: false,
                write: true,
                truncate: false,
                append: true,
            },
            "rw" => Self {
                read: true,
                write: true,
                truncate: false,
                append: false,
            },
            "rwt" => Self {
                read: true,
                write: true,
                truncate: true,
                append: false,
            },
            _ => {
                return Err(ProviderError::UnsupportedMode {
                    mode: mode.to_string(),
                });
            }
        };
        Ok(parsed)
    }

    /// Whether this mode can neither write nor truncate.
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        !self.write && !self.truncate
    }

    pub(crate) fn open_options(&self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .truncate(self.truncate)
            .append(self.append)
            .create(self.write);
        options
    }
}

/// An open document backed by a real file.
///
/// For any mode other than strict read-only the engine attaches an
/// on-close hook that notifies a change and requests a media rescan.
/// The hook is owned by the handle and fires exactly once when the
/// handle is dropped — on every exit path, normal or not.
pub struct DocumentHandle {
    file: File,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl DocumentHandle {
    pub(crate) fn new(file: File, on_close: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self { file, on_close }
    }

    /// The underlying file.
    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Read for DocumentHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for DocumentHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for DocumentHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("has_close_hook", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn parse_recognizes_platform_modes() {
        assert!(OpenMode::parse("r").unwrap().is_read_only());
        assert!(OpenMode::parse("w").unwrap().truncate);
        assert!(OpenMode::parse("wa").unwrap().append);
        assert!(OpenMode::parse("rw").unwrap().read);
        assert!(OpenMode::parse("rwt").unwrap().truncate);
        assert!(OpenMode::parse("x").is_err());
    }

    #[test]
    fn close_hook_fires_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, b"data").unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&fired);
        {
            let file = File::open(&path).unwrap();
            let _handle = DocumentHandle::new(file, Some(Box::new(move || {
                seen.store(true, Ordering::SeqCst);
            })));
            assert!(!fired.load(Ordering::SeqCst));
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn handle_reads_through() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, b"payload").unwrap();

        let mut handle = DocumentHandle::new(File::open(&path).unwrap(), None);
        let mut contents = String::new();
        handle.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "payload");
    }
}
