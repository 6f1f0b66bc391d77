//! Sandbox root resolution.
//!
//! Resolves the single directory the provider is scoped to, once, at
//! composition time. The resolved environment is an explicitly
//! constructed service: the composition root owns it and hands it to
//! consumers by reference.

use std::path::{Path, PathBuf};

use crate::ProviderError;

/// Stable identifier of the single root.
pub const ROOT_ID: &str = "lockerfs.root";

/// Document id of the root directory. Every other document id starts
/// with this prefix.
pub const ROOT_DOC_ID: &str = "locker_root";

/// Authority string used when building notification URIs.
pub const AUTHORITY: &str = "lockerfs.documents";

/// Where the sandbox root may come from, in resolution order.
#[derive(Debug, Clone, Default)]
pub struct HomeConfig {
    /// Explicit user-configured directory; wins when set.
    pub preferred: Option<PathBuf>,
    /// Removable-storage candidates, listed in priority order. Scanned
    /// in reverse so the last viable (existing directory) candidate is
    /// chosen first.
    pub candidates: Vec<PathBuf>,
    /// App-private fallback, used when nothing else resolves.
    pub fallback: PathBuf,
}

/// The resolved sandbox root.
///
/// Construction resolves and (if needed) creates the base directory;
/// it fails with [`ProviderError::Config`] if the resolved path exists
/// but is not a directory. One instance per process.
#[derive(Debug)]
pub struct HomeEnvironment {
    base_dir: PathBuf,
}

impl HomeEnvironment {
    /// Resolve the sandbox root from `config`.
    ///
    /// Resolution order: explicit preferred directory, then the last
    /// viable candidate (scanning `config.candidates` in reverse), then
    /// the fallback. The chosen directory is created when absent.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Config`] if the resolved path exists but is
    ///   not a directory
    /// - [`ProviderError::Io`] if the directory cannot be created
    pub fn new(config: HomeConfig) -> Result<Self, ProviderError> {
        let base_dir = Self::resolve(&config);

        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)
                .map_err(|e| ProviderError::io("create_home", &base_dir, e))?;
            tracing::debug!(base_dir = %base_dir.display(), "created sandbox root");
        } else if !base_dir.is_dir() {
            return Err(ProviderError::Config {
                path: base_dir,
                reason: "exists but is not a directory".into(),
            });
        }

        Ok(Self { base_dir })
    }

    fn resolve(config: &HomeConfig) -> PathBuf {
        if let Some(preferred) = &config.preferred {
            return preferred.clone();
        }
        for candidate in config.candidates.iter().rev() {
            if candidate.is_dir() {
                return candidate.clone();
            }
        }
        config.fallback.clone()
    }

    /// The resolved base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether `path` is exactly the sandbox root.
    pub fn is_root(&self, path: &Path) -> bool {
        self.base_dir == path
    }
}
