//! The access-lock store.
//!
//! A process-wide, persisted lock flag with an optional password
//! digest. The provider binding consults [`LockStore::is_locked`]
//! before every operation and subscribes to transitions so it can
//! re-broadcast root visibility.
//!
//! Listeners are notified synchronously on the thread that changed the
//! state, on every actual transition — including transitions triggered
//! by operations other than explicit lock/unlock (ejecting the root
//! locks the store). Listeners must not block excessively and must not
//! re-enter state mutation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ProviderError;

/// Handle for a registered lock-state listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LockState {
    locked: bool,
    password_hash: Option<String>,
}

/// Persisted lock flag plus password digest.
///
/// Explicitly constructed by the composition root and shared by
/// reference (`Arc`). State is persisted as JSON at the path given to
/// [`LockStore::new`] — keep it outside the sandbox root so it is not
/// visible as a document.
pub struct LockStore {
    state_path: PathBuf,
    state: Mutex<LockState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl LockStore {
    /// Open the store, loading persisted state from `state_path`.
    ///
    /// A missing file means an unlocked store with no password. An
    /// unreadable or unparsable file is logged and treated the same
    /// way rather than failing the whole provider.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = Self::load(&state_path);
        Self {
            state_path,
            state: Mutex::new(state),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    fn load(path: &Path) -> LockState {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable lock state, resetting");
                LockState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LockState::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read lock state, resetting");
                LockState::default()
            }
        }
    }

    /// Whether the store is currently locked.
    pub fn is_locked(&self) -> bool {
        self.state.lock().expect("lock state poisoned").locked
    }

    /// Lock the store. Notifies listeners if this is a transition.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if the state cannot be persisted; the
    /// in-memory transition still happens.
    pub fn lock(&self) -> Result<(), ProviderError> {
        self.set_locked(true)
    }

    /// Unlock the store. Notifies listeners if this is a transition.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if the state cannot be persisted; the
    /// in-memory transition still happens.
    pub fn unlock(&self) -> Result<(), ProviderError> {
        self.set_locked(false)
    }

    fn set_locked(&self, locked: bool) -> Result<(), ProviderError> {
        let persist = {
            let mut state = self.state.lock().expect("lock state poisoned");
            if state.locked == locked {
                return Ok(());
            }
            state.locked = locked;
            self.persist(&state)
        };
        // State mutex is released before listeners run.
        self.notify(locked);
        if let Err(e) = &persist {
            tracing::error!(error = %e, "failed to persist lock state");
        }
        persist
    }

    /// Store the SHA-256 digest of `password`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if the state cannot be persisted.
    pub fn set_password(&self, password: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock state poisoned");
        state.password_hash = Some(hash_password(password));
        self.persist(&state)
    }

    /// Whether `password` matches the stored digest.
    ///
    /// Always `false` when no password is set.
    pub fn password_match(&self, password: &str) -> bool {
        let state = self.state.lock().expect("lock state poisoned");
        state
            .password_hash
            .as_deref()
            .is_some_and(|stored| stored == hash_password(password))
    }

    /// Whether a password is set.
    pub fn has_password(&self) -> bool {
        self.state
            .lock()
            .expect("lock state poisoned")
            .password_hash
            .is_some()
    }

    /// Remove the stored password digest.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Io`] if the state cannot be persisted.
    pub fn remove_password(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("lock state poisoned");
        state.password_hash = None;
        self.persist(&state)
    }

    /// Register a listener for lock transitions.
    ///
    /// The listener receives the new locked value, synchronously, on
    /// the thread performing the transition.
    pub fn add_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .push((id, Box::new(listener)));
        id
    }

    /// Deregister a listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .retain(|(lid, _)| *lid != id);
    }

    fn notify(&self, locked: bool) {
        let listeners = self.listeners.lock().expect("listener list poisoned");
        for (_, listener) in listeners.iter() {
            listener(locked);
        }
    }

    fn persist(&self, state: &LockState) -> Result<(), ProviderError> {
        let raw = serde_json::to_string_pretty(state).map_err(|e| {
            ProviderError::io("persist_lock", &self.state_path, std::io::Error::other(e))
        })?;
        std::fs::write(&self.state_path, raw)
            .map_err(|e| ProviderError::io("persist_lock", &self.state_path, e))
    }
}

impl std::fmt::Debug for LockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStore")
            .field("state_path", &self.state_path)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
