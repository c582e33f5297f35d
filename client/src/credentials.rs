//! Durable storage for the session's credential pair.
//!
//! The pair survives restarts: it is written as JSON under the platform data
//! directory using a temp-file + rename pattern so no reader ever observes a
//! half-written file. In-memory access goes through a mutex, so concurrent
//! readers never observe a half-replaced pair either. Every `replace`/`clear`
//! is published on a watch channel so session state follows a renewal without
//! re-reading storage.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pomokan_types::Credential;
use tokio::sync::watch;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Holder of the current access/refresh pair.
///
/// `get`, `replace` and `clear` are synchronous and atomic with respect to
/// concurrent readers. Persistence is best-effort: a storage failure is
/// logged, never propagated - losing durability must not take the session
/// down with it.
#[derive(Debug)]
pub struct CredentialStore {
    current: Mutex<Option<Credential>>,
    listener: watch::Sender<Option<Credential>>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// Store backed by the platform data directory
    /// (e.g. `~/.local/share/pomokan/credentials.json`).
    pub fn open() -> std::io::Result<Self> {
        let Some(data_dir) = dirs::data_dir() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine platform data directory",
            ));
        };
        Ok(Self::at_path(data_dir.join("pomokan").join(CREDENTIALS_FILE)))
    }

    /// Store backed by an explicit file. Loads the persisted pair if one
    /// exists; an unreadable or corrupt file starts the session logged out.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = load_if_exists(&path);
        let (listener, _) = watch::channel(current.clone());
        Self {
            current: Mutex::new(current),
            listener,
            path: Some(path),
        }
    }

    /// Store with no durability. Used by tests and ephemeral sessions.
    #[must_use]
    pub fn in_memory() -> Self {
        let (listener, _) = watch::channel(None);
        Self {
            current: Mutex::new(None),
            listener,
            path: None,
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.current.lock().expect("credential mutex poisoned").clone()
    }

    /// Replace the pair wholesale and notify listeners.
    pub fn replace(&self, credential: Credential) {
        {
            let mut current = self.current.lock().expect("credential mutex poisoned");
            *current = Some(credential.clone());
        }
        if let Some(path) = &self.path {
            persist(path, &credential);
        }
        self.listener.send_replace(Some(credential));
    }

    /// Drop the pair. Idempotent.
    pub fn clear(&self) {
        {
            let mut current = self.current.lock().expect("credential mutex poisoned");
            *current = None;
        }
        if let Some(path) = &self.path
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!(path = %path.display(), "Failed to remove persisted credentials: {e}");
        }
        self.listener.send_replace(None);
    }

    /// Watch the pair. The receiver's value tracks every `replace`/`clear`,
    /// including renewals performed by the gateway.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Credential>> {
        self.listener.subscribe()
    }
}

fn load_if_exists(path: &Path) -> Option<Credential> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Corrupt credential file, ignoring: {e}");
                None
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read credential file: {e}");
            None
        }
    }
}

/// Write the pair atomically: temp file in the same directory, then rename.
/// On Unix the file is restricted to the owner before any bytes land in it.
fn persist(path: &Path, credential: &Credential) {
    if let Err(e) = try_persist(path, credential) {
        tracing::warn!(path = %path.display(), "Failed to persist credentials: {e}");
    }
}

fn try_persist(path: &Path, credential: &Credential) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    let bytes = serde_json::to_vec(credential)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;

    // Rename over any existing file; half-written state is never visible.
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
