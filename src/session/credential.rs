//! Durable storage for the bearer token.
//!
//! The token cell is shared between the session store (login/logout) and the
//! HTTP client (401 handling). There is no coordination beyond the lock around
//! the cached value: the last write wins.

use parking_lot::RwLock;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// The stored token, if a non-empty one is held
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;

    fn is_present(&self) -> bool {
        self.load().is_some()
    }
}

/// Process-local token cell, used in tests and for `--token` style overrides
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(non_empty(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn store(&self, token: &str) -> io::Result<()> {
        *self.token.write() = non_empty(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.token.write() = None;
        Ok(())
    }
}

/// Token persisted to a single file so a session survives restarts
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileCredentialStore {
    /// Open the store, restoring any token already on disk.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let cached = match std::fs::read_to_string(&path) {
            Ok(content) => non_empty(content.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        debug!(
            path = %path.display(),
            restored = cached.is_some(),
            "Opened credential file"
        );
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        self.cached.read().clone()
    }

    fn store(&self, token: &str) -> io::Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return self.clear();
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        write_private(&self.path, token)?;
        *self.cached.write() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.cached.write() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Write `content` readable by the owner only; an existing file is tightened
/// to 0600 as well.
fn write_private(path: &Path, content: &str) -> io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        write_all(file, content)
    }
    #[cfg(not(unix))]
    {
        write_all(options.open(path)?, content)
    }
}

fn write_all(mut file: std::fs::File, content: &str) -> io::Result<()> {
    use std::io::Write;
    file.write_all(content.as_bytes())?;
    file.flush()
}

fn non_empty(token: String) -> Option<String> {
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
