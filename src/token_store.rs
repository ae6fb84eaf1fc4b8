use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::Config;

const CONFIG_DIR: &str = "ioc_scoreboard";
const TOKEN_FILE: &str = "session_token";

/// Durable home of the session token. Presence of a token means "try to
/// resume"; absence means logged out.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Token file under the user's config dir, if one can be resolved.
    pub fn default_location() -> Option<Self> {
        token_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("create token dir")?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, token).context("write session token")?;
        fs::rename(&tmp, &self.path).context("swap session token")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("remove session token"),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// Store used by the binaries: nothing persists in demo mode, otherwise the
/// configured file, then the config dir, then memory.
pub fn for_config(config: &Config) -> Arc<dyn TokenStore> {
    if config.demo {
        return Arc::new(MemoryTokenStore::new());
    }
    match config
        .token_file
        .clone()
        .map(FileTokenStore::new)
        .or_else(FileTokenStore::default_location)
    {
        Some(store) => Arc::new(store),
        None => {
            warn!("no config dir for the session token, it will not survive restarts");
            Arc::new(MemoryTokenStore::new())
        }
    }
}

fn token_path() -> Option<PathBuf> {
    // Prefer XDG config.
    if let Ok(base) = std::env::var("XDG_CONFIG_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CONFIG_DIR).join(TOKEN_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join(TOKEN_FILE),
    )
}
