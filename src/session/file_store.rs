//! Default file-backed session store.
//!
//! One JSON file per session, named `<key>.wwrsess`, containing the key,
//! creation time and info attachment. Concurrent writes to the same key are
//! last-writer-wins; no durability guarantee is made.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Session, SessionManager};
use crate::client::Client;
use crate::error::{Error, Result};

/// File extension of stored sessions.
pub const SESSION_FILE_EXT: &str = "wwrsess";

/// Session manager persisting each session as one `.wwrsess` file.
#[derive(Debug, Clone)]
pub struct FileSessionManager {
    dir: PathBuf,
}

impl FileSessionManager {
    /// Create a file store rooted at the given directory. The directory is
    /// created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_file(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{SESSION_FILE_EXT}"))
    }
}

impl Default for FileSessionManager {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl SessionManager for FileSessionManager {
    async fn on_session_created(&self, client: &Arc<Client>) -> Result<()> {
        let session = client
            .session()
            .ok_or_else(|| Error::SessionManager("no session attached to the agent".into()))?;
        let encoded = serde_json::to_vec(&*session)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.session_file(&session.key), encoded).await?;
        Ok(())
    }

    async fn on_session_lookup(&self, key: &str) -> Result<Option<Session>> {
        match tokio::fs::read(self.session_file(key)).await {
            Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn on_session_closed(&self, client: &Arc<Client>) -> Result<()> {
        let Some(key) = client.session_key() else {
            return Ok(());
        };
        match tokio::fs::remove_file(self.session_file(&key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
