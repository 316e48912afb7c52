use crate::core::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Key the session token is stored under
pub const TOKEN_KEY: &str = "attendance_app_token";

/// Durable storage for the single auth token
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, StorageError>;

    async fn set(&self, token: &str) -> Result<(), StorageError>;

    async fn delete(&self) -> Result<(), StorageError>;
}

/// Process-local store; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: DashMap<&'static str, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(TOKEN_KEY).map(|entry| entry.value().clone()))
    }

    async fn set(&self, token: &str) -> Result<(), StorageError> {
        self.entries.insert(TOKEN_KEY, token.to_string());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.entries.remove(TOKEN_KEY);
        Ok(())
    }
}

/// Token kept in a single file readable only by the owner
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/attendance/<TOKEN_KEY>`
    pub fn default_path() -> Result<PathBuf, StorageError> {
        let base = dirs::data_local_dir().ok_or(StorageError::NoDataDir)?;
        Ok(base.join("attendance").join(TOKEN_KEY))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, token: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(token.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), "Token written");
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Persistent store that degrades to memory when the file cannot be used
pub struct FallbackTokenStore<P> {
    primary: P,
    memory: MemoryTokenStore,
}

impl<P: TokenStore> FallbackTokenStore<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            memory: MemoryTokenStore::new(),
        }
    }
}

#[async_trait]
impl<P: TokenStore> TokenStore for FallbackTokenStore<P> {
    async fn get(&self) -> Result<Option<String>, StorageError> {
        match self.primary.get().await {
            Ok(Some(token)) => Ok(Some(token)),
            // a failed write leaves no file behind, the token lives in memory
            Ok(None) => self.memory.get().await,
            Err(e) => {
                warn!(error = %e, "Token read failed, using in-memory store");
                self.memory.get().await
            }
        }
    }

    async fn set(&self, token: &str) -> Result<(), StorageError> {
        if let Err(e) = self.primary.set(token).await {
            warn!(error = %e, "Token write failed, using in-memory store");
            return self.memory.set(token).await;
        }
        self.memory.delete().await
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.memory.delete().await?;
        if let Err(e) = self.primary.delete().await {
            warn!(error = %e, "Token delete failed, in-memory copy cleared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get().await.unwrap(), None);

        store.set("abc").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("abc"));

        store.set("def").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("def"));

        store.delete().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(TOKEN_KEY);

        FileTokenStore::new(&path).set("jwt-token").await.unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get().await.unwrap().as_deref(), Some("jwt-token"));

        reopened.delete().await.unwrap();
        assert_eq!(reopened.get().await.unwrap(), None);
        // deleting twice is fine
        reopened.delete().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TOKEN_KEY);
        FileTokenStore::new(&path).set("secret").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_fallback_store_uses_memory_when_file_unusable() {
        let dir = TempDir::new().unwrap();
        // a directory where the file should be makes every file operation fail
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();

        let store = FallbackTokenStore::new(FileTokenStore::new(&blocked));
        store.set("tok").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("tok"));

        store.delete().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_fallback_store_reads_memory_when_file_never_written() {
        // the parent directory cannot be created, so reads see no file at all
        let store = FallbackTokenStore::new(FileTokenStore::new(
            "/proc/self/no_such_dir/attendance_app_token",
        ));
        assert_eq!(store.get().await.unwrap(), None);

        store.set("tok").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("tok"));

        store.delete().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fallback_store_prefers_file_once_writable() {
        let dir = TempDir::new().unwrap();
        let store = FallbackTokenStore::new(FileTokenStore::new(dir.path().join(TOKEN_KEY)));
        store.memory.set("stale").await.unwrap();

        store.set("fresh").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(store.memory.get().await.unwrap(), None);
    }
}
