//! Local backup of the last fetched flag set.
//!
//! The backup lets a client start with known flags when the remote service
//! is unreachable. Loading is best effort: a missing or unreadable backup
//! just means starting empty.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use togglebox_core::{ChangeToken, ClientSettings, FlagSet};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Whatever a [`LocalCache`] could recover. Either half may be missing.
#[derive(Debug, Clone, Default)]
pub struct CachedToggles {
    pub flags: Option<FlagSet>,
    pub change_token: Option<ChangeToken>,
}

#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read the backup. Never fails; problems are logged and yield empty values.
    async fn load(&self) -> CachedToggles;

    /// Persist a freshly fetched flag set and the token it was fetched with.
    ///
    /// The caller drops this future when the client stops, so a save may be
    /// abandoned at any await point. Implementations must leave the previous
    /// backup readable when that happens.
    async fn save(
        &self,
        flags: &FlagSet,
        change_token: Option<&ChangeToken>,
    ) -> Result<(), CacheError>;
}

// ── File cache ─────────────────────────────────────────────────

/// JSON flag set plus a plain-text ETag file, side by side on disk.
///
/// ```text
/// {cache_dir}/
///   {app}.toggles.json   <- {"version":1,"features":[...]}
///   {app}.toggles.etag   <- last change token
/// ```
#[derive(Debug, Clone)]
pub struct FileCache {
    toggle_path: PathBuf,
    etag_path: PathBuf,
}

impl FileCache {
    pub fn new(toggle_path: impl Into<PathBuf>, etag_path: impl Into<PathBuf>) -> Self {
        Self {
            toggle_path: toggle_path.into(),
            etag_path: etag_path.into(),
        }
    }

    /// Backup files derived from the settings' cache dir and app name.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.toggle_backup_path(), settings.etag_backup_path())
    }

    pub fn toggle_path(&self) -> &Path {
        &self.toggle_path
    }

    pub fn etag_path(&self) -> &Path {
        &self.etag_path
    }

    async fn load_flags(&self) -> Option<FlagSet> {
        let json = match tokio::fs::read_to_string(&self.toggle_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.toggle_path.display(), "no toggle backup found");
                return None;
            }
            Err(e) => {
                warn!(path = %self.toggle_path.display(), error = %e, "failed to read toggle backup");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(flags) => Some(flags),
            Err(e) => {
                warn!(path = %self.toggle_path.display(), error = %e, "ignoring corrupt toggle backup");
                None
            }
        }
    }

    async fn load_token(&self) -> Option<ChangeToken> {
        match tokio::fs::read_to_string(&self.etag_path).await {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| ChangeToken::new(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.etag_path.display(), error = %e, "failed to read etag backup");
                None
            }
        }
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn load(&self) -> CachedToggles {
        let flags = self.load_flags().await;
        // A token without the flags it describes would suppress the next full fetch.
        let change_token = match flags {
            Some(_) => self.load_token().await,
            None => None,
        };
        CachedToggles { flags, change_token }
    }

    async fn save(
        &self,
        flags: &FlagSet,
        change_token: Option<&ChangeToken>,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(flags)?;
        write_replacing(&self.toggle_path, json.as_bytes()).await?;

        let token = change_token.map(ChangeToken::as_str).unwrap_or_default();
        write_replacing(&self.etag_path, token.as_bytes()).await?;

        debug!(
            path = %self.toggle_path.display(),
            toggles = flags.len(),
            "saved toggle backup"
        );
        Ok(())
    }
}

/// Write to a sibling temp file, then rename over the target so readers
/// never see a half-written backup.
async fn write_replacing(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

// ── In-memory cache ────────────────────────────────────────────

/// Process-local cache. Useful when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<CachedToggles>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out holding `flags`, as if a previous run had saved them.
    pub fn seeded(flags: FlagSet, change_token: Option<ChangeToken>) -> Self {
        Self {
            inner: Mutex::new(CachedToggles {
                flags: Some(flags),
                change_token,
            }),
        }
    }

    pub fn snapshot(&self) -> CachedToggles {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn load(&self) -> CachedToggles {
        self.snapshot()
    }

    async fn save(
        &self,
        flags: &FlagSet,
        change_token: Option<&ChangeToken>,
    ) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.flags = Some(flags.clone());
        inner.change_token = change_token.cloned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use togglebox_core::FeatureToggle;

    fn sample_flags() -> FlagSet {
        FlagSet::new([
            FeatureToggle::new("checkout-v2", true),
            FeatureToggle::new("dark-mode", false),
        ])
    }

    fn cache_in(dir: &Path) -> FileCache {
        FileCache::new(dir.join("app.toggles.json"), dir.join("app.toggles.etag"))
    }

    #[tokio::test]
    async fn missing_backup_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = cache_in(dir.path()).load().await;
        assert!(loaded.flags.is_none());
        assert!(loaded.change_token.is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir.path().join("nested"));
        let token = ChangeToken::new("\"etag-42\"");

        cache.save(&sample_flags(), Some(&token)).await.unwrap();
        let loaded = cache.load().await;

        let flags = loaded.flags.unwrap();
        assert_eq!(flags.len(), 2);
        assert!(flags.get("checkout-v2").unwrap().enabled);
        assert_eq!(loaded.change_token, Some(token));
    }

    #[tokio::test]
    async fn corrupt_backup_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        std::fs::write(cache.toggle_path(), "{not json").unwrap();
        std::fs::write(cache.etag_path(), "etag-1").unwrap();

        let loaded = cache.load().await;
        assert!(loaded.flags.is_none());
        assert!(loaded.change_token.is_none(), "token without flags is dropped");
    }

    #[tokio::test]
    async fn save_without_token_clears_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        cache
            .save(&sample_flags(), Some(&ChangeToken::new("old")))
            .await
            .unwrap();
        cache.save(&sample_flags(), None).await.unwrap();

        assert!(cache.load().await.change_token.is_none());
    }

    #[tokio::test]
    async fn memory_cache_keeps_last_save() {
        let cache = MemoryCache::new();
        assert!(cache.load().await.flags.is_none());

        cache
            .save(&sample_flags(), Some(&ChangeToken::new("v1")))
            .await
            .unwrap();
        let loaded = cache.load().await;
        assert_eq!(loaded.flags.unwrap().len(), 2);
        assert_eq!(loaded.change_token.unwrap().as_str(), "v1");
    }
}
