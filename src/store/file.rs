use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::TokenStore;
use crate::auth::Token;
use crate::error::{NotFoundError, Result, StorageError};

/// Store em disco: `{dir}/{domínio url-encoded}.json`.
///
/// Cada escrita vai para um arquivo temporário próprio no mesmo diretório e é
/// renomeada por cima do anterior, então um leitor nunca vê um token pela metade,
/// mesmo com escritas concorrentes no mesmo domínio.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(domain)))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, domain: &str, token: &Token) -> Result<()> {
        let path = self.path_for(domain);

        let body = serde_json::to_vec_pretty(token)
            .map_err(|e| StorageError::new(format!("failed to encode token: {}", e)))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(StorageError::from)?;

        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::result::Result<(), StorageError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| StorageError::from(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::new(format!("token writer task failed: {}", e)))??;

        tracing::debug!("💾 [FileTokenStore] Token salvo em {}", path.display());
        Ok(())
    }

    async fn load(&self, domain: &str) -> Result<Token> {
        let path = self.path_for(domain);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NotFoundError::new(domain).into())
            }
            Err(e) => return Err(StorageError::from(e).into()),
        };

        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::new(format!("corrupt token file {}: {}", path.display(), e)).into()
        })
    }

    async fn has_token(&self, domain: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(domain))
            .await
            .map_err(|e| StorageError::from(e).into())
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(domain)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from(e).into()),
        }
    }
}
