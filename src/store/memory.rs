use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::TokenStore;
use crate::auth::Token;
use crate::error::{NotFoundError, Result};

/// Store em memória, com vida igual à do processo
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, domain: &str, token: &Token) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(domain.to_string(), token.clone());
        Ok(())
    }

    async fn load(&self, domain: &str) -> Result<Token> {
        self.tokens
            .read()
            .await
            .get(domain)
            .cloned()
            .ok_or_else(|| NotFoundError::new(domain).into())
    }

    async fn has_token(&self, domain: &str) -> Result<bool> {
        Ok(self.tokens.read().await.contains_key(domain))
    }

    async fn remove(&self, domain: &str) -> Result<()> {
        self.tokens.write().await.remove(domain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn sample_token(access: &str) -> Token {
        Token::new(access, "refresh", Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryTokenStore::new();
        let token = sample_token("access-1");

        store.save("acme.amocrm.ru", &token).await.unwrap();
        assert_eq!(store.load("acme.amocrm.ru").await.unwrap(), token);
    }

    #[tokio::test]
    async fn test_has_token_before_and_after_save() {
        let store = MemoryTokenStore::new();
        assert!(!store.has_token("acme.amocrm.ru").await.unwrap());

        store.save("acme.amocrm.ru", &sample_token("a")).await.unwrap();
        assert!(store.has_token("acme.amocrm.ru").await.unwrap());
        assert!(!store.has_token("other.amocrm.ru").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = MemoryTokenStore::new();
        let err = store.load("acme.amocrm.ru").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref e) if e.domain == "acme.amocrm.ru"));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous() {
        let store = MemoryTokenStore::new();
        store.save("acme.amocrm.ru", &sample_token("old")).await.unwrap();
        store.save("acme.amocrm.ru", &sample_token("new")).await.unwrap();

        let loaded = store.load("acme.amocrm.ru").await.unwrap();
        assert_eq!(loaded.access_token, "new");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryTokenStore::new();
        store.save("acme.amocrm.ru", &sample_token("a")).await.unwrap();

        store.remove("acme.amocrm.ru").await.unwrap();
        assert!(!store.has_token("acme.amocrm.ru").await.unwrap());

        // remover de novo não é erro
        store.remove("acme.amocrm.ru").await.unwrap();
    }
}
