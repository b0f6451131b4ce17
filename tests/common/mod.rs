//! Helpers compartilhados pelos testes de integração

#![allow(dead_code)]

use std::sync::Arc;

use amocrm::{AmoCrmClient, MemoryTokenStore, OAuth2Client, Settings, Token, TokenManager, TokenStore};
use chrono::{Duration, Utc};
use wiremock::MockServer;

pub const DOMAIN: &str = "acme.amocrm.ru";

pub fn settings_for(server: &MockServer) -> Settings {
    Settings::new("client-id", "client-secret", "https://myapp.com/oauth/callback")
        .with_base_url(server.uri())
}

pub fn manager_with_store(server: &MockServer, store: Arc<dyn TokenStore>) -> Arc<TokenManager> {
    let settings = settings_for(server);
    let oauth = OAuth2Client::new(settings.clone(), settings.http_client().unwrap());
    Arc::new(TokenManager::new(store, oauth, settings.refresh_skew()))
}

pub fn client_with_manager(server: &MockServer, tokens: Arc<TokenManager>) -> AmoCrmClient {
    AmoCrmClient::new(&settings_for(server), DOMAIN, tokens).unwrap()
}

/// Store em memória já com um token salvo para [`DOMAIN`]
pub async fn store_with(token: &Token) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store.save(DOMAIN, token).await.unwrap();
    store
}

pub fn expired_token() -> Token {
    Token::new("access-old", "refresh-old", Utc::now() - Duration::minutes(5))
}

pub fn valid_token(access: &str) -> Token {
    Token::new(access, "refresh-old", Utc::now() + Duration::hours(1))
}

pub fn token_body(access: &str) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "expires_in": 86400,
        "access_token": access,
        "refresh_token": format!("refresh-for-{}", access)
    })
}
