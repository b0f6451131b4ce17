//! # amoCRM OAuth2 Authentication Module
//!
//! ## Responsabilidades:
//! - Trocar authorization code por token (autorização inicial)
//! - Renovar tokens via refresh token, um refresh por domínio por vez
//! - Manter o cache em memória coerente com o [`TokenStore`](crate::store::TokenStore)
//! - Fornecer tokens válidos para o transporte HTTP
//!
//! ## Estrutura:
//! - `config.rs`: credenciais OAuth2 da integração
//! - `token.rs`: `Token` e resposta do endpoint de token
//! - `client.rs`: cliente HTTP do endpoint `/oauth2/access_token`
//! - `token_manager.rs`: cache, refresh single-flight e persistência

pub mod client;
pub mod config;
pub mod token;
pub mod token_manager;

pub use client::OAuth2Client;
pub use config::OAuth2Config;
pub use token::{Token, TokenResponse};
pub use token_manager::TokenManager;
