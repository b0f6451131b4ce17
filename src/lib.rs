//! # amocrm
//!
//! Cliente Rust para a API v4 da amoCRM.
//!
//! - Ciclo de vida OAuth2 por domínio: autorização, cache, persistência e
//!   refresh single-flight ([`TokenManager`]).
//! - Transporte autenticado com retry único em 401 ([`AmoCrmClient`]).
//! - Inscrições de webhook ([`WebhooksService`]).
//!
//! ## Exemplo de Uso
//!
//! ```rust,no_run
//! use amocrm::{AmoCrmClient, Context, Settings};
//! use amocrm::webhooks::{Webhook, WebhookEvent};
//! use std::time::Duration;
//!
//! # async fn example() -> amocrm::Result<()> {
//! let settings = Settings::from_env()?;
//! let client = AmoCrmClient::from_settings(&settings, "acme.amocrm.ru")?;
//!
//! // Primeira vez: troca o code recebido no redirect
//! let ctx = Context::with_timeout(Duration::from_secs(10));
//! client.tokens().authorize(&ctx, client.domain(), "def502...").await?;
//!
//! let hook = Webhook::new("https://myapp.com/hooks/amocrm", WebhookEvent::essential_lead_events());
//! let created = client.webhooks().ensure_subscribed(&ctx, &hook).await?;
//! println!("Webhook: {:?}", created.id);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod store;
pub mod webhooks;

pub use auth::{OAuth2Client, OAuth2Config, Token, TokenManager};
pub use client::AmoCrmClient;
pub use config::Settings;
pub use context::Context;
pub use error::{
    ApiError, AuthError, Error, NotFoundError, Result, StorageError, ValidationError,
};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use webhooks::{Webhook, WebhookEvent, WebhooksService};
