//! Cliente HTTP para a API amoCRM v4
//!
//! Transporte autenticado usado por todos os serviços de recurso. Cada chamada:
//!
//! 1. valida o path e serializa o body antes de tocar a rede;
//! 2. pede um token válido ao [`TokenManager`];
//! 3. envia com `Authorization: Bearer <token>`;
//! 4. em 401, força um único refresh e repete a requisição uma única vez;
//! 5. converte respostas não-2xx em [`ApiError`].

use std::fmt;
use std::sync::Arc;

use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::auth::{OAuth2Client, Token, TokenManager};
use crate::config::Settings;
use crate::context::Context;
use crate::error::{ApiError, AuthError, Result, ValidationError};
use crate::webhooks::WebhooksService;

const API_PREFIX: &str = "/api/v4";

/// Cliente para um domínio (conta) amoCRM.
///
/// Barato de clonar; o [`TokenManager`] é compartilhado entre clientes de
/// domínios diferentes.
#[derive(Clone)]
pub struct AmoCrmClient {
    http_client: HttpClient,
    domain: String,
    base_url: Url,
    tokens: Arc<TokenManager>,
}

impl fmt::Debug for AmoCrmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmoCrmClient")
            .field("domain", &self.domain)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl AmoCrmClient {
    /// Cria um cliente para `domain` usando um `TokenManager` existente
    pub fn new(settings: &Settings, domain: impl Into<String>, tokens: Arc<TokenManager>) -> Result<Self> {
        let domain = domain.into();
        let base_url = settings.base_url_for(&domain)?;
        let http_client = settings.http_client()?;

        Ok(Self {
            http_client,
            domain,
            base_url,
            tokens,
        })
    }

    /// Cria cliente e `TokenManager` a partir das settings
    /// (store conforme `token_dir`)
    pub fn from_settings(settings: &Settings, domain: impl Into<String>) -> Result<Self> {
        let oauth = OAuth2Client::new(settings.clone(), settings.http_client()?);
        let tokens = Arc::new(TokenManager::new(
            settings.token_store(),
            oauth,
            settings.refresh_skew(),
        ));
        Self::new(settings, domain, tokens)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// URL base do host (sem `/api/v4`)
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Serviço de webhooks deste domínio
    pub fn webhooks(&self) -> WebhooksService<'_> {
        WebhooksService::new(self)
    }

    /// Executa uma requisição GET e parseia JSON
    ///
    /// `Ok(None)` quando a resposta não tem corpo (ex.: 204).
    pub async fn get_json<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> Result<Option<T>> {
        let body = self.execute(ctx, Method::GET, path, None).await?;
        decode(body)
    }

    /// Executa uma requisição POST com corpo JSON e parseia a resposta
    pub async fn post_json<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ValidationError::new("body", format!("cannot serialize request: {}", e)))?;
        let body = self.execute(ctx, Method::POST, path, Some(payload)).await?;
        decode(body)
    }

    /// Executa uma requisição DELETE; corpo de resposta, se houver, é ignorado
    pub async fn delete_json(&self, ctx: &Context, path: &str) -> Result<()> {
        self.execute(ctx, Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let url = self.endpoint(path)?;

        ctx.run(async {
            let token = self.tokens.get_valid_token(ctx, &self.domain).await?;
            let response = self.send_once(&method, &url, &token, payload.as_deref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return self.handle_response(response).await;
            }

            tracing::warn!(
                "🔐 [amoCRM] 401 em {} {}; renovando token e repetindo uma vez",
                method,
                url
            );
            let token = self
                .tokens
                .force_refresh(ctx, &self.domain, &token.access_token)
                .await?;
            let retry = self.send_once(&method, &url, &token, payload.as_deref()).await?;

            if retry.status() == StatusCode::UNAUTHORIZED {
                let message = error_message(&read_text(retry).await);
                return Err(AuthError::rejected(&self.domain, 401, message).into());
            }

            self.handle_response(retry).await
        })
        .await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        token: &Token,
        payload: Option<&[u8]>,
    ) -> Result<Response> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = payload {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        Ok(request.send().await?)
    }

    /// Processa a resposta HTTP e trata erros
    async fn handle_response(&self, response: Response) -> Result<Option<Vec<u8>>> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            tracing::debug!("Response status: {}, {} bytes", status, bytes.len());
            return Ok(if bytes.iter().all(u8::is_ascii_whitespace) {
                None
            } else {
                Some(bytes.to_vec())
            });
        }

        let status_code = status.as_u16();
        let error_body = read_text(response).await;

        tracing::error!("amoCRM API error ({}): {}", status_code, error_body);

        Err(ApiError::new(status_code, error_message(&error_body)).into())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(ValidationError::new("path", format!("'{}' must start with '/'", path)).into());
        }

        self.base_url
            .join(&format!("{}{}", API_PREFIX, path))
            .map_err(|e| ValidationError::new("path", format!("invalid path '{}': {}", path, e)).into())
    }
}

fn decode<T: DeserializeOwned>(body: Option<Vec<u8>>) -> Result<Option<T>> {
    match body {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

async fn read_text(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

/// Tenta extrair a mensagem de erro do JSON da amoCRM
/// (`{"title": ..., "detail": ..., "status": ...}`)
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "title", "hint", "message", "error"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                if !msg.is_empty() {
                    return msg.to_string();
                }
            }
        }
    }

    if body.trim().is_empty() {
        "empty response".to_string()
    } else {
        body.to_string()
    }
}
