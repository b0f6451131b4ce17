//! OAuth2 HTTP Client
//!
//! Cliente isolado para o endpoint `/oauth2/access_token` da amoCRM

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{OAuth2Config, Token, TokenResponse};
use crate::config::Settings;
use crate::error::{AuthError, Result};

const TOKEN_PATH: &str = "/oauth2/access_token";

/// Corpo da requisição ao endpoint de token
#[derive(Debug, Serialize)]
struct GrantRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    redirect_uri: &'a str,
}

/// Cliente OAuth2 para amoCRM
#[derive(Debug, Clone)]
pub struct OAuth2Client {
    config: OAuth2Config,
    settings: Settings,
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(settings: Settings, http_client: Client) -> Self {
        Self {
            config: settings.oauth2(),
            settings,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Troca o refresh token por um token novo
    ///
    /// # Retorno
    /// - `Ok(Token)`: token novo (o refresh token anterior deixa de valer)
    /// - `Err(AuthError::Revoked)`: grant recusado, só reautorização resolve
    /// - `Err(AuthError::Transient)`: rede ou 5xx, pode tentar de novo mais tarde
    pub async fn refresh(
        &self,
        domain: &str,
        refresh_token: &str,
    ) -> std::result::Result<Token, AuthError> {
        tracing::info!("🔄 [OAuth2] Renovando access token de {}", domain);

        let body = GrantRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "refresh_token",
            refresh_token: Some(refresh_token),
            code: None,
            redirect_uri: &self.config.redirect_uri,
        };

        self.request_token(domain, &body).await
    }

    /// Troca o authorization code (callback da autorização) por um token
    pub async fn exchange_code(
        &self,
        domain: &str,
        code: &str,
    ) -> std::result::Result<Token, AuthError> {
        tracing::info!("🔐 [OAuth2] Trocando authorization code por access token ({})", domain);

        let body = GrantRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "authorization_code",
            refresh_token: None,
            code: Some(code),
            redirect_uri: &self.config.redirect_uri,
        };

        self.request_token(domain, &body).await
    }

    fn token_url(&self, domain: &str) -> Result<Url> {
        let base = self.settings.base_url_for(domain)?;
        base.join(TOKEN_PATH)
            .map_err(|e| crate::Error::config(format!("invalid token URL: {}", e)))
    }

    async fn request_token(
        &self,
        domain: &str,
        body: &GrantRequest<'_>,
    ) -> std::result::Result<Token, AuthError> {
        let url = self
            .token_url(domain)
            .map_err(|e| AuthError::revoked(domain, e.to_string()))?;

        tracing::debug!("📤 [OAuth2] POST {} grant_type={}", url, body.grant_type);

        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AuthError::transient(domain, format!("failed to reach token endpoint: {}", e))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = extract_oauth_message(&error_text);

            tracing::warn!(
                "❌ [OAuth2] Token endpoint recusou o grant: {} - {}",
                status,
                message
            );

            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AuthError::transient(domain, format!("[{}] {}", status.as_u16(), message))
            } else {
                AuthError::revoked(domain, message)
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::transient(domain, format!("failed to parse token response: {}", e))
        })?;

        let expires_in = token_response.expires_in;
        let token = token_response.into_token(Utc::now()).ok_or_else(|| {
            AuthError::transient(
                domain,
                format!("token endpoint returned an unusable expires_in: {}", expires_in),
            )
        })?;
        tracing::info!(
            "✅ [OAuth2] Access token obtido para {}: {}... (expira em {})",
            domain,
            token.fingerprint(),
            token.expires_at
        );

        Ok(token)
    }
}

/// Extrai a mensagem de erro OAuth do corpo da resposta.
///
/// A amoCRM responde `{"hint": ..., "title": ..., "detail": ..., "status": ...}`.
fn extract_oauth_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["hint", "detail", "title", "message"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                if !msg.is_empty() {
                    return msg.to_string();
                }
            }
        }
    }

    if body.is_empty() {
        "empty response".to_string()
    } else {
        body.to_string()
    }
}
