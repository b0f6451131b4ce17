use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::OAuth2Config;
use crate::error::{Error, Result, ValidationError};
use crate::store::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Configuração do cliente amoCRM.
///
/// Carregada de variáveis `AMOCRM_*` (ver [`Settings::from_env`]) ou montada em
/// código com [`Settings::new`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,

    /// Substitui `https://{domain}` (útil para proxies e testes)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Diretório do `FileTokenStore`; sem ele os tokens ficam só em memória
    #[serde(default)]
    pub token_dir: Option<PathBuf>,

    /// Margem antes de `expires_at` em que o token já é tratado como expirado
    #[serde(default = "default_refresh_skew_secs")]
    pub refresh_skew_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Maior margem de refresh aceita (1 dia)
pub const MAX_REFRESH_SKEW_SECS: u64 = 86_400;

fn default_refresh_skew_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Settings {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            base_url: None,
            token_dir: None,
            refresh_skew_secs: default_refresh_skew_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Carrega de variáveis de ambiente com prefixo `AMOCRM_`.
    ///
    /// Obrigatórias: `AMOCRM_CLIENT_ID`, `AMOCRM_CLIENT_SECRET`, `AMOCRM_REDIRECT_URI`.
    /// Um `.env` no diretório atual é lido antes (fora dos testes).
    pub fn from_env() -> Result<Self> {
        if cfg!(not(test)) {
            dotenvy::dotenv().ok();
        }

        let settings: Settings = Config::builder()
            .add_source(Environment::with_prefix("AMOCRM"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("failed to load AMOCRM_* settings: {}", e)))?;

        if settings.refresh_skew_secs > MAX_REFRESH_SKEW_SECS {
            return Err(Error::config(format!(
                "AMOCRM_REFRESH_SKEW_SECS must be at most {} (got {})",
                MAX_REFRESH_SKEW_SECS, settings.refresh_skew_secs
            )));
        }

        tracing::info!(
            "Configuration loaded: client_id={}, token_dir={:?}",
            settings.client_id,
            settings.token_dir
        );

        Ok(settings)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = Some(dir.into());
        self
    }

    pub fn with_refresh_skew(mut self, secs: u64) -> Self {
        self.refresh_skew_secs = secs;
        self
    }

    pub fn oauth2(&self) -> OAuth2Config {
        OAuth2Config::new(&self.client_id, &self.client_secret, &self.redirect_uri)
    }

    /// URL da tela de consentimento da amoCRM (início da autorização)
    pub fn authorization_url(&self, state: &str) -> String {
        self.oauth2().authorization_url(state)
    }

    /// Margem de refresh, limitada a [`MAX_REFRESH_SKEW_SECS`]
    pub fn refresh_skew(&self) -> chrono::Duration {
        let secs = self.refresh_skew_secs.min(MAX_REFRESH_SKEW_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// URL base do host de um domínio (sem o prefixo `/api/v4`)
    pub fn base_url_for(&self, domain: &str) -> Result<Url> {
        validate_domain(domain)?;

        let raw = match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{}", domain),
        };

        Url::parse(&raw).map_err(|e| Error::config(format!("invalid base URL '{}': {}", raw, e)))
    }

    /// Cliente HTTP compartilhado
    ///
    /// # Timeouts
    ///
    /// - Total: `request_timeout_secs` (30s)
    /// - Connect: `connect_timeout_secs` (5s)
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))
    }

    /// Store de tokens conforme `token_dir`
    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        match &self.token_dir {
            Some(dir) => Arc::new(FileTokenStore::new(dir.clone())),
            None => Arc::new(MemoryTokenStore::new()),
        }
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(ValidationError::new("domain", "must not be empty").into());
    }
    if domain.contains(['/', '?', '#']) || domain.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("domain", format!("'{}' is not a host name", domain)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_with_required_vars() {
        temp_env::with_vars(
            vec![
                ("AMOCRM_CLIENT_ID", Some("client-uuid")),
                ("AMOCRM_CLIENT_SECRET", Some("secret")),
                ("AMOCRM_REDIRECT_URI", Some("https://example.com/oauth")),
                ("AMOCRM_REFRESH_SKEW_SECS", Some("45")),
                ("AMOCRM_TOKEN_DIR", Some("/var/lib/amocrm")),
                ("AMOCRM_BASE_URL", None),
            ],
            || {
                let settings = Settings::from_env().unwrap();
                assert_eq!(settings.client_id, "client-uuid");
                assert_eq!(settings.client_secret, "secret");
                assert_eq!(settings.redirect_uri, "https://example.com/oauth");
                assert_eq!(settings.refresh_skew_secs, 45);
                assert_eq!(settings.request_timeout_secs, 30);
                assert_eq!(settings.token_dir, Some(PathBuf::from("/var/lib/amocrm")));
                assert!(settings.base_url.is_none());
            },
        );
    }

    #[test]
    fn test_from_env_missing_client_id() {
        temp_env::with_vars(
            vec![
                ("AMOCRM_CLIENT_ID", None::<&str>),
                ("AMOCRM_CLIENT_SECRET", Some("secret")),
                ("AMOCRM_REDIRECT_URI", Some("https://example.com/oauth")),
            ],
            || {
                let err = Settings::from_env().unwrap_err();
                assert!(matches!(err, Error::Config(_)));
            },
        );
    }

    #[test]
    fn test_from_env_rejects_huge_refresh_skew() {
        temp_env::with_vars(
            vec![
                ("AMOCRM_CLIENT_ID", Some("client-uuid")),
                ("AMOCRM_CLIENT_SECRET", Some("secret")),
                ("AMOCRM_REDIRECT_URI", Some("https://example.com/oauth")),
                ("AMOCRM_REFRESH_SKEW_SECS", Some("100000")),
            ],
            || {
                let err = Settings::from_env().unwrap_err();
                assert!(matches!(err, Error::Config(ref msg) if msg.contains("REFRESH_SKEW")));
            },
        );
    }

    #[test]
    fn test_refresh_skew_is_clamped() {
        let settings = Settings::new("id", "secret", "https://example.com").with_refresh_skew(u64::MAX);
        assert_eq!(
            settings.refresh_skew(),
            chrono::Duration::seconds(MAX_REFRESH_SKEW_SECS as i64)
        );
    }

    #[test]
    fn test_base_url_for_domain() {
        let settings = Settings::new("id", "secret", "https://example.com");
        let url = settings.base_url_for("acme.amocrm.ru").unwrap();
        assert_eq!(url.as_str(), "https://acme.amocrm.ru/");
    }

    #[test]
    fn test_base_url_override() {
        let settings =
            Settings::new("id", "secret", "https://example.com").with_base_url("http://127.0.0.1:9000");
        let url = settings.base_url_for("acme.amocrm.ru").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_invalid_domain_is_validation_error() {
        let settings = Settings::new("id", "secret", "https://example.com");

        let err = settings.base_url_for("").unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.field == "domain"));

        let err = settings.base_url_for("acme.amocrm.ru/api").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_authorization_url_uses_client_id() {
        let settings = Settings::new("client-uuid", "secret", "https://example.com/oauth");
        let url = settings.authorization_url("xyz");
        assert!(url.starts_with("https://www.amocrm.ru/oauth?"));
        assert!(url.contains("client_id=client-uuid"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_http_client_builds() {
        let settings = Settings::new("id", "secret", "https://example.com");
        assert!(settings.http_client().is_ok());
    }
}
