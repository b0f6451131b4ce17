//! OAuth2 Configuration
//!
//! Credenciais da integração amoCRM usadas no endpoint de token

use serde::{Deserialize, Serialize};

/// Página de consentimento da amoCRM (vale para qualquer domínio de conta)
const AUTHORIZATION_ENDPOINT: &str = "https://www.amocrm.ru/oauth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// ID da integração
    pub client_id: String,

    /// Chave secreta da integração
    pub client_secret: String,

    /// URL de redirecionamento cadastrada na integração
    pub redirect_uri: String,
}

impl OAuth2Config {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Gerar URL de autorização da amoCRM
    ///
    /// `state` volta intacto no callback e deve ser conferido pelo chamador.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&state={}&mode=post_message",
            AUTHORIZATION_ENDPOINT,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(state)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let config = OAuth2Config::new(
            "test_client_id",
            "test_secret",
            "https://example.com/callback",
        );

        let url = config.authorization_url("csrf 123");
        assert!(url.starts_with("https://www.amocrm.ru/oauth?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("state=csrf%20123"));
        assert!(url.ends_with("mode=post_message"));
    }
}
