use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token OAuth2 de um domínio amoCRM.
///
/// Imutável: um refresh produz um `Token` novo que substitui o anterior por inteiro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            token_type: "Bearer".to_string(),
        }
    }

    /// Válido em `now` considerando a margem `skew` antes da expiração
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at.checked_sub_signed(skew) {
            Some(limit) => now < limit,
            None => false,
        }
    }

    /// Verifica se o token está expirado (ou dentro da margem de renovação)
    pub fn is_expired(&self, skew: Duration) -> bool {
        !self.is_valid_at(Utc::now(), skew)
    }

    /// Retorna o tempo restante até a expiração (zero se já expirou)
    pub fn time_to_expiry(&self) -> Duration {
        let left = self.expires_at - Utc::now();
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }

    /// Valor do header `Authorization`
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Prefixo curto do access token, para logs
    pub(crate) fn fingerprint(&self) -> &str {
        let end = self
            .access_token
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.access_token.len());
        &self.access_token[..end]
    }
}

/// Resposta do endpoint `/oauth2/access_token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub expires_in: i64,
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenResponse {
    /// Converte em [`Token`] com `expires_at = issued_at + expires_in`.
    ///
    /// `None` quando `expires_in` não é positivo ou não cabe numa data.
    pub fn into_token(self, issued_at: DateTime<Utc>) -> Option<Token> {
        if self.expires_in <= 0 {
            return None;
        }

        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?;

        Some(Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            token_type: self.token_type,
        })
    }
}
