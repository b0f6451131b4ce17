use thiserror::Error;

use super::StorageError;

/// Erros de obtenção/renovação de token OAuth2.
///
/// `Clone` porque um único resultado de refresh é entregue a todos os
/// chamadores que esperavam por ele.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Nenhum token foi salvo para o domínio; é preciso autorizar primeiro
    #[error("domain '{domain}' is not authorized; run the OAuth2 authorization flow first")]
    NotAuthorized { domain: String },

    /// O servidor recusou o refresh token (expirado, revogado ou inválido)
    #[error("refresh grant rejected for '{domain}': {message}")]
    Revoked { domain: String, message: String },

    /// A API continuou respondendo 401 mesmo após um refresh forçado
    #[error("API rejected the access token for '{domain}' (status {status_code}): {message}")]
    Rejected {
        domain: String,
        status_code: u16,
        message: String,
    },

    /// Falha de rede ou 5xx no endpoint de token; pode dar certo mais tarde
    #[error("token endpoint unavailable for '{domain}': {message}")]
    Transient { domain: String, message: String },

    /// O token renovado não pôde ser persistido, então o refresh não conta
    #[error("failed to persist token for '{domain}': {source}")]
    Storage {
        domain: String,
        #[source]
        source: StorageError,
    },
}

impl AuthError {
    pub fn not_authorized(domain: impl Into<String>) -> Self {
        Self::NotAuthorized {
            domain: domain.into(),
        }
    }

    pub fn revoked(domain: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Revoked {
            domain: domain.into(),
            message: msg.into(),
        }
    }

    pub fn rejected(domain: impl Into<String>, status_code: u16, msg: impl Into<String>) -> Self {
        Self::Rejected {
            domain: domain.into(),
            status_code,
            message: msg.into(),
        }
    }

    pub fn transient(domain: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            domain: domain.into(),
            message: msg.into(),
        }
    }

    pub fn storage(domain: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            domain: domain.into(),
            source,
        }
    }

    /// Só uma nova autorização resolve
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotAuthorized { .. } | Self::Revoked { .. } | Self::Rejected { .. }
        )
    }

    pub fn is_transient(&self) -> bool {
        !self.is_permanent()
    }

    pub fn domain(&self) -> &str {
        match self {
            Self::NotAuthorized { domain }
            | Self::Revoked { domain, .. }
            | Self::Rejected { domain, .. }
            | Self::Transient { domain, .. }
            | Self::Storage { domain, .. } => domain,
        }
    }
}
