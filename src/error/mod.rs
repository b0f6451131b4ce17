//! Tipos de erro do crate amocrm
//!
//! A taxonomia é fechada para que o chamador possa decidir sem comparar strings:
//!
//! - "tente de novo mais tarde": [`Error::is_retryable`]
//! - "corrija a requisição": [`Error::is_client_fault`]
//! - "reautorize a integração": [`Error::requires_reauthorization`]

mod auth_error;

pub use auth_error::AuthError;

use thiserror::Error;

/// Erros do cliente amoCRM
#[derive(Debug, Error)]
pub enum Error {
    /// Falha ao obter ou renovar o token OAuth2
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Resposta não-2xx da API
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Payload inválido detectado antes de qualquer chamada de rede
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Falha no backend do TokenStore
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Nenhum token salvo para o domínio
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Erro de transporte HTTP (conexão, TLS, leitura do corpo)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Corpo de resposta 2xx que não pôde ser decodificado
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Operação cancelada pelo chamador
    #[error("Operation cancelled")]
    Cancelled,

    /// Prazo do contexto expirou
    #[error("Operation timed out")]
    Timeout,

    /// Erro de configuração
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Status HTTP da resposta, quando o erro veio da API
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api(e) => Some(e.status_code),
            Self::Auth(AuthError::Rejected { status_code, .. }) => Some(*status_code),
            _ => None,
        }
    }

    /// Vale a pena repetir a mesma chamada mais tarde
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_transient(),
            Self::Api(e) => e.is_server_error() || e.status_code == 429,
            Self::Http(_) | Self::Timeout => true,
            _ => false,
        }
    }

    /// A requisição em si está errada; repetir sem alterá-la não adianta
    pub fn is_client_fault(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Api(e) => e.is_client_error() && e.status_code != 429,
            _ => false,
        }
    }

    /// O grant OAuth2 não serve mais; é preciso autorizar de novo fora da biblioteca
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::Auth(e) if e.is_permanent())
    }
}

/// Resposta de erro da API (status não-2xx)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error (status {status_code}): {message}")]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }
}

/// Defeito no payload de saída, detectado localmente
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error on field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Falha do backend de armazenamento de tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token storage error: {message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Nenhum token armazenado para o domínio.
///
/// Diferente de um 404 da API remota, que chega como [`ApiError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no token stored for domain '{domain}'")]
pub struct NotFoundError {
    pub domain: String,
}

impl NotFoundError {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

/// Tipo Result padrão para o crate
pub type Result<T> = std::result::Result<T, Error>;
