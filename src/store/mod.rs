//! Persistência de tokens OAuth2 por domínio
//!
//! [`TokenStore`] é o único estado durável do crate. O formato físico é detalhe de
//! cada implementação; nenhum componente depende de uma implementação específica.
//!
//! - [`MemoryTokenStore`]: vive só enquanto o processo (testes, jobs curtos)
//! - [`FileTokenStore`]: um arquivo JSON por domínio

mod file;
mod memory;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use async_trait::async_trait;

use crate::auth::Token;
use crate::error::Result;

/// Armazenamento de tokens OAuth2, chaveado pelo domínio amoCRM.
///
/// Implementações devem ser seguras para chamadas concorrentes em domínios
/// diferentes. Chamadas concorrentes para o mesmo domínio já chegam serializadas
/// pelo [`TokenManager`](crate::auth::TokenManager).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Salva o token, sobrescrevendo o anterior do domínio
    async fn save(&self, domain: &str, token: &Token) -> Result<()>;

    /// Último token salvo; `Error::NotFound` se nunca houve um
    async fn load(&self, domain: &str) -> Result<Token>;

    /// Existência do token sem desserializá-lo
    async fn has_token(&self, domain: &str) -> Result<bool>;

    /// Remove o token do domínio; remover um token inexistente não é erro
    async fn remove(&self, domain: &str) -> Result<()>;
}
