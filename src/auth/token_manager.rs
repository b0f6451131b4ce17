//! Token Manager
//!
//! Gerenciamento de tokens OAuth2 por domínio: cache em memória, persistência no
//! [`TokenStore`] e refresh single-flight.
//!
//! ## Garantias
//!
//! - Token válido (fora da margem `skew`) é devolvido sem chamada de rede e sem
//!   esperar pelo lock do domínio.
//! - Para um mesmo domínio existe no máximo um refresh em andamento; quem chegar
//!   durante o refresh espera por ele e recebe o mesmo resultado (token ou erro).
//! - O refresh roda numa task própria: cancelar um chamador, inclusive o que
//!   iniciou o refresh, não interrompe o refresh para os demais.
//! - O token novo só é entregue depois de salvo no store.
//! - Toda escrita no store de um domínio acontece com o lock do domínio.
//! - `authorize`, `set_token` e `revoke` vencem um refresh que já estava em
//!   andamento: o resultado desse refresh é descartado.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::OwnedMutexGuard;

use super::{OAuth2Client, Token};
use crate::context::Context;
use crate::error::{AuthError, Error, Result, StorageError, ValidationError};
use crate::store::TokenStore;

type RefreshOutcome = std::result::Result<Token, AuthError>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;
type SlotGuard = OwnedMutexGuard<DomainState>;

/// Estado mutável de um domínio
#[derive(Default)]
struct DomainState {
    token: Option<Token>,
    in_flight: Option<RefreshFuture>,
    /// Avança a cada `authorize`, `set_token` e `revoke`
    generation: u64,
    /// Slot já removido da arena por `revoke`
    retired: bool,
}

/// Entrada da arena: um lock por domínio, criado sob demanda
#[derive(Default)]
struct DomainSlot {
    state: Arc<tokio::sync::Mutex<DomainState>>,
    /// Cópia de `state.token`, lida sem o lock do domínio
    cached: RwLock<Option<Token>>,
}

impl DomainSlot {
    fn cached(&self) -> Option<Token> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atualiza o token em cache; só com o lock do domínio
    fn publish(&self, state: &mut DomainState, token: Option<Token>) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        state.token = token;
    }

    /// Invalida refreshes em andamento
    fn supersede(&self, state: &mut DomainState) {
        state.generation += 1;
        state.in_flight = None;
    }
}

/// O que fazer depois de inspecionar o estado do domínio
enum Next {
    Ready(Token),
    Wait(RefreshFuture),
}

/// Gerenciador de tokens OAuth2
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    oauth_client: Arc<OAuth2Client>,
    skew: Duration,
    slots: Mutex<HashMap<String, Arc<DomainSlot>>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, oauth_client: OAuth2Client, skew: Duration) -> Self {
        Self {
            store,
            oauth_client: Arc::new(oauth_client),
            skew,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn oauth_client(&self) -> &OAuth2Client {
        &self.oauth_client
    }

    /// Obter token válido (cache → TokenStore → refresh)
    ///
    /// # Retorno
    /// - `Ok(Token)`: token válido por pelo menos `skew`
    /// - `Err(Error::Auth)`: refresh falhou ou o domínio nunca foi autorizado
    /// - `Err(Error::Cancelled | Error::Timeout)`: o contexto venceu antes
    pub async fn get_valid_token(&self, ctx: &Context, domain: &str) -> Result<Token> {
        ctx.run(async {
            if let Some(token) = self.slot(domain)?.cached() {
                if token.is_valid_at(Utc::now(), self.skew) {
                    return Ok(token);
                }
            }

            let next = {
                let (slot, mut state) = self.lock_slot(domain).await?;
                self.hydrate(domain, &slot, &mut state).await?;

                let cached = state.token.clone();
                match cached {
                    Some(token) if token.is_valid_at(Utc::now(), self.skew) => Next::Ready(token),
                    Some(token) => {
                        tracing::info!(
                            "🔄 [TokenManager] Token de {} expirado ou perto de expirar ({})",
                            domain,
                            token.expires_at
                        );
                        Next::Wait(self.join_or_start_refresh(
                            &slot,
                            &mut state,
                            domain,
                            token.refresh_token,
                        ))
                    }
                    None => match state.in_flight.clone() {
                        Some(flight) => Next::Wait(flight),
                        None => return Err(AuthError::not_authorized(domain).into()),
                    },
                }
            };

            match next {
                Next::Ready(token) => Ok(token),
                Next::Wait(flight) => flight.await.map_err(Error::from),
            }
        })
        .await
    }

    /// Força um refresh depois que a API recusou `rejected_access_token` (401).
    ///
    /// Se outro chamador já trocou o token nesse meio tempo, devolve o atual sem
    /// nova chamada de rede.
    pub async fn force_refresh(
        &self,
        ctx: &Context,
        domain: &str,
        rejected_access_token: &str,
    ) -> Result<Token> {
        ctx.run(async {
            let flight = {
                let (slot, mut state) = self.lock_slot(domain).await?;
                self.hydrate(domain, &slot, &mut state).await?;

                if let Some(flight) = state.in_flight.clone() {
                    flight
                } else {
                    let token = match state.token.clone() {
                        Some(token) => token,
                        None => return Err(AuthError::not_authorized(domain).into()),
                    };

                    if token.access_token != rejected_access_token {
                        tracing::debug!(
                            "♻️ [TokenManager] Token de {} já foi renovado por outro chamador",
                            domain
                        );
                        return Ok(token);
                    }

                    tracing::warn!(
                        "🔁 [TokenManager] Forçando refresh de {} (token {}... recusado)",
                        domain,
                        token.fingerprint()
                    );
                    self.join_or_start_refresh(&slot, &mut state, domain, token.refresh_token)
                }
            };

            flight.await.map_err(Error::from)
        })
        .await
    }

    /// Autorização inicial: troca o authorization code por um token e o salva
    pub async fn authorize(&self, ctx: &Context, domain: &str, code: &str) -> Result<Token> {
        ctx.run(async {
            self.slot(domain)?;
            let token = self.oauth_client.exchange_code(domain, code).await?;

            let (slot, mut state) = self.lock_slot(domain).await?;
            self.store
                .save(domain, &token)
                .await
                .map_err(|e| persist_error(domain, e))?;
            slot.supersede(&mut state);
            slot.publish(&mut state, Some(token.clone()));

            tracing::info!("✅ [TokenManager] Domínio {} autorizado", domain);
            Ok(token)
        })
        .await
    }

    /// Importa um token obtido por fora (persiste e atualiza o cache)
    pub async fn set_token(&self, domain: &str, token: Token) -> Result<()> {
        let (slot, mut state) = self.lock_slot(domain).await?;

        self.store.save(domain, &token).await?;
        slot.supersede(&mut state);
        slot.publish(&mut state, Some(token));

        tracing::info!("💾 [TokenManager] Token de {} salvo", domain);
        Ok(())
    }

    /// Existe token para o domínio (em memória ou no store)
    pub async fn is_authorized(&self, domain: &str) -> Result<bool> {
        if self.slot(domain)?.cached().is_some() {
            return Ok(true);
        }
        self.store.has_token(domain).await
    }

    /// Limpar cache do domínio (a próxima chamada relê o store)
    ///
    /// Um refresh em andamento não é descartado: o refresh token antigo já foi
    /// consumido no servidor e o token novo é o único válido.
    pub async fn invalidate(&self, domain: &str) -> Result<()> {
        let (slot, mut state) = self.lock_slot(domain).await?;
        slot.publish(&mut state, None);
        tracing::info!("🗑️ [TokenManager] Cache de token de {} invalidado", domain);
        Ok(())
    }

    /// Remove o token do cache e do store, e o domínio da arena
    pub async fn revoke(&self, domain: &str) -> Result<()> {
        let (slot, mut state) = self.lock_slot(domain).await?;

        self.store.remove(domain).await?;
        slot.supersede(&mut state);
        slot.publish(&mut state, None);
        state.retired = true;

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(domain).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            slots.remove(domain);
        }

        tracing::info!("🗑️ [TokenManager] Token de {} removido", domain);
        Ok(())
    }

    /// Entrada da arena para o domínio, criada na primeira vez
    fn slot(&self, domain: &str) -> Result<Arc<DomainSlot>> {
        if domain.is_empty() {
            return Err(ValidationError::new("domain", "must not be empty").into());
        }

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.entry(domain.to_string()).or_default().clone())
    }

    /// Slot do domínio com o lock já tomado; ignora slots aposentados por `revoke`
    async fn lock_slot(&self, domain: &str) -> Result<(Arc<DomainSlot>, SlotGuard)> {
        loop {
            let slot = self.slot(domain)?;
            let state = slot.state.clone().lock_owned().await;
            if !state.retired {
                return Ok((slot, state));
            }
        }
    }

    /// Em cache frio, carrega o token do store
    async fn hydrate(&self, domain: &str, slot: &DomainSlot, state: &mut DomainState) -> Result<()> {
        if state.token.is_some() || state.in_flight.is_some() {
            return Ok(());
        }

        match self.store.load(domain).await {
            Ok(token) => {
                tracing::debug!("📂 [TokenManager] Token de {} carregado do store", domain);
                slot.publish(state, Some(token));
                Ok(())
            }
            Err(Error::NotFound(_)) => Ok(()),
            Err(Error::Storage(e)) => Err(AuthError::storage(domain, e).into()),
            Err(e) => Err(e),
        }
    }

    /// Entra no refresh em andamento ou inicia um novo.
    ///
    /// Precisa ser chamado com o lock do domínio: é isso que garante um único
    /// refresh por vez. A task do refresh retoma o mesmo lock antes de salvar e
    /// só grava se a geração do domínio ainda for a do início do refresh.
    fn join_or_start_refresh(
        &self,
        slot: &Arc<DomainSlot>,
        state: &mut DomainState,
        domain: &str,
        refresh_token: String,
    ) -> RefreshFuture {
        if let Some(flight) = state.in_flight.clone() {
            return flight;
        }

        let slot = slot.clone();
        let store = self.store.clone();
        let oauth_client = self.oauth_client.clone();
        let task_domain = domain.to_string();
        let generation = state.generation;

        let task = tokio::spawn(async move {
            let domain = task_domain;
            let refreshed = oauth_client.refresh(&domain, &refresh_token).await;

            let mut state = slot.state.lock().await;
            if state.generation != generation {
                tracing::warn!(
                    "⏭️ [TokenManager] Refresh de {} descartado: o token foi substituído durante o refresh",
                    domain
                );
                return match state.token.clone() {
                    Some(token) => Ok(token),
                    None => Err(AuthError::not_authorized(&domain)),
                };
            }
            state.in_flight = None;

            let outcome = match refreshed {
                Ok(token) => match store.save(&domain, &token).await {
                    Ok(()) => {
                        slot.publish(&mut state, Some(token.clone()));
                        Ok(token)
                    }
                    Err(e) => Err(persist_error(&domain, e)),
                },
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(token) => tracing::info!(
                    "✅ [TokenManager] Token de {} renovado: {}...",
                    domain,
                    token.fingerprint()
                ),
                Err(e) => tracing::warn!("❌ [TokenManager] Refresh de {} falhou: {}", domain, e),
            }

            outcome
        });

        let domain = domain.to_string();
        let flight = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AuthError::transient(domain, format!("refresh task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(flight.clone());
        flight
    }
}

fn persist_error(domain: &str, err: Error) -> AuthError {
    match err {
        Error::Storage(e) => AuthError::storage(domain, e),
        other => AuthError::storage(domain, StorageError::new(other.to_string())),
    }
}
