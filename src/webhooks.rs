//! amoCRM Webhooks API
//!
//! Gerenciamento de inscrições de webhook de um domínio: listar, inscrever e
//! desinscrever. A fonte de verdade é sempre a amoCRM; nada fica em cache aqui.
//!
//! ## Exemplo de Uso
//!
//! ```rust,no_run
//! use amocrm::{AmoCrmClient, Context, Settings};
//! use amocrm::webhooks::{Webhook, WebhookEvent};
//!
//! # async fn example() -> amocrm::Result<()> {
//! let settings = Settings::from_env()?;
//! let client = AmoCrmClient::from_settings(&settings, "acme.amocrm.ru")?;
//! let ctx = Context::background();
//!
//! // Inscrever
//! let webhook = Webhook::new(
//!     "https://myapp.com/webhooks/amocrm",
//!     [WebhookEvent::AddLead, WebhookEvent::StatusLead],
//! );
//! let created = client.webhooks().subscribe(&ctx, &webhook).await?;
//! println!("Webhook criado: {:?}", created.id);
//!
//! // Listar
//! let webhooks = client.webhooks().list(&ctx).await?;
//! println!("Total de webhooks: {}", webhooks.len());
//!
//! // Desinscrever
//! if let Some(id) = created.id.as_deref() {
//!     client.webhooks().unsubscribe(&ctx, id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::client::AmoCrmClient;
use crate::context::Context;
use crate::error::{Result, ValidationError};
use crate::models::Envelope;

/// Serviço de webhooks de um domínio
pub struct WebhooksService<'a> {
    client: &'a AmoCrmClient,
}

impl<'a> WebhooksService<'a> {
    pub fn new(client: &'a AmoCrmClient) -> Self {
        Self { client }
    }

    /// Lista os webhooks do domínio, na ordem devolvida pelo servidor
    pub async fn list(&self, ctx: &Context) -> Result<Vec<Webhook>> {
        let response: Option<Envelope<WebhooksEmbedded>> =
            self.client.get_json(ctx, "/webhooks").await?;

        // 204 sem corpo = nenhum webhook
        Ok(response.map(|r| r.embedded.webhooks).unwrap_or_default())
    }

    /// Cria uma inscrição de webhook
    ///
    /// `webhook` é um modelo: o `id` dele é ignorado e o webhook devolvido traz o
    /// `id` atribuído pelo servidor. Payload inválido falha sem chamada de rede.
    pub async fn subscribe(&self, ctx: &Context, webhook: &Webhook) -> Result<Webhook> {
        webhook.validate()?;

        let template = Webhook {
            id: None,
            ..webhook.clone()
        };

        #[derive(Serialize)]
        struct SubscribeRequest<'w> {
            webhooks: &'w [Webhook],
        }

        let request = SubscribeRequest {
            webhooks: std::slice::from_ref(&template),
        };

        let response: Option<Envelope<WebhooksEmbedded>> =
            self.client.post_json(ctx, "/webhooks", &request).await?;

        match response.and_then(|r| r.embedded.webhooks.into_iter().next()) {
            Some(created) => {
                tracing::info!(
                    "✅ [Webhooks] Inscrito {} (id {:?})",
                    created.destination,
                    created.id
                );
                Ok(created)
            }
            None => {
                tracing::warn!(
                    "⚠️ [Webhooks] Resposta sem webhook para {}; id não informado pelo servidor",
                    template.destination
                );
                Ok(template)
            }
        }
    }

    /// Remove uma inscrição pelo id
    ///
    /// Id inexistente chega como `Error::Api` com o status do servidor (tipicamente 404).
    pub async fn unsubscribe(&self, ctx: &Context, webhook_id: &str) -> Result<()> {
        if webhook_id.trim().is_empty() {
            return Err(ValidationError::new("id", "must not be empty").into());
        }

        let path = format!("/webhooks/{}", urlencoding::encode(webhook_id));
        self.client.delete_json(ctx, &path).await?;

        tracing::info!("🗑️ [Webhooks] Webhook {} removido", webhook_id);
        Ok(())
    }

    /// Busca webhook por URL de destino (helper)
    ///
    /// Como a API não oferece busca por URL, este método lista todos e filtra.
    pub async fn find_by_destination(&self, ctx: &Context, destination: &str) -> Result<Option<Webhook>> {
        let webhooks = self.list(ctx).await?;
        Ok(webhooks.into_iter().find(|w| w.destination == destination))
    }

    /// Inscreve só se ainda não existir inscrição para o destino (idempotente)
    pub async fn ensure_subscribed(&self, ctx: &Context, webhook: &Webhook) -> Result<Webhook> {
        webhook.validate()?;

        if let Some(existing) = self.find_by_destination(ctx, &webhook.destination).await? {
            tracing::info!("Webhook já existe para {}", webhook.destination);
            return Ok(existing);
        }

        tracing::info!("Criando novo webhook para {}...", webhook.destination);
        self.subscribe(ctx, webhook).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebhooksEmbedded {
    #[serde(default)]
    webhooks: Vec<Webhook>,
}

/// Webhook registrado na amoCRM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// ID atribuído pelo servidor; ausente ao criar
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "id_as_string"
    )]
    pub id: Option<String>,

    /// URL que recebe os eventos
    pub destination: String,

    /// Eventos assinados, sem repetição, na ordem em que foram informados
    pub settings: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
}

impl Webhook {
    /// Novo modelo de inscrição; eventos repetidos são descartados
    pub fn new<I, E>(destination: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        let mut settings: Vec<String> = Vec::new();
        for event in events {
            let event = event.into();
            if !settings.contains(&event) {
                settings.push(event);
            }
        }

        Self {
            id: None,
            destination: destination.into(),
            settings,
            disabled: false,
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Valida o payload antes do envio
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.destination.trim().is_empty() {
            return Err(ValidationError::new("destination", "must not be empty"));
        }

        match Url::parse(&self.destination) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ValidationError::new(
                    "destination",
                    format!("unsupported scheme '{}'", url.scheme()),
                ))
            }
            Err(e) => {
                return Err(ValidationError::new(
                    "destination",
                    format!("'{}' is not a valid URL: {}", self.destination, e),
                ))
            }
        }

        if self.settings.is_empty() {
            return Err(ValidationError::new("settings", "at least one event is required"));
        }

        if self.settings.iter().any(|s| s.trim().is_empty()) {
            return Err(ValidationError::new("settings", "event names must not be empty"));
        }

        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A amoCRM devolve ids numéricos; aqui eles viram string
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}

/// Eventos de webhook da amoCRM
///
/// **IMPORTANTE**: a lista não é exaustiva; `settings` aceita qualquer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEvent {
    // ========== LEADS ==========
    AddLead,
    UpdateLead,
    DeleteLead,
    RestoreLead,
    StatusLead,
    ResponsibleLead,
    NoteLead,

    // ========== CONTACTS ==========
    AddContact,
    UpdateContact,
    DeleteContact,
    RestoreContact,
    ResponsibleContact,
    NoteContact,

    // ========== COMPANIES ==========
    AddCompany,
    UpdateCompany,
    DeleteCompany,
    RestoreCompany,
    ResponsibleCompany,
    NoteCompany,

    // ========== TASKS ==========
    AddTask,
    UpdateTask,
    DeleteTask,
    ResponsibleTask,

    // ========== CHATS ==========
    AddTalk,
    UpdateTalk,
    AddMessage,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddLead => "add_lead",
            Self::UpdateLead => "update_lead",
            Self::DeleteLead => "delete_lead",
            Self::RestoreLead => "restore_lead",
            Self::StatusLead => "status_lead",
            Self::ResponsibleLead => "responsible_lead",
            Self::NoteLead => "note_lead",
            Self::AddContact => "add_contact",
            Self::UpdateContact => "update_contact",
            Self::DeleteContact => "delete_contact",
            Self::RestoreContact => "restore_contact",
            Self::ResponsibleContact => "responsible_contact",
            Self::NoteContact => "note_contact",
            Self::AddCompany => "add_company",
            Self::UpdateCompany => "update_company",
            Self::DeleteCompany => "delete_company",
            Self::RestoreCompany => "restore_company",
            Self::ResponsibleCompany => "responsible_company",
            Self::NoteCompany => "note_company",
            Self::AddTask => "add_task",
            Self::UpdateTask => "update_task",
            Self::DeleteTask => "delete_task",
            Self::ResponsibleTask => "responsible_task",
            Self::AddTalk => "add_talk",
            Self::UpdateTalk => "update_talk",
            Self::AddMessage => "add_message",
        }
    }

    /// Eventos essenciais de lead (create, update, status, delete)
    pub fn essential_lead_events() -> Vec<Self> {
        vec![
            Self::AddLead,
            Self::UpdateLead,
            Self::StatusLead,
            Self::DeleteLead,
        ]
    }

    /// Todos os eventos de contato
    pub fn all_contact_events() -> Vec<Self> {
        vec![
            Self::AddContact,
            Self::UpdateContact,
            Self::DeleteContact,
            Self::RestoreContact,
            Self::ResponsibleContact,
            Self::NoteContact,
        ]
    }
}

impl From<WebhookEvent> for String {
    fn from(event: WebhookEvent) -> Self {
        event.as_str().to_string()
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
