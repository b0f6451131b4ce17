use serde::{Deserialize, Serialize};

/// Envelope HAL das respostas de lista da amoCRM:
/// `{"_embedded": {"<recurso>": [...]}, "_links": {...}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "_embedded", default)]
    pub embedded: T,

    #[serde(rename = "_links", default)]
    pub links: Links,
}

/// Links de navegação do envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}
