//! Wire-level types shared between the HTTP layer and anything that talks to it:
//! inbound webhook payload shapes and the outbound send descriptor the broker
//! hands to a messaging adapter.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// `GET /webhooks/whatsapp` verification handshake query params.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

/// The subset of the WhatsApp Cloud API webhook body this service depends on.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppWebhookBody {
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppEntry {
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChange {
    pub value: WhatsAppChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChangeValue {
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub id: Option<String>,
    pub from: Option<String>,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    pub timestamp: Option<String>,
    pub text: Option<WhatsAppTextBody>,
    pub caption: Option<String>,
    pub image: Option<WhatsAppMediaRef>,
    pub video: Option<WhatsAppMediaRef>,
    pub audio: Option<WhatsAppMediaRef>,
    pub document: Option<WhatsAppMediaRef>,
    pub location: Option<WhatsAppLocation>,
}

fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppTextBody {
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMediaRef {
    pub id: Option<String>,
    #[serde(rename = "mime_type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The subset of a Stripe event this service depends on, once the signature has
/// been verified and the raw body parsed as JSON by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// An outbound send as composed by the orchestrator, handed to the Window
/// Arbiter and finally an adapter. Free-form bodies are capped at 1024 chars
/// per the external delivery contract; templates carry an ordered parameter
/// map keyed "1", "2", ... matching the provider's placeholder convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundSend {
    pub to: String,
    pub free_form: Option<String>,
    pub template: Option<TemplateDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub name: String,
    pub params: BTreeMap<String, String>,
}

/// Result an adapter returns after attempting delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: String,
    pub message_id: Option<String>,
}
