//! `POST /webhooks/whatsapp` and `POST /webhooks/stripe`, the two inbound surfaces described in
//! §6. Both verify a provider signature on the raw body before touching JSON.

use crate::db::attachments::Attachment;
use crate::db::attachments::NewAttachment;
use crate::db::leads::Lead;
use crate::db::leads::NewLead;
use crate::db::system_events;
use crate::domain::idempotency;
use crate::domain::orchestrator;
use crate::domain::orchestrator::Capabilities;
use crate::domain::orchestrator::OrchestratorOutcome;
use crate::domain::outbox;
use crate::domain::outbox::OutboundPayload;
use crate::domain::payment;
use crate::domain::payment::CheckoutSessionCompleted;
use crate::domain::payment::PaymentOutcome;
use crate::ports::Notifier;
use crate::routes::AppState;
use crate::signature;
use crate::AppError;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use broker_commons::WhatsAppVerifyQuery;
use broker_commons::WhatsAppWebhookBody;
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::spawn_blocking;
use tracing::instrument;

const DEFAULT_ARTIST_ID: &str = "default";

/// Parses a lead id out of a Stripe `metadata.lead_id` or `client_reference_id` value, which
/// Stripe may send as either a JSON number or a numeric string. Rejects non-positive values.
fn parse_lead_id(value: &serde_json::Value) -> Option<i32> {
    let id = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if id > 0 {
        i32::try_from(id).ok()
    } else {
        None
    }
}

#[instrument(skip_all)]
pub async fn verify_whatsapp(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WhatsAppVerifyQuery>,
) -> impl IntoResponse {
    let verify_token = &state.whatsapp_verify_token;
    match (params.hub_mode.as_deref(), &params.hub_verify_token, &params.hub_challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if token == verify_token => {
            (axum::http::StatusCode::OK, challenge.clone()).into_response()
        }
        _ => (axum::http::StatusCode::FORBIDDEN, "verification failed").into_response(),
    }
}

#[instrument(skip_all, err(Debug))]
pub async fn inbound_whatsapp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature_header = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let signed = signature::verify_whatsapp_signature(&body, signature_header, &state.whatsapp_app_secret);
    if !signed && !(matches!(state.app_env, crate::cli::AppEnv::Dev) && state.whatsapp_app_secret.is_empty()) {
        return Err(AppError::SignatureInvalid("invalid X-Hub-Signature-256".to_string()));
    }

    let payload: WhatsAppWebhookBody = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed WhatsApp payload: {e}")))?;

    let settings = state.settings.read().await.clone();

    let pool = state.pool.clone();
    let renderer = state.renderer.clone();
    let slot_provider = state.slot_provider.clone();
    let notifier = state.notifier.clone();

    let results = spawn_blocking(move || -> anyhow::Result<Vec<serde_json::Value>> {
        let mut conn = pool.get()?;
        let mut out = Vec::new();

        for entry in payload.entry {
            for change in entry.changes {
                for message in change.value.messages {
                    let Some(from) = message.from.clone() else { continue };
                    let Some(wa_message_id) = message.id.clone() else { continue };

                    let (is_duplicate, _) = idempotency::check_and_record(
                        &mut conn,
                        "whatsapp",
                        &wa_message_id,
                        "inbound_message",
                        None,
                    )?;
                    if is_duplicate {
                        out.push(json!({ "received": true, "duplicate": true, "wa_message_id": wa_message_id }));
                        continue;
                    }

                    let existing = Lead::find_by_wa_from(&mut conn, &from)?;
                    if existing.is_none() && !settings.is_pilot_allowed(&from) {
                        out.push(json!({ "received": true, "pilot_restricted": true }));
                        continue;
                    }
                    let lead = match existing {
                        Some(lead) => lead,
                        None => Lead::insert(&mut conn, NewLead::new(from.clone(), DEFAULT_ARTIST_ID))?,
                    };

                    if settings.panic_mode_enabled {
                        system_events::warn(
                            &mut conn,
                            "panic_mode_inbound",
                            Some(lead.id),
                            json!({ "wa_message_id": wa_message_id }),
                        )?;
                        let note = format!("Panic mode: message held for lead {}", lead.id);
                        if let Err(e) =
                            tokio::runtime::Handle::current().block_on(notifier.notify_operator(&note))
                        {
                            tracing::warn!(lead_id = lead.id, error = %e, "operator notification failed for panic mode");
                        }
                        let safe_reply = OutboundPayload {
                            to: lead.wa_from.clone(),
                            free_form: Some(
                                "We're briefly pausing automated replies. A team member will follow up shortly."
                                    .to_string(),
                            ),
                            template_name: None,
                            template_params: None,
                        };
                        outbox::send_direct(notifier.as_ref(), &safe_reply)?;
                        out.push(json!({ "received": true, "lead_id": lead.id, "panic_mode": true }));
                        continue;
                    }

                    let text = message.text.as_ref().and_then(|t| t.body.clone()).unwrap_or_default();
                    let has_media = message.image.is_some()
                        || message.video.is_some()
                        || message.audio.is_some()
                        || message.document.is_some()
                        || message.location.is_some();

                    if let Some(media) = message
                        .image
                        .as_ref()
                        .or(message.video.as_ref())
                        .or(message.audio.as_ref())
                        .or(message.document.as_ref())
                    {
                        if let Some(media_id) = &media.id {
                            Attachment::insert(
                                &mut conn,
                                NewAttachment {
                                    lead_id: lead.id,
                                    wa_media_id: media_id.clone(),
                                    mime_type: media.mime_type.clone(),
                                    caption: message.caption.clone(),
                                },
                            )?;
                        }
                    }

                    let inbound_timestamp = message
                        .timestamp
                        .as_deref()
                        .and_then(|ts| ts.parse::<i64>().ok())
                        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

                    let caps = Capabilities {
                        renderer: renderer.as_ref(),
                        slot_provider: slot_provider.as_ref(),
                        notifier: notifier.as_ref(),
                        feature_calendar_enabled: settings.feature_calendar_enabled,
                        outbox_enabled: settings.outbox_enabled,
                    };

                    let outcome = orchestrator::handle_inbound(&mut conn, &lead, &text, has_media, inbound_timestamp, &caps)?;

                    out.push(match outcome {
                        OrchestratorOutcome::Handled { lead_id, outbound_sent } => {
                            json!({ "received": true, "lead_id": lead_id, "outbound_sent": outbound_sent })
                        }
                        OrchestratorOutcome::StepAlreadyAdvanced { lead_id } => {
                            json!({ "received": true, "lead_id": lead_id, "step_already_advanced": true })
                        }
                        OrchestratorOutcome::OutOfOrder { lead_id } => {
                            json!({ "received": true, "lead_id": lead_id, "out_of_order": true })
                        }
                        OrchestratorOutcome::Acknowledged { lead_id } => {
                            json!({ "received": true, "lead_id": lead_id, "acknowledged": true })
                        }
                    });
                }
            }
        }

        Ok(out)
    })
    .await
    .map_err(|e| AppError::Fatal(format!("inbound webhook task panicked: {e}")))??;

    Ok(Json(json!({ "received": true, "messages": results })))
}

#[instrument(skip_all, err(Debug))]
pub async fn inbound_stripe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature_header = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !signature::verify_stripe_signature(&body, signature_header, &state.stripe_webhook_secret) {
        return Err(AppError::SignatureInvalid("invalid stripe-signature".to_string()));
    }

    let event: broker_commons::StripeWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed Stripe payload: {e}")))?;

    if event.event_type != "checkout.session.completed" {
        return Ok(Json(json!({ "received": true, "type": event.event_type, "ignored": true })));
    }

    let event_id = event.id.clone().unwrap_or_default();
    let object = &event.data.object;
    let session_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("missing checkout session id".to_string()))?
        .to_string();
    let payment_intent_id = object.get("payment_intent").and_then(|v| v.as_str()).map(String::from);
    let lead_id = object
        .get("metadata")
        .and_then(|m| m.get("lead_id"))
        .and_then(parse_lead_id)
        .or_else(|| object.get("client_reference_id").and_then(parse_lead_id))
        .ok_or_else(|| AppError::BadRequest("no lead_id found in checkout session".to_string()))?;

    let checkout_event = CheckoutSessionCompleted {
        event_id,
        session_id,
        payment_intent_id,
        lead_id,
    };

    let pool = state.pool.clone();
    let notifier = state.notifier.clone();
    let mirror_sink = state.mirror_sink.clone();
    let settings = state.settings.read().await.clone();

    let mut conn = pool
        .get()
        .map_err(|e| AppError::Fatal(format!("database unavailable: {e:#}")))?;

    let outcome = payment::handle_checkout_completed(
        &mut conn,
        &checkout_event,
        notifier.as_ref(),
        mirror_sink.as_ref(),
        &settings,
    )
    .await
    .map_err(AppError::from)?;

    let body = match outcome {
        PaymentOutcome::Applied { lead_id } => json!({ "received": true, "type": "checkout.session.completed", "lead_id": lead_id }),
        PaymentOutcome::Duplicate => json!({ "received": true, "type": "checkout.session.completed", "duplicate": true }),
        PaymentOutcome::LeadNotFound => {
            return Err(AppError::NotFound(format!("lead {} not found", checkout_event.lead_id)))
        }
        PaymentOutcome::SessionMismatch => {
            return Err(AppError::BadRequest("checkout session id does not match lead".to_string()))
        }
        PaymentOutcome::StatusMismatch => {
            return Err(AppError::StatusMismatch(format!(
                "lead {} is not awaiting a deposit",
                checkout_event.lead_id
            )))
        }
    };

    Ok(Json(body))
}
