//! Operator endpoints, gated by `X-Admin-Key`, per §4.6 and §6.

use crate::db::enums::Status;
use crate::db::leads::Lead;
use crate::domain::outbox;
use crate::domain::outbox::OutboundPayload;
use crate::domain::status as status_machine;
use crate::domain::window;
use crate::domain::window::WindowDecision;
use crate::routes::AppState;
use crate::AppError;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::spawn_blocking;
use tracing::instrument;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided.is_empty() || provided != state.admin_api_key {
        return Err(AppError::SignatureInvalid("missing or invalid X-Admin-Key".to_string()));
    }
    Ok(())
}

fn lead_snapshot(lead: &Lead) -> Value {
    json!({
        "id": lead.id,
        "wa_from": lead.wa_from,
        "artist_id": lead.artist_id,
        "status": lead.status.as_str(),
        "current_step": lead.current_step,
        "estimated_category": lead.estimated_category.map(|c| format!("{c:?}")),
        "estimated_days": lead.estimated_days,
        "estimated_deposit_amount_pence": lead.estimated_deposit_amount_pence,
        "deposit_amount_pence": lead.deposit_amount_pence,
        "region_bucket": lead.region_bucket.map(|r| format!("{r:?}")),
        "below_min_budget": lead.below_min_budget,
        "checkout_session_id": lead.checkout_session_id,
        "suggested_slots_json": lead.suggested_slots_json,
        "selected_slot_start_at": lead.selected_slot_start_at,
        "booking_pending_at": lead.booking_pending_at,
        "booked_at": lead.booked_at,
        "booking_link": lead.booking_link,
        "booking_tool": lead.booking_tool,
        "booking_link_sent_at": lead.booking_link_sent_at,
        "handover_reason": lead.handover_reason,
        "created_at": lead.created_at,
    })
}

#[instrument(skip_all, err(Debug))]
pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    let lead = spawn_blocking(move || -> anyhow::Result<Option<Lead>> {
        let mut conn = pool.get()?;
        Ok(Lead::find(&mut conn, lead_id)?)
    })
    .await
    .map_err(|e| AppError::Fatal(format!("snapshot task panicked: {e}")))?
    .map_err(AppError::from)?
    .ok_or_else(|| AppError::NotFound(format!("lead {lead_id} not found")))?;

    Ok(Json(lead_snapshot(&lead)))
}

#[instrument(skip_all, err(Debug))]
pub async fn approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    let checkout_creator = state.checkout_creator.clone();

    let mut conn = pool
        .get()
        .map_err(|e| AppError::Fatal(format!("database unavailable: {e:#}")))?;

    let lead = Lead::find(&mut conn, lead_id)
        .map_err(|e| AppError::Fatal(format!("lookup failed: {e}")))?
        .ok_or_else(|| AppError::NotFound(format!("lead {lead_id} not found")))?;

    if lead.status != Status::PendingApproval {
        return Err(AppError::InvalidTransition(format!(
            "Cannot approve in status '{}'. Lead must be in 'PENDING_APPROVAL'.",
            lead.status
        )));
    }

    let settings = state.settings.read().await.clone();
    let deposit_rule_version = settings.deposit_rule_version.clone();
    let amount_pence = lead
        .estimated_deposit_amount_pence
        .ok_or_else(|| AppError::BadRequest("lead has no estimated deposit amount".to_string()))?;

    let session = checkout_creator
        .create_session(lead.id, amount_pence, &deposit_rule_version)
        .await
        .map_err(|e| AppError::Fatal(format!("failed to create checkout session: {e:#}")))?;

    let now = OffsetDateTime::now_utc();
    Lead::lock_deposit_amount(&mut conn, lead.id, amount_pence, &deposit_rule_version, now)
        .map_err(|e| AppError::Fatal(format!("failed to lock deposit amount: {e}")))?;
    Lead::set_checkout_session(&mut conn, lead.id, &session.session_id, session.expires_at, now)
        .map_err(|e| AppError::Fatal(format!("failed to record checkout session: {e}")))?;

    let updated = status_machine::transition(&mut conn, lead.id, Status::PendingApproval, Status::AwaitingDeposit, None)
        .map_err(|e| AppError::InvalidTransition(e.to_string()))?;

    let decision = window::decide_and_record(
        &mut conn,
        updated.id,
        updated.status,
        updated.last_client_message_at,
        now,
        Some("deposit_request"),
        "deposit_request",
    )
    .map_err(AppError::from)?;
    if !matches!(decision, WindowDecision::BlockedNoTemplate | WindowDecision::OptedOut) {
        let payload = OutboundPayload {
            to: updated.wa_from.clone(),
            free_form: None,
            template_name: Some("deposit_request".to_string()),
            template_params: Some(json!({ "lead_id": updated.id, "checkout_url": session.url })),
        };
        outbox::enqueue_or_send(
            &mut conn,
            Some(updated.id),
            "whatsapp",
            &payload,
            settings.outbox_enabled,
            state.notifier.as_ref(),
        )
        .await
        .map_err(AppError::from)?;
    }

    Ok(Json(json!({ "lead_id": updated.id, "status": updated.status.as_str(), "checkout_url": session.url })))
}

#[instrument(skip_all, err(Debug))]
pub async fn reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    let updated = spawn_blocking(move || -> anyhow::Result<Lead> {
        let mut conn = pool.get()?;
        status_machine::transition(&mut conn, lead_id, Status::PendingApproval, Status::Rejected, None)
    })
    .await
    .map_err(|e| AppError::Fatal(format!("reject task panicked: {e}")))?
    .map_err(|e| AppError::InvalidTransition(e.to_string()))?;

    Ok(Json(json!({ "lead_id": updated.id, "status": updated.status.as_str() })))
}

#[derive(Debug, Deserialize)]
pub struct SetSlotsBody {
    pub slots: Value,
}

#[instrument(skip_all, err(Debug))]
pub async fn set_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
    Json(body): Json<SetSlotsBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = pool.get()?;
        Lead::set_suggested_slots(&mut conn, lead_id, body.slots)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Fatal(format!("set_slots task panicked: {e}")))?
    .map_err(AppError::from)?;

    Ok(Json(json!({ "lead_id": lead_id, "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct SendBookingLinkBody {
    pub booking_link: String,
    pub booking_tool: String,
}

/// `DepositPaid -> BookingLinkSent` per §6; the only path that makes `BookingLinkSent` reachable.
#[instrument(skip_all, err(Debug))]
pub async fn send_booking_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
    Json(body): Json<SendBookingLinkBody>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    let now = OffsetDateTime::now_utc();
    let settings = state.settings.read().await.clone();
    let notifier = state.notifier.clone();

    let updated = spawn_blocking(move || -> anyhow::Result<Lead> {
        let mut conn = pool.get()?;
        Lead::set_booking_link(&mut conn, lead_id, &body.booking_link, &body.booking_tool)?;
        let updated = status_machine::transition(&mut conn, lead_id, Status::DepositPaid, Status::BookingLinkSent, None)?;

        let decision = window::decide_and_record(
            &mut conn,
            updated.id,
            updated.status,
            updated.last_client_message_at,
            now,
            Some("booking_link_sent"),
            "booking_link_sent",
        )?;
        if !matches!(decision, WindowDecision::BlockedNoTemplate | WindowDecision::OptedOut) {
            let payload = OutboundPayload {
                to: updated.wa_from.clone(),
                free_form: None,
                template_name: Some("booking_link_sent".to_string()),
                template_params: Some(json!({ "lead_id": updated.id, "booking_link": body.booking_link })),
            };
            if settings.outbox_enabled {
                outbox::enqueue(&mut conn, Some(updated.id), "whatsapp", &payload)?;
            } else {
                outbox::send_direct(notifier.as_ref(), &payload)?;
            }
        }

        Ok(updated)
    })
    .await
    .map_err(|e| AppError::Fatal(format!("send_booking_link task panicked: {e}")))?
    .map_err(|e| AppError::InvalidTransition(e.to_string()))?;

    Ok(Json(json!({ "lead_id": updated.id, "status": updated.status.as_str(), "booking_link": updated.booking_link })))
}

#[instrument(skip_all, err(Debug))]
pub async fn book(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;

    let pool = state.pool.clone();
    let updated = spawn_blocking(move || -> anyhow::Result<Lead> {
        let mut conn = pool.get()?;
        status_machine::transition(&mut conn, lead_id, Status::BookingPending, Status::Booked, None)
    })
    .await
    .map_err(|e| AppError::Fatal(format!("book task panicked: {e}")))?
    .map_err(|e| AppError::InvalidTransition(e.to_string()))?;

    Ok(Json(json!({ "lead_id": updated.id, "status": updated.status.as_str() })))
}
