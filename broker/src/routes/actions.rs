//! `GET/POST /a/:token` — single-use operator action links, per §6 "Operator action tokens".
//! The token carries the lead, the action to perform, and the status the lead must still be in;
//! `GET` renders a read-only confirmation, `POST` consumes the token and executes the action.

use crate::db::action_tokens::ActionToken;
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
use axum::Json;
use diesel::PgConnection;
use serde_json::json;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

fn action_description(action_type: &str) -> &'static str {
    match action_type {
        "approve" => "Approve this lead and send the deposit link",
        "reject" => "Reject this lead",
        "book" => "Mark this lead as booked",
        _ => "Unrecognized action",
    }
}

/// Steps 1-4 of the validation order from §6: token exists, unused, unexpired, lead still in
/// `required_status`. Read-only; callers that intend to execute must still go through
/// `ActionToken::try_consume` themselves to close the race.
fn load_and_validate(
    conn: &mut PgConnection,
    token: &str,
    now: OffsetDateTime,
) -> Result<(ActionToken, Lead), AppError> {
    let action_token = ActionToken::find_by_token(conn, token)
        .map_err(|e| AppError::Fatal(format!("token lookup failed: {e}")))?
        .ok_or_else(|| AppError::NotFound("action link not found".to_string()))?;

    if action_token.used {
        return Err(AppError::BadRequest("action link has already been used".to_string()));
    }
    if action_token.expires_at <= now {
        return Err(AppError::BadRequest("action link has expired".to_string()));
    }

    let lead = Lead::find(conn, action_token.lead_id)
        .map_err(|e| AppError::Fatal(format!("lead lookup failed: {e}")))?
        .ok_or_else(|| AppError::NotFound(format!("lead {} not found", action_token.lead_id)))?;

    if lead.status != action_token.required_status {
        return Err(AppError::StatusMismatch(format!(
            "lead {} is no longer in status '{}'",
            lead.id, action_token.required_status
        )));
    }

    Ok((action_token, lead))
}

#[instrument(skip_all, err(Debug))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut conn = state.pool.get().map_err(|e| AppError::Fatal(format!("database unavailable: {e:#}")))?;
    let now = OffsetDateTime::now_utc();
    let (action_token, lead) = load_and_validate(&mut conn, &token, now)?;

    Ok(Json(json!({
        "action_type": action_token.action_type,
        "description": action_description(&action_token.action_type),
        "lead_id": lead.id,
        "status": lead.status.as_str(),
        "expires_at": action_token.expires_at,
    })))
}

#[instrument(skip_all, err(Debug))]
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut conn = state.pool.get().map_err(|e| AppError::Fatal(format!("database unavailable: {e:#}")))?;
    let now = OffsetDateTime::now_utc();
    let (action_token, _lead) = load_and_validate(&mut conn, &token, now)?;

    if !matches!(action_token.action_type.as_str(), "approve" | "reject" | "book") {
        return Err(AppError::BadRequest(format!(
            "action '{}' cannot be executed from a link",
            action_token.action_type
        )));
    }

    let consumed = ActionToken::try_consume(&mut conn, &token, now)
        .map_err(|e| AppError::Fatal(format!("failed to consume action link: {e}")))?;
    if !consumed {
        return Err(AppError::BadRequest("action link has already been used".to_string()));
    }

    let lead_id = action_token.lead_id;

    let (updated, extra) = match action_token.action_type.as_str() {
        "approve" => {
            let lead = Lead::find(&mut conn, lead_id)
                .map_err(|e| AppError::Fatal(format!("lead lookup failed: {e}")))?
                .ok_or_else(|| AppError::NotFound(format!("lead {lead_id} not found")))?;
            let amount_pence = lead
                .estimated_deposit_amount_pence
                .ok_or_else(|| AppError::BadRequest("lead has no estimated deposit amount".to_string()))?;
            let settings = state.settings.read().await.clone();
            let deposit_rule_version = settings.deposit_rule_version.clone();

            let session = state
                .checkout_creator
                .create_session(lead.id, amount_pence, &deposit_rule_version)
                .await
                .map_err(|e| AppError::Fatal(format!("failed to create checkout session: {e:#}")))?;

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

            (updated, json!({ "checkout_url": session.url }))
        }
        "reject" => {
            let updated = status_machine::transition(&mut conn, lead_id, Status::PendingApproval, Status::Rejected, None)
                .map_err(|e| AppError::InvalidTransition(e.to_string()))?;
            (updated, json!({}))
        }
        "book" => {
            let updated = status_machine::transition(&mut conn, lead_id, Status::BookingPending, Status::Booked, None)
                .map_err(|e| AppError::InvalidTransition(e.to_string()))?;
            (updated, json!({}))
        }
        other => return Err(AppError::BadRequest(format!("unknown action type '{other}'"))),
    };

    let mut body = json!({ "lead_id": updated.id, "status": updated.status.as_str() });
    if let (Value::Object(body_map), Value::Object(extra_map)) = (&mut body, extra) {
        body_map.extend(extra_map);
    }
    Ok(Json(body))
}
