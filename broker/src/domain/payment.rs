//! Payment Correlator (C8): applies a verified `checkout.session.completed` webhook to a lead.

use crate::db::enums::Status;
use crate::db::leads::Lead;
use crate::db::leads::StatusUpdate;
use crate::db::system_events;
use crate::domain::idempotency;
use crate::domain::outbox;
use crate::domain::outbox::OutboundPayload;
use crate::domain::window;
use crate::domain::window::WindowDecision;
use crate::ports::MirrorSink;
use crate::ports::Notifier;
use crate::settings::Settings;
use anyhow::Result;
use diesel::Connection;
use diesel::PgConnection;
use serde_json::json;
use time::OffsetDateTime;

const PROVIDER: &str = "stripe";

/// The subset of a `checkout.session.completed` event the correlator needs; extracting these
/// fields from the provider's JSON body (and rejecting malformed payloads) is the HTTP layer's
/// job, per §4.8 step 1.
#[derive(Debug, Clone)]
pub struct CheckoutSessionCompleted {
    pub event_id: String,
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub lead_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Duplicate,
    LeadNotFound,
    SessionMismatch,
    StatusMismatch,
    Applied { lead_id: i32 },
}

/// Handles a verified `checkout.session.completed` event end to end. Other event types are
/// acknowledged by the caller without ever reaching this function (§6).
pub async fn handle_checkout_completed(
    conn: &mut PgConnection,
    event: &CheckoutSessionCompleted,
    notifier: &dyn Notifier,
    mirror_sink: &dyn MirrorSink,
    settings: &Settings,
) -> Result<PaymentOutcome> {
    let now = OffsetDateTime::now_utc();

    let Some(lead) = Lead::find(conn, event.lead_id)? else {
        return Ok(PaymentOutcome::LeadNotFound);
    };

    if let Some(existing_session) = &lead.checkout_session_id {
        if existing_session != &event.session_id {
            system_events::warn(
                conn,
                "session_id_mismatch",
                Some(lead.id),
                json!({
                    "expected": existing_session,
                    "received": event.session_id,
                }),
            )?;
            return Ok(PaymentOutcome::SessionMismatch);
        }
    }

    if idempotency::check_only(conn, PROVIDER, &event.event_id)? {
        return Ok(PaymentOutcome::Duplicate);
    }

    let applied = conn.transaction(|conn| -> Result<bool> {
        let mut update = StatusUpdate::default().deposit_paid_at(now);
        if let Some(payment_intent_id) = &event.payment_intent_id {
            update = update.payment_intent_id(payment_intent_id.clone());
        }

        let mut matched = Lead::update_status_if_matches(
            conn,
            lead.id,
            Status::AwaitingDeposit,
            Status::DepositPaid,
            |_| update,
        )?;

        if matched.is_none() {
            let current = Lead::find(conn, lead.id)?
                .ok_or_else(|| anyhow::anyhow!("lead {} vanished mid-transaction", lead.id))?;

            if current.status == Status::DepositPaid {
                return Ok(false);
            }

            if current.status == Status::NeedsArtistReply {
                let mut retry_update = StatusUpdate::default().deposit_paid_at(now);
                if let Some(payment_intent_id) = &event.payment_intent_id {
                    retry_update = retry_update.payment_intent_id(payment_intent_id.clone());
                }
                matched = Lead::update_status_if_matches(
                    conn,
                    lead.id,
                    Status::NeedsArtistReply,
                    Status::DepositPaid,
                    |_| retry_update,
                )?;
            }
        }

        let Some(_) = matched else {
            system_events::warn(
                conn,
                "webhook_failure",
                Some(lead.id),
                json!({ "reason": "status_mismatch" }),
            )?;
            return Ok(false);
        };

        let follow_up = Lead::update_status_if_matches(
            conn,
            lead.id,
            Status::DepositPaid,
            Status::BookingPending,
            |u| u.booking_pending_at(now),
        )?;
        if follow_up.is_none() {
            anyhow::bail!("lost race transitioning {} to BOOKING_PENDING", lead.id);
        }

        Ok(true)
    })?;

    if !applied {
        // The earlier `matched.is_none() && current.status == DepositPaid` branch returns here
        // as a duplicate-shaped success per §4.8 step 6; a genuine status mismatch has already
        // logged `webhook_failure` above.
        let current = Lead::find(conn, lead.id)?;
        return Ok(match current.map(|l| l.status) {
            Some(Status::DepositPaid) | Some(Status::BookingPending) => PaymentOutcome::Duplicate,
            _ => PaymentOutcome::StatusMismatch,
        });
    }

    let snapshot = json!({
        "lead_id": lead.id,
        "wa_from": lead.wa_from,
        "checkout_session_id": event.session_id,
        "payment_intent_id": event.payment_intent_id,
    });
    if settings.feature_sheets_enabled {
        if let Err(e) = mirror_sink.mirror(lead.id, snapshot).await {
            tracing::warn!(lead_id = lead.id, error = %e, "mirror sink failed for payment event");
        }
    }

    let decision = window::decide_and_record(
        conn,
        lead.id,
        Status::BookingPending,
        lead.last_client_message_at,
        now,
        Some("deposit_received"),
        "deposit_received",
    )?;
    if !matches!(decision, WindowDecision::BlockedNoTemplate | WindowDecision::OptedOut) {
        let payload = OutboundPayload {
            to: lead.wa_from.clone(),
            free_form: None,
            template_name: Some("deposit_received".to_string()),
            template_params: Some(json!({ "lead_id": lead.id })),
        };
        outbox::enqueue_or_send(conn, Some(lead.id), "whatsapp", &payload, settings.outbox_enabled, notifier).await?;
    }

    if settings.feature_notifications_enabled {
        if let Err(e) = notifier
            .notify_operator(&format!("Deposit paid for lead {}", lead.id))
            .await
        {
            tracing::warn!(lead_id = lead.id, error = %e, "operator notification failed for payment event");
        }
    }

    if let Err(e) = idempotency::check_and_record(conn, PROVIDER, &event.event_id, "checkout.session.completed", Some(lead.id)) {
        tracing::error!(lead_id = lead.id, error = %e, "failed to record processed payment event; will dedupe on retry");
    }

    Ok(PaymentOutcome::Applied { lead_id: lead.id })
}
