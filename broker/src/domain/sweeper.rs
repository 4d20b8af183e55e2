//! Reminder/Sweeper (C9): periodic time-based transitions and reminders, per §4.9.

use crate::db::enums::Status;
use crate::db::leads::Lead;
use crate::db::leads::ReminderKind;
use crate::domain::idempotency;
use crate::domain::outbox;
use crate::domain::outbox::OutboundPayload;
use crate::domain::status as status_machine;
use crate::domain::window;
use crate::domain::window::WindowDecision;
use crate::ports::Notifier;
use crate::settings::Settings;
use anyhow::Result;
use diesel::PgConnection;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;

const PROVIDER: &str = "sweeper";

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepCounts {
    pub reminders_sent: u32,
    pub transitions: u32,
    pub duplicates_skipped: u32,
}

async fn send_template(
    conn: &mut PgConnection,
    lead: &Lead,
    template_name: &str,
    intent: &str,
    now: OffsetDateTime,
) -> Result<bool> {
    let decision = window::decide_and_record(
        conn,
        lead.id,
        lead.status,
        lead.last_client_message_at,
        now,
        Some(template_name),
        intent,
    )?;
    match decision {
        WindowDecision::OptedOut | WindowDecision::BlockedNoTemplate => Ok(false),
        WindowDecision::Open | WindowDecision::ClosedTemplateUsed { .. } => {
            let payload = OutboundPayload {
                to: lead.wa_from.clone(),
                free_form: None,
                template_name: Some(template_name.to_string()),
                template_params: Some(json!({ "lead_id": lead.id })),
            };
            outbox::enqueue(conn, Some(lead.id), "whatsapp", &payload)?;
            Ok(true)
        }
    }
}

/// Runs every predicate in the §4.9 table once, in order, and returns a tally. The HTTP layer has
/// no part in this; it is driven purely by the scheduler. `panic_mode_enabled` pauses the sweep
/// entirely; `feature_reminders_enabled` pauses only the reminder sends, leaving the time-based
/// status transitions (abandon/stale/expiry/follow-up) running.
pub async fn run_once(
    conn: &mut PgConnection,
    notifier: &dyn Notifier,
    now: OffsetDateTime,
    settings: &Settings,
) -> Result<SweepCounts> {
    let mut counts = SweepCounts::default();

    if settings.panic_mode_enabled {
        tracing::info!("sweep skipped: panic mode enabled");
        return Ok(counts);
    }

    if settings.feature_reminders_enabled {
        qualifying_reminder_1(conn, now, &mut counts).await?;
        qualifying_reminder_2(conn, now, &mut counts).await?;
    }
    qualifying_abandon(conn, now, &mut counts)?;
    pending_approval_stale(conn, now, &mut counts)?;
    awaiting_deposit_expiry(conn, now, &mut counts)?;
    booking_pending_follow_up(conn, notifier, now, &mut counts, settings).await?;
    if settings.feature_reminders_enabled {
        booking_reminder_24h(conn, now, &mut counts).await?;
        booking_reminder_72h(conn, now, &mut counts).await?;
    }

    Ok(counts)
}

async fn qualifying_reminder_1(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(12);
    for lead in Lead::due_qualifying_reminder_1(conn, threshold)? {
        let key = format!("reminder_qualifying_{}_1_12h", lead.id);
        let (is_duplicate, _) = idempotency::check_and_record(conn, PROVIDER, &key, "reminder_qualifying_1", Some(lead.id))?;
        if is_duplicate {
            counts.duplicates_skipped += 1;
            continue;
        }
        if send_template(conn, &lead, "qualifying.reminder_1", "reminder_qualifying_1", now).await? {
            Lead::mark_reminder_sent(conn, lead.id, ReminderKind::Qualifying1, now)?;
            counts.reminders_sent += 1;
        }
    }
    Ok(())
}

async fn qualifying_reminder_2(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(36);
    for lead in Lead::due_qualifying_reminder_2(conn, threshold)? {
        let key = format!("reminder_qualifying_{}_2_36h", lead.id);
        let (is_duplicate, _) = idempotency::check_and_record(conn, PROVIDER, &key, "reminder_qualifying_2", Some(lead.id))?;
        if is_duplicate {
            counts.duplicates_skipped += 1;
            continue;
        }
        if send_template(conn, &lead, "qualifying.reminder_2", "reminder_qualifying_2", now).await? {
            Lead::mark_reminder_sent(conn, lead.id, ReminderKind::Qualifying2, now)?;
            counts.reminders_sent += 1;
        }
    }
    Ok(())
}

fn qualifying_abandon(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(48);
    for lead in Lead::due_qualifying_abandon(conn, threshold)? {
        if status_machine::transition(conn, lead.id, Status::Qualifying, Status::Abandoned, None).is_ok() {
            counts.transitions += 1;
        }
    }
    Ok(())
}

fn pending_approval_stale(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::days(3);
    for lead in Lead::due_pending_approval_stale(conn, threshold)? {
        if status_machine::transition(conn, lead.id, Status::PendingApproval, Status::Stale, None).is_ok() {
            counts.transitions += 1;
        }
    }
    Ok(())
}

fn awaiting_deposit_expiry(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(24);
    for lead in Lead::due_deposit_expiry(conn, threshold)? {
        if status_machine::transition(conn, lead.id, Status::AwaitingDeposit, Status::DepositExpired, None).is_ok() {
            counts.transitions += 1;
        }
    }
    Ok(())
}

async fn booking_pending_follow_up(
    conn: &mut PgConnection,
    notifier: &dyn Notifier,
    now: OffsetDateTime,
    counts: &mut SweepCounts,
    settings: &Settings,
) -> Result<()> {
    let threshold = now - Duration::hours(72);
    for lead in Lead::due_booking_follow_up(conn, threshold)? {
        let key = format!("reminder_booking_followup_{}", lead.id);
        let (is_duplicate, _) = idempotency::check_and_record(conn, PROVIDER, &key, "booking_follow_up", Some(lead.id))?;
        if is_duplicate {
            counts.duplicates_skipped += 1;
            continue;
        }
        if status_machine::transition(conn, lead.id, Status::BookingPending, Status::NeedsFollowUp, Some("booking_pending timed out"))
            .is_ok()
        {
            counts.transitions += 1;
            if settings.feature_notifications_enabled {
                if let Err(e) = notifier
                    .notify_operator(&format!("Lead {} stalled in BOOKING_PENDING for 72h", lead.id))
                    .await
                {
                    tracing::warn!(lead_id = lead.id, error = %e, "operator notification failed for booking follow-up");
                }
            }
        }
    }
    Ok(())
}

async fn booking_reminder_24h(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(24);
    for lead in Lead::due_booking_reminder_24h(conn, threshold)? {
        let key = format!("reminder_booking_{}_24h", lead.id);
        let (is_duplicate, _) = idempotency::check_and_record(conn, PROVIDER, &key, "reminder_booking_24h", Some(lead.id))?;
        if is_duplicate {
            counts.duplicates_skipped += 1;
            continue;
        }
        if send_template(conn, &lead, "booking.reminder_24h", "reminder_booking_24h", now).await? {
            Lead::mark_reminder_sent(conn, lead.id, ReminderKind::Booking24h, now)?;
            counts.reminders_sent += 1;
        }
    }
    Ok(())
}

async fn booking_reminder_72h(conn: &mut PgConnection, now: OffsetDateTime, counts: &mut SweepCounts) -> Result<()> {
    let threshold = now - Duration::hours(72);
    for lead in Lead::due_booking_reminder_72h(conn, threshold)? {
        let key = format!("reminder_booking_{}_72h", lead.id);
        let (is_duplicate, _) = idempotency::check_and_record(conn, PROVIDER, &key, "reminder_booking_72h", Some(lead.id))?;
        if is_duplicate {
            counts.duplicates_skipped += 1;
            continue;
        }
        if send_template(conn, &lead, "booking.reminder_72h", "reminder_booking_72h", now).await? {
            Lead::mark_reminder_sent(conn, lead.id, ReminderKind::Booking72h, now)?;
            counts.reminders_sent += 1;
        }
    }
    Ok(())
}
