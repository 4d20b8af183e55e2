use crate::db::enums::Status;
use crate::db::leads::Lead;
use crate::db::leads::StatusUpdate;
use crate::db::system_events;
use anyhow::bail;
use anyhow::Result;
use diesel::Connection;
use diesel::PgConnection;
use serde_json::json;
use time::OffsetDateTime;

/// The legal-transition table from §4.6. Forbidden transitions MUST raise (invariant 1).
pub fn allowed_transitions(from: Status) -> &'static [Status] {
    use Status::*;
    match from {
        New => &[Qualifying],
        Qualifying => &[
            PendingApproval,
            NeedsArtistReply,
            NeedsFollowUp,
            TourConversionOffered,
            Waitlisted,
            Abandoned,
            Stale,
            Optout,
            NeedsManualFollowUp,
        ],
        PendingApproval => &[
            AwaitingDeposit,
            Rejected,
            NeedsArtistReply,
            NeedsFollowUp,
            Abandoned,
            Stale,
        ],
        AwaitingDeposit => &[
            DepositPaid,
            DepositExpired,
            Rejected,
            NeedsArtistReply,
            NeedsFollowUp,
            Abandoned,
            Stale,
            BookingLinkSent,
            CollectingTimeWindows,
        ],
        DepositPaid => &[
            BookingPending,
            Rejected,
            NeedsArtistReply,
            NeedsFollowUp,
            Abandoned,
            Stale,
            BookingLinkSent,
        ],
        BookingPending => &[
            Booked,
            Rejected,
            NeedsArtistReply,
            NeedsFollowUp,
            Abandoned,
            Stale,
            CollectingTimeWindows,
        ],
        CollectingTimeWindows => &[NeedsArtistReply, BookingPending],
        TourConversionOffered => &[Qualifying, PendingApproval, Waitlisted, Rejected, Abandoned, Stale],
        NeedsArtistReply => &[
            Qualifying,
            PendingApproval,
            AwaitingDeposit,
            DepositPaid,
            BookingPending,
            Rejected,
            Abandoned,
            Stale,
            Optout,
        ],
        NeedsFollowUp => &[
            PendingApproval,
            AwaitingDeposit,
            DepositPaid,
            BookingPending,
            Rejected,
            Abandoned,
            Stale,
        ],
        DepositExpired => &[Rejected, Abandoned, Stale],
        Optout => &[New],
        Abandoned => &[New],
        Stale => &[New],
        BookingLinkSent => &[BookingPending],
        Booked | Rejected | Waitlisted | NeedsManualFollowUp => &[],
    }
}

pub fn is_legal(from: Status, to: Status) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Stamps the status-entry timestamp column for `to`, if that column is still null. Terminal
/// entries like `approved_at`/`booked_at`/`rejected_at` are written through `StatusUpdate` by
/// the caller since they share the same `UPDATE` as the status write; the remaining "first
/// entry" timestamps are stamped here via a follow-up conditional `UPDATE ... WHERE col IS NULL`.
fn stamp_first_entry(conn: &mut PgConnection, lead_id: i32, to: Status, now: OffsetDateTime) -> Result<()> {
    use crate::schema::leads;
    use diesel::prelude::*;

    macro_rules! stamp {
        ($col:ident) => {{
            diesel::update(leads::table)
                .filter(leads::id.eq(lead_id))
                .filter(leads::$col.is_null())
                .set(leads::$col.eq(now))
                .execute(conn)?;
        }};
    }

    match to {
        Status::Qualifying => stamp!(qualifying_started_at),
        Status::PendingApproval => stamp!(pending_approval_at),
        Status::Stale => stamp!(stale_at),
        Status::Abandoned => stamp!(abandoned_at),
        Status::NeedsArtistReply => stamp!(needs_artist_reply_at),
        Status::NeedsFollowUp => stamp!(needs_follow_up_at),
        Status::DepositExpired => stamp!(deposit_expired_at),
        Status::BookingPending => stamp!(booking_pending_at),
        Status::BookingLinkSent => stamp!(booking_link_sent_at),
        _ => {}
    }
    Ok(())
}

/// `transition(lead_id, to_status, reason?, lock=true)` per §4.6: row-locks the lead, verifies
/// the transition is legal and that the caller's expected `from` still holds, writes the new
/// status, and stamps first-entry timestamps.
pub fn transition(
    conn: &mut PgConnection,
    lead_id: i32,
    expected_from: Status,
    to: Status,
    reason: Option<&str>,
) -> Result<Lead> {
    conn.transaction(|conn| {
        let lead = Lead::find_for_update(conn, lead_id)?
            .ok_or_else(|| anyhow::anyhow!("lead {lead_id} not found"))?;

        if !is_legal(lead.status, to) {
            bail!(
                "Cannot transition to '{to}' in status '{from}'. Lead must be in '{from}'.",
                to = to,
                from = lead.status
            );
        }

        if lead.status != expected_from {
            bail!(
                "changed during transition: expected '{expected_from}', found '{actual}'",
                expected_from = expected_from,
                actual = lead.status
            );
        }

        let now = OffsetDateTime::now_utc();
        let mut update = StatusUpdate::default();
        if to == Status::NeedsArtistReply {
            if let Some(reason) = reason {
                update = update.handover_reason(reason);
            }
        }
        if to == Status::PendingApproval {
            update = update.approved_at(now);
        }
        if to == Status::Rejected {
            update = update.rejected_at(now);
        }
        if to == Status::Booked {
            update = update.booked_at(now);
        }
        if to == Status::BookingPending {
            update = update.booking_pending_at(now);
        }

        let updated = Lead::update_status_if_matches(conn, lead_id, lead.status, to, |_| update)?
            .ok_or_else(|| anyhow::anyhow!("transition raced with a concurrent writer"))?;

        stamp_first_entry(conn, lead_id, to, now)?;

        Ok(updated)
    })
}

/// Thin wrapper used by admin operations and the payment correlator so they can skip the
/// `SELECT FOR UPDATE` round-trip and rely purely on the conditional `UPDATE`. Unlike
/// `transition`, this does not consult the legal-transition table — callers are expected to pass
/// `expected`/`new` pairs that are already legal.
pub fn update_status_if_matches(
    conn: &mut PgConnection,
    lead_id: i32,
    expected: Status,
    new: Status,
    build: impl FnOnce(StatusUpdate) -> StatusUpdate,
) -> Result<Option<Lead>> {
    Lead::update_status_if_matches(conn, lead_id, expected, new, build)
}

/// `advance_step_if_at`: per §4.6, the engine must flag pending uncommitted changes before this
/// call since a commit here would flush them unexpectedly. Callers MUST have already committed
/// any prior writes (e.g. the `LeadAnswer` insert) in the same transaction before calling this.
pub fn advance_step_if_at(conn: &mut PgConnection, lead_id: i32, expected_step: i32) -> Result<bool> {
    let won = Lead::advance_step_if_at(conn, lead_id, expected_step)?;
    if !won {
        system_events::info(conn, "advance_step.lost_race", Some(lead_id))?;
    }
    Ok(won)
}

/// Emitted immediately before a call to `advance_step_if_at` whenever there are uncommitted
/// writes in the surrounding session, per §4.6's explicit SystemEvent requirement.
pub fn flag_pending_changes(conn: &mut PgConnection, lead_id: i32) -> Result<()> {
    system_events::record(
        conn,
        "info",
        "advance_step.pending_changes",
        Some(lead_id),
        json!({}),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_only_advances_to_qualifying() {
        assert_eq!(allowed_transitions(Status::New), &[Status::Qualifying]);
        assert!(is_legal(Status::New, Status::Qualifying));
        assert!(!is_legal(Status::New, Status::Booked));
    }

    #[test]
    fn terminal_statuses_have_no_outbound_edges() {
        for status in [
            Status::Booked,
            Status::Rejected,
            Status::Waitlisted,
            Status::NeedsManualFollowUp,
        ] {
            assert!(allowed_transitions(status).is_empty(), "{status} should be terminal");
        }
    }

    #[test]
    fn optout_and_dormant_statuses_only_restart_to_new() {
        assert_eq!(allowed_transitions(Status::Optout), &[Status::New]);
        assert_eq!(allowed_transitions(Status::Abandoned), &[Status::New]);
        assert_eq!(allowed_transitions(Status::Stale), &[Status::New]);
    }

    #[test]
    fn booking_link_sent_only_advances_to_booking_pending() {
        assert_eq!(allowed_transitions(Status::BookingLinkSent), &[Status::BookingPending]);
        assert!(!is_legal(Status::BookingLinkSent, Status::Booked));
    }

    #[test]
    fn needs_follow_up_and_deposit_expired_are_recoverable() {
        assert!(is_legal(Status::NeedsFollowUp, Status::PendingApproval));
        assert!(is_legal(Status::NeedsFollowUp, Status::BookingPending));
        assert!(is_legal(Status::NeedsFollowUp, Status::Rejected));
        assert!(!is_legal(Status::NeedsFollowUp, Status::New));

        assert!(is_legal(Status::DepositExpired, Status::Rejected));
        assert!(is_legal(Status::DepositExpired, Status::Abandoned));
        assert!(!is_legal(Status::DepositExpired, Status::DepositPaid));
    }
}
