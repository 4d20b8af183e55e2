use crate::db::enums::EstimatedCategory;
use crate::db::enums::RegionBucket;
use crate::db::enums::Status;
use crate::schema::leads;
use anyhow::Result;
use diesel::prelude::*;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: i32,
    pub wa_from: String,
    pub artist_id: String,
    pub created_at: OffsetDateTime,

    pub status: Status,
    pub current_step: i32,
    pub parse_failure_counts: Value,

    pub estimated_category: Option<EstimatedCategory>,
    pub estimated_days: Option<f64>,
    pub estimated_deposit_amount_pence: Option<i64>,
    pub deposit_amount_pence: Option<i64>,
    pub deposit_amount_locked_at: Option<OffsetDateTime>,
    pub deposit_rule_version: Option<String>,

    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub region_bucket: Option<RegionBucket>,
    pub min_budget_amount_pence: Option<i64>,
    pub below_min_budget: bool,

    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub deposit_checkout_expires_at: Option<OffsetDateTime>,
    pub deposit_sent_at: Option<OffsetDateTime>,
    pub deposit_paid_at: Option<OffsetDateTime>,

    pub suggested_slots_json: Value,
    pub selected_slot_start_at: Option<OffsetDateTime>,
    pub selected_slot_end_at: Option<OffsetDateTime>,
    pub calendar_event_id: Option<String>,
    pub booking_pending_at: Option<OffsetDateTime>,
    pub booked_at: Option<OffsetDateTime>,
    pub booking_link: Option<String>,
    pub booking_tool: Option<String>,
    pub booking_link_sent_at: Option<OffsetDateTime>,

    pub qualifying_started_at: Option<OffsetDateTime>,
    pub pending_approval_at: Option<OffsetDateTime>,
    pub approved_at: Option<OffsetDateTime>,
    pub rejected_at: Option<OffsetDateTime>,
    pub stale_at: Option<OffsetDateTime>,
    pub abandoned_at: Option<OffsetDateTime>,
    pub needs_artist_reply_at: Option<OffsetDateTime>,
    pub needs_follow_up_at: Option<OffsetDateTime>,
    pub deposit_expired_at: Option<OffsetDateTime>,

    pub reminder_qualifying_1_sent_at: Option<OffsetDateTime>,
    pub reminder_qualifying_2_sent_at: Option<OffsetDateTime>,
    pub reminder_booking_24h_sent_at: Option<OffsetDateTime>,
    pub reminder_booking_72h_sent_at: Option<OffsetDateTime>,

    pub needs_artist_reply_notified_at: Option<OffsetDateTime>,
    pub needs_follow_up_notified_at: Option<OffsetDateTime>,
    pub handover_last_hold_reply_at: Option<OffsetDateTime>,
    pub handover_reason: Option<String>,

    pub last_client_message_at: Option<OffsetDateTime>,
    pub last_bot_message_at: Option<OffsetDateTime>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub wa_from: String,
    pub artist_id: String,
}

impl NewLead {
    pub fn new(wa_from: impl Into<String>, artist_id: impl Into<String>) -> Self {
        Self {
            wa_from: wa_from.into(),
            artist_id: artist_id.into(),
        }
    }
}

impl Lead {
    pub fn find(conn: &mut PgConnection, lead_id: i32) -> QueryResult<Option<Lead>> {
        leads::table.find(lead_id).first(conn).optional()
    }

    /// Locks the row for the duration of the surrounding transaction. Callers MUST wrap this in
    /// `conn.transaction(...)`.
    pub fn find_for_update(conn: &mut PgConnection, lead_id: i32) -> QueryResult<Option<Lead>> {
        leads::table
            .find(lead_id)
            .for_update()
            .first(conn)
            .optional()
    }

    pub fn find_by_wa_from(conn: &mut PgConnection, wa_from: &str) -> QueryResult<Option<Lead>> {
        leads::table
            .filter(leads::wa_from.eq(wa_from))
            .order(leads::id.desc())
            .first(conn)
            .optional()
    }

    pub fn find_by_checkout_session(
        conn: &mut PgConnection,
        checkout_session_id: &str,
    ) -> QueryResult<Option<Lead>> {
        leads::table
            .filter(leads::checkout_session_id.eq(checkout_session_id))
            .first(conn)
            .optional()
    }

    pub fn insert(conn: &mut PgConnection, new_lead: NewLead) -> QueryResult<Lead> {
        diesel::insert_into(leads::table)
            .values(&new_lead)
            .get_result(conn)
    }

    /// Atomic conditional UPDATE: `WHERE status = expected`. Returns `Ok(Some(lead))` when the
    /// caller's update won the race, `Ok(None)` when another writer had already moved the row.
    pub fn update_status_if_matches(
        conn: &mut PgConnection,
        lead_id: i32,
        expected: Status,
        new_status: Status,
        touch: impl FnOnce(StatusUpdate) -> StatusUpdate,
    ) -> Result<Option<Lead>> {
        let update = touch(StatusUpdate::default()).with_status(new_status);
        let rows: Vec<Lead> = diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .filter(leads::status.eq(expected))
            .set(update.into_changeset())
            .get_results(conn)?;
        Ok(rows.into_iter().next())
    }

    /// Atomic conditional UPDATE on `current_step`; the "winner-sends" rule in §5 relies on this
    /// returning whether this caller's write affected the row.
    pub fn advance_step_if_at(
        conn: &mut PgConnection,
        lead_id: i32,
        expected_step: i32,
    ) -> QueryResult<bool> {
        let affected = diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .filter(leads::current_step.eq(expected_step))
            .set(leads::current_step.eq(expected_step + 1))
            .execute(conn)?;
        Ok(affected == 1)
    }

    pub fn set_parse_failure_counts(
        conn: &mut PgConnection,
        lead_id: i32,
        counts: Value,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set(leads::parse_failure_counts.eq(counts))
            .execute(conn)?;
        Ok(())
    }

    pub fn touch_last_client_message_at(
        conn: &mut PgConnection,
        lead_id: i32,
        at: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set(leads::last_client_message_at.eq(at))
            .execute(conn)?;
        Ok(())
    }

    pub fn touch_last_bot_message_at(
        conn: &mut PgConnection,
        lead_id: i32,
        at: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set(leads::last_bot_message_at.eq(at))
            .execute(conn)?;
        Ok(())
    }

    /// Sets `deposit_amount_pence` / `deposit_amount_locked_at` only on first write, honouring
    /// invariant 2 (the deposit lock is never reduced or cleared).
    pub fn lock_deposit_amount(
        conn: &mut PgConnection,
        lead_id: i32,
        amount_pence: i64,
        rule_version: &str,
        now: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .filter(leads::deposit_amount_locked_at.is_null())
            .set((
                leads::deposit_amount_pence.eq(amount_pence),
                leads::deposit_amount_locked_at.eq(now),
                leads::deposit_rule_version.eq(rule_version),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_estimation(
        conn: &mut PgConnection,
        lead_id: i32,
        category: EstimatedCategory,
        estimated_days: Option<f64>,
        estimated_deposit_amount_pence: i64,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set((
                leads::estimated_category.eq(category),
                leads::estimated_days.eq(estimated_days),
                leads::estimated_deposit_amount_pence.eq(estimated_deposit_amount_pence),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_region(
        conn: &mut PgConnection,
        lead_id: i32,
        region_bucket: RegionBucket,
        min_budget_amount_pence: i64,
        below_min_budget: bool,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set((
                leads::region_bucket.eq(region_bucket),
                leads::min_budget_amount_pence.eq(min_budget_amount_pence),
                leads::below_min_budget.eq(below_min_budget),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_checkout_session(
        conn: &mut PgConnection,
        lead_id: i32,
        checkout_session_id: &str,
        expires_at: OffsetDateTime,
        sent_at: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set((
                leads::checkout_session_id.eq(checkout_session_id),
                leads::deposit_checkout_expires_at.eq(expires_at),
                leads::deposit_sent_at.eq(sent_at),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Sets the booking link/tool ahead of the `DepositPaid -> BookingLinkSent` transition; the
    /// transition itself stamps `booking_link_sent_at` via `stamp_first_entry`.
    pub fn set_booking_link(
        conn: &mut PgConnection,
        lead_id: i32,
        booking_link: &str,
        booking_tool: &str,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set((
                leads::booking_link.eq(booking_link),
                leads::booking_tool.eq(booking_tool),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_suggested_slots(
        conn: &mut PgConnection,
        lead_id: i32,
        slots_json: Value,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set(leads::suggested_slots_json.eq(slots_json))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_selected_slot(
        conn: &mut PgConnection,
        lead_id: i32,
        start_at: OffsetDateTime,
        end_at: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set((
                leads::selected_slot_start_at.eq(start_at),
                leads::selected_slot_end_at.eq(end_at),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_handover_hold_reply(
        conn: &mut PgConnection,
        lead_id: i32,
        at: OffsetDateTime,
    ) -> QueryResult<()> {
        diesel::update(leads::table)
            .filter(leads::id.eq(lead_id))
            .set(leads::handover_last_hold_reply_at.eq(at))
            .execute(conn)?;
        Ok(())
    }

    /// `QUALIFYING`, silent for `≥ threshold_hours` since last client message, reminder-1 unsent.
    pub fn due_qualifying_reminder_1(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::Qualifying))
            .filter(leads::last_client_message_at.le(threshold))
            .filter(leads::reminder_qualifying_1_sent_at.is_null())
            .load(conn)
    }

    pub fn due_qualifying_reminder_2(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::Qualifying))
            .filter(leads::last_client_message_at.le(threshold))
            .filter(leads::reminder_qualifying_2_sent_at.is_null())
            .load(conn)
    }

    pub fn due_qualifying_abandon(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::Qualifying))
            .filter(leads::last_client_message_at.le(threshold))
            .load(conn)
    }

    pub fn due_pending_approval_stale(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::PendingApproval))
            .filter(leads::pending_approval_at.le(threshold))
            .load(conn)
    }

    pub fn due_deposit_expiry(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::AwaitingDeposit))
            .filter(leads::deposit_sent_at.le(threshold))
            .load(conn)
    }

    pub fn due_booking_follow_up(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(leads::status.eq(Status::BookingPending))
            .filter(leads::booking_pending_at.le(threshold))
            .load(conn)
    }

    pub fn due_booking_reminder_24h(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(
                leads::status
                    .eq(Status::DepositPaid)
                    .or(leads::status.eq(Status::BookingLinkSent)),
            )
            .filter(leads::deposit_sent_at.le(threshold))
            .filter(leads::reminder_booking_24h_sent_at.is_null())
            .load(conn)
    }

    pub fn due_booking_reminder_72h(conn: &mut PgConnection, threshold: OffsetDateTime) -> QueryResult<Vec<Lead>> {
        leads::table
            .filter(
                leads::status
                    .eq(Status::DepositPaid)
                    .or(leads::status.eq(Status::BookingLinkSent)),
            )
            .filter(leads::deposit_sent_at.le(threshold))
            .filter(leads::reminder_booking_72h_sent_at.is_null())
            .load(conn)
    }

    pub fn mark_reminder_sent(
        conn: &mut PgConnection,
        lead_id: i32,
        which: ReminderKind,
        at: OffsetDateTime,
    ) -> QueryResult<()> {
        match which {
            ReminderKind::Qualifying1 => {
                diesel::update(leads::table)
                    .filter(leads::id.eq(lead_id))
                    .set(leads::reminder_qualifying_1_sent_at.eq(at))
                    .execute(conn)?;
            }
            ReminderKind::Qualifying2 => {
                diesel::update(leads::table)
                    .filter(leads::id.eq(lead_id))
                    .set(leads::reminder_qualifying_2_sent_at.eq(at))
                    .execute(conn)?;
            }
            ReminderKind::Booking24h => {
                diesel::update(leads::table)
                    .filter(leads::id.eq(lead_id))
                    .set(leads::reminder_booking_24h_sent_at.eq(at))
                    .execute(conn)?;
            }
            ReminderKind::Booking72h => {
                diesel::update(leads::table)
                    .filter(leads::id.eq(lead_id))
                    .set(leads::reminder_booking_72h_sent_at.eq(at))
                    .execute(conn)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReminderKind {
    Qualifying1,
    Qualifying2,
    Booking24h,
    Booking72h,
}

/// Builder for the extra column writes that accompany a status transition. Only the columns
/// actually touched are included in the generated `UPDATE`.
#[derive(Default)]
pub struct StatusUpdate {
    status: Option<Status>,
    current_step: Option<i32>,
    handover_reason: Option<String>,
    payment_intent_id: Option<String>,
    deposit_paid_at: Option<OffsetDateTime>,
    booking_pending_at: Option<OffsetDateTime>,
    booked_at: Option<OffsetDateTime>,
    approved_at: Option<OffsetDateTime>,
    rejected_at: Option<OffsetDateTime>,
}

impl StatusUpdate {
    fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current_step(mut self, step: i32) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn handover_reason(mut self, reason: impl Into<String>) -> Self {
        self.handover_reason = Some(reason.into());
        self
    }

    pub fn payment_intent_id(mut self, id: impl Into<String>) -> Self {
        self.payment_intent_id = Some(id.into());
        self
    }

    pub fn deposit_paid_at(mut self, at: OffsetDateTime) -> Self {
        self.deposit_paid_at = Some(at);
        self
    }

    pub fn booking_pending_at(mut self, at: OffsetDateTime) -> Self {
        self.booking_pending_at = Some(at);
        self
    }

    pub fn booked_at(mut self, at: OffsetDateTime) -> Self {
        self.booked_at = Some(at);
        self
    }

    pub fn approved_at(mut self, at: OffsetDateTime) -> Self {
        self.approved_at = Some(at);
        self
    }

    pub fn rejected_at(mut self, at: OffsetDateTime) -> Self {
        self.rejected_at = Some(at);
        self
    }

    fn into_changeset(self) -> LeadStatusChangeset {
        LeadStatusChangeset {
            status: self.status,
            current_step: self.current_step,
            handover_reason: self.handover_reason,
            payment_intent_id: self.payment_intent_id,
            deposit_paid_at: self.deposit_paid_at,
            booking_pending_at: self.booking_pending_at,
            booked_at: self.booked_at,
            approved_at: self.approved_at,
            rejected_at: self.rejected_at,
        }
    }
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = leads)]
struct LeadStatusChangeset {
    status: Option<Status>,
    current_step: Option<i32>,
    handover_reason: Option<String>,
    payment_intent_id: Option<String>,
    deposit_paid_at: Option<OffsetDateTime>,
    booking_pending_at: Option<OffsetDateTime>,
    booked_at: Option<OffsetDateTime>,
    approved_at: Option<OffsetDateTime>,
    rejected_at: Option<OffsetDateTime>,
}
