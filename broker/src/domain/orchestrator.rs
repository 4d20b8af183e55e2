//! Conversation Orchestrator (C7): drives the per-lead interview.

use crate::db::enums::Status;
use crate::db::lead_answers::LeadAnswer;
use crate::db::lead_answers::NewLeadAnswer;
use crate::db::leads::Lead;
use crate::db::system_events;
use crate::domain::estimation;
use crate::domain::estimation::EstimationInput;
use crate::domain::outbox;
use crate::domain::outbox::OutboundPayload;
use crate::domain::parse;
use crate::domain::parse::RepairVariant;
use crate::domain::questions;
use crate::domain::region;
use crate::domain::status as status_machine;
use crate::domain::window;
use crate::domain::window::WindowDecision;
use crate::ports::CopyRenderer;
use crate::ports::Notifier;
use crate::ports::SlotProvider;
use anyhow::Result;
use diesel::PgConnection;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;

const RESTART_KEYWORDS: &[&str] = &["start", "resume", "continue", "yes"];
const OPTOUT_KEYWORDS: &[&str] = &["stop", "unsubscribe", "optout", "opt out"];
const HUMAN_KEYWORDS: &[&str] = &["human", "agent", "speak to someone", "real person"];
const REFUND_KEYWORDS: &[&str] = &["refund"];
const DELETE_DATA_KEYWORDS: &[&str] = &["delete my data", "delete data", "gdpr"];
const HOLD_REPLY_CADENCE: Duration = Duration::hours(6);

/// What the orchestrator actually did with an inbound message, surfaced to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorOutcome {
    /// An outbound message (or none, if blocked) was composed and enqueued.
    Handled { lead_id: i32, outbound_sent: bool },
    /// Another worker's `advance_step_if_at` won; this worker exits cleanly with no outbound.
    StepAlreadyAdvanced { lead_id: i32 },
    /// The inbound timestamp was older than `last_client_message_at`; dropped per §5 ordering.
    OutOfOrder { lead_id: i32 },
    /// The lead is opted out and only restart keywords are honoured.
    Acknowledged { lead_id: i32 },
}

pub struct Capabilities<'a> {
    pub renderer: &'a dyn CopyRenderer,
    pub slot_provider: &'a dyn SlotProvider,
    pub notifier: &'a dyn Notifier,
    /// §6 `feature_calendar_enabled`: when off, booking-pending leads are treated as having no
    /// candidate slots regardless of what the slot provider would otherwise return.
    pub feature_calendar_enabled: bool,
    /// §6 `outbox_enabled`: when off, `send_text` bypasses the durable queue and attempts
    /// delivery inline via `notifier` instead.
    pub outbox_enabled: bool,
}

fn contains_any(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lowered.contains(kw))
}

fn send(
    conn: &mut PgConnection,
    lead: &Lead,
    message_key: &str,
    template_name: Option<&str>,
    now: OffsetDateTime,
    caps: &Capabilities,
    intent: &str,
) -> Result<bool> {
    let params = json!({});
    let text = caps.renderer.render(message_key, lead.id, &params);
    send_text(conn, lead, &text, template_name, now, caps, intent)
}

/// Core of `send`, taking already-rendered text directly so callers that need to combine more
/// than one rendered message into a single outbound (§4.7 step 10's confirmation+next-question
/// combo) can do so without a second outbox entry.
fn send_text(
    conn: &mut PgConnection,
    lead: &Lead,
    text: &str,
    template_name: Option<&str>,
    now: OffsetDateTime,
    caps: &Capabilities,
    intent: &str,
) -> Result<bool> {
    if lead.status == Status::Optout {
        return Ok(false);
    }

    let params = json!({});
    let text = text.to_string();

    let decision = window::decide_and_record(
        conn,
        lead.id,
        lead.status,
        lead.last_client_message_at,
        now,
        template_name,
        intent,
    )?;

    let payload = match &decision {
        WindowDecision::Open => OutboundPayload {
            to: lead.wa_from.clone(),
            free_form: Some(text),
            template_name: None,
            template_params: None,
        },
        WindowDecision::ClosedTemplateUsed { template_name } => OutboundPayload {
            to: lead.wa_from.clone(),
            free_form: None,
            template_name: Some(template_name.clone()),
            template_params: Some(params),
        },
        WindowDecision::BlockedNoTemplate | WindowDecision::OptedOut => return Ok(false),
    };

    if caps.outbox_enabled {
        outbox::enqueue(conn, Some(lead.id), "whatsapp", &payload)?;
    } else {
        outbox::send_direct(caps.notifier, &payload)?;
    }
    Lead::touch_last_bot_message_at(conn, lead.id, now)?;
    Ok(true)
}

/// `handle_inbound(lead, text, has_media=false)`.
pub fn handle_inbound(
    conn: &mut PgConnection,
    lead: &Lead,
    text: &str,
    has_media: bool,
    inbound_timestamp: Option<OffsetDateTime>,
    caps: &Capabilities,
) -> Result<OrchestratorOutcome> {
    let now = OffsetDateTime::now_utc();

    if let (Some(last), Some(inbound_ts)) = (lead.last_client_message_at, inbound_timestamp) {
        if inbound_ts < last {
            return Ok(OrchestratorOutcome::OutOfOrder { lead_id: lead.id });
        }
    }

    let normalized = parse::normalize(text);
    let lowered = normalized.to_lowercase();

    match lead.status {
        Status::Optout => {
            if contains_any(&lowered, RESTART_KEYWORDS) {
                let reopened = status_machine::transition(conn, lead.id, Status::Optout, Status::New, None)?;
                return handle_inbound(conn, &reopened, text, has_media, inbound_timestamp, caps);
            }
            Ok(OrchestratorOutcome::Acknowledged { lead_id: lead.id })
        }
        Status::Abandoned | Status::Stale => {
            Lead::touch_last_client_message_at(conn, lead.id, now)?;
            let from = lead.status;
            let reopened = status_machine::transition(conn, lead.id, from, Status::New, None)?;
            handle_inbound(conn, &reopened, text, has_media, inbound_timestamp, caps)
        }
        Status::New => {
            Lead::touch_last_client_message_at(conn, lead.id, now)?;
            let reopened = status_machine::transition(conn, lead.id, Status::New, Status::Qualifying, None)?;
            send(conn, &reopened, "welcome", Some("welcome"), now, caps, "welcome")?;
            let q0 = questions::at_step(0).expect("question 0 to exist");
            let sent = send(conn, &reopened, q0.prompt, Some(q0.prompt), now, caps, "question")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: sent })
        }
        Status::Qualifying => run_qualifying(conn, lead, &normalized, &lowered, has_media, now, caps),
        Status::PendingApproval => {
            send(conn, lead, "status.pending_approval", None, now, caps, "status_update")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
        Status::AwaitingDeposit => {
            send(conn, lead, "status.awaiting_deposit", None, now, caps, "status_update")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
        Status::DepositPaid => {
            send(conn, lead, "status.deposit_paid", None, now, caps, "status_update")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
        Status::BookingPending => run_booking_pending(conn, lead, &normalized, caps, now),
        Status::CollectingTimeWindows => run_collecting_time_windows(conn, lead, &normalized, now),
        Status::TourConversionOffered => run_tour_conversion(conn, lead, &lowered, now, caps),
        Status::NeedsArtistReply => run_needs_artist_reply(conn, lead, &lowered, now, caps),
        Status::Booked
        | Status::Rejected
        | Status::NeedsFollowUp
        | Status::NeedsManualFollowUp
        | Status::Waitlisted
        | Status::DepositExpired
        | Status::BookingLinkSent => {
            // These are terminal (or legacy-compat) from the client's point of view: no
            // transition is attempted, a static acknowledgement is all that is owed.
            send(conn, lead, "status.static_ack", None, now, caps, "static_ack")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
    }
}

fn run_needs_artist_reply(
    conn: &mut PgConnection,
    lead: &Lead,
    lowered: &str,
    now: OffsetDateTime,
    caps: &Capabilities,
) -> Result<OrchestratorOutcome> {
    if contains_any(lowered, OPTOUT_KEYWORDS) {
        status_machine::transition(conn, lead.id, Status::NeedsArtistReply, Status::Optout, None)?;
        return Ok(OrchestratorOutcome::Acknowledged { lead_id: lead.id });
    }
    if lowered == "continue" {
        let resumed = status_machine::transition(
            conn,
            lead.id,
            Status::NeedsArtistReply,
            Status::Qualifying,
            None,
        )?;
        send(conn, &resumed, "question.resume", None, now, caps, "resume")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    let can_send = lead
        .handover_last_hold_reply_at
        .map(|last| (now - last) >= HOLD_REPLY_CADENCE)
        .unwrap_or(true);
    if can_send {
        send(conn, lead, "handover.holding_reply", None, now, caps, "holding_reply")?;
        Lead::set_handover_hold_reply(conn, lead.id, now)?;
    }
    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: can_send })
}

fn run_tour_conversion(
    conn: &mut PgConnection,
    lead: &Lead,
    lowered: &str,
    now: OffsetDateTime,
    caps: &Capabilities,
) -> Result<OrchestratorOutcome> {
    if ["yes", "accept", "ok"].iter().any(|kw| lowered.contains(kw)) {
        let updated = status_machine::transition(
            conn,
            lead.id,
            Status::TourConversionOffered,
            Status::PendingApproval,
            None,
        )?;
        send(conn, &updated, "tour.accepted", None, now, caps, "tour_accepted")?;
    } else if ["no", "decline"].iter().any(|kw| lowered.contains(kw)) {
        status_machine::transition(
            conn,
            lead.id,
            Status::TourConversionOffered,
            Status::Waitlisted,
            None,
        )?;
    } else {
        send(conn, lead, "tour.ask_again", None, now, caps, "tour_ask_again")?;
    }
    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
}

fn run_collecting_time_windows(
    conn: &mut PgConnection,
    lead: &Lead,
    text: &str,
    now: OffsetDateTime,
) -> Result<OrchestratorOutcome> {
    LeadAnswer::insert(
        conn,
        NewLeadAnswer {
            lead_id: lead.id,
            question_key: "preferred_time_windows".to_string(),
            answer_text: text.to_string(),
        },
    )?;
    let count = LeadAnswer::count_for_question(conn, lead.id, "preferred_time_windows")?;
    if count >= 2 {
        status_machine::transition(
            conn,
            lead.id,
            Status::CollectingTimeWindows,
            Status::NeedsArtistReply,
            Some("Collected preferred time windows"),
        )?;
    }
    let _ = now;
    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: false })
}

fn run_booking_pending(
    conn: &mut PgConnection,
    lead: &Lead,
    text: &str,
    caps: &Capabilities,
    now: OffsetDateTime,
) -> Result<OrchestratorOutcome> {
    let slots = if caps.feature_calendar_enabled {
        caps.slot_provider.suggested_slots(lead.id)
    } else {
        Vec::new()
    };
    if slots.is_empty() {
        send(conn, lead, "booking.no_slots", None, now, caps, "booking_no_slots")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    match parse::parse_slot_selection(text, slots.len()) {
        Some(choice) => {
            let slot = &slots[choice - 1];
            Lead::set_selected_slot(conn, lead.id, slot.start, slot.end)?;
            send(conn, lead, "booking.confirmed", None, now, caps, "booking_confirmed")?;
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
        None => {
            let counts = lead.parse_failure_counts.clone();
            let failures = parse::failure_count(&counts, "slot") + 1;
            let new_counts = parse::record_failure(&counts, "slot");
            Lead::set_parse_failure_counts(conn, lead.id, new_counts)?;

            if failures >= parse::MAX_PARSE_FAILURES {
                status_machine::transition(
                    conn,
                    lead.id,
                    Status::BookingPending,
                    Status::NeedsArtistReply,
                    Some("Unable to parse slot after 3 attempts"),
                )?;
            } else {
                let key = match parse::repair_variant(failures) {
                    RepairVariant::Gentle => "repair.slot.gentle",
                    RepairVariant::ShortWithExample => "repair.slot.short",
                    RepairVariant::Handover => unreachable!(),
                };
                send(conn, lead, key, None, now, caps, "repair")?;
            }
            Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
        }
    }
}

fn run_qualifying(
    conn: &mut PgConnection,
    lead: &Lead,
    normalized: &str,
    lowered: &str,
    has_media: bool,
    now: OffsetDateTime,
    caps: &Capabilities,
) -> Result<OrchestratorOutcome> {
    let question = match questions::at_step(lead.current_step) {
        Some(q) => q,
        None => {
            // current_step points past the known sequence; recover defensively.
            system_events::warn(conn, "qualifying.unknown_step", Some(lead.id), json!({ "step": lead.current_step }))?;
            return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: false });
        }
    };

    let window_open = lead
        .last_client_message_at
        .map(|last| (now - last) < Duration::hours(24))
        .unwrap_or(true);
    if !window_open {
        send(conn, lead, question.prompt, Some(question.prompt), now, caps, "question")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    if has_media && question.key != "reference_images" && normalized.is_empty() {
        send(conn, lead, "qualifying.need_text_for_step", None, now, caps, "need_text")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    if contains_any(lowered, OPTOUT_KEYWORDS) {
        status_machine::transition(conn, lead.id, Status::Qualifying, Status::Optout, None)?;
        return Ok(OrchestratorOutcome::Acknowledged { lead_id: lead.id });
    }
    if contains_any(lowered, HUMAN_KEYWORDS) {
        return handover(conn, lead, now, caps, "Client asked for a human");
    }
    if contains_any(lowered, REFUND_KEYWORDS) {
        return handover(conn, lead, now, caps, "Client asked about a refund");
    }
    if contains_any(lowered, DELETE_DATA_KEYWORDS) {
        return handover(conn, lead, now, caps, "Client requested data deletion");
    }

    if parse::wrong_field_guard_triggered(normalized, question.key) {
        send(conn, lead, "qualifying.wrong_field", None, now, caps, "wrong_field")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }
    if parse::bundle_guard_triggered(normalized, question.key) {
        send(conn, lead, "qualifying.one_at_a_time", None, now, caps, "bundle_guard")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    if dynamic_handover_trigger(lowered) {
        return handover(conn, lead, now, caps, "Dynamic handover trigger matched");
    }

    let parse_ok = match question.key {
        "dimensions" => parse::parse_dimensions(normalized).is_some(),
        "budget" => parse::parse_budget_pence(normalized).is_some(),
        "location_city" => parse::parse_location(normalized).is_some(),
        _ => true,
    };

    if !parse_ok {
        let counts = lead.parse_failure_counts.clone();
        let failures = parse::failure_count(&counts, question.key) + 1;
        let new_counts = parse::record_failure(&counts, question.key);
        Lead::set_parse_failure_counts(conn, lead.id, new_counts)?;

        if failures >= parse::MAX_PARSE_FAILURES {
            return handover(
                conn,
                lead,
                now,
                caps,
                &format!("Unable to parse {} after 3 attempts", question.key),
            );
        }
        let key = match parse::repair_variant(failures) {
            RepairVariant::Gentle => "repair.gentle",
            RepairVariant::ShortWithExample => "repair.short_with_example",
            RepairVariant::Handover => unreachable!(),
        };
        send(conn, lead, key, None, now, caps, "repair")?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true });
    }

    LeadAnswer::insert(
        conn,
        NewLeadAnswer {
            lead_id: lead.id,
            question_key: question.key.to_string(),
            answer_text: normalized.to_string(),
        },
    )?;
    Lead::set_parse_failure_counts(conn, lead.id, parse::reset_failure(&lead.parse_failure_counts, question.key))?;
    Lead::touch_last_client_message_at(conn, lead.id, now)?;

    if questions::is_last_step(lead.current_step) {
        return complete_qualification(conn, lead, now, caps);
    }

    status_machine::flag_pending_changes(conn, lead.id)?;
    let won = status_machine::advance_step_if_at(conn, lead.id, lead.current_step)?;
    if !won {
        return Ok(OrchestratorOutcome::StepAlreadyAdvanced { lead_id: lead.id });
    }

    let answers = LeadAnswer::for_lead(conn, lead.id)?;
    let latest = LeadAnswer::latest_by_key(&answers);
    let confirmation_trigger = latest.contains_key("dimensions")
        && latest.contains_key("budget")
        && latest.contains_key("location_city");

    let next_question = questions::at_step(lead.current_step + 1).expect("next question to exist");
    let next_text = caps.renderer.render(next_question.prompt, lead.id, &json!({}));
    if confirmation_trigger {
        let confirmation_text = caps.renderer.render("qualifying.confirmation_summary", lead.id, &json!({}));
        let combined = format!("{confirmation_text}\n\n{next_text}");
        send_text(conn, lead, &combined, Some(next_question.prompt), now, caps, "confirmation")?;
    } else {
        send_text(conn, lead, &next_text, Some(next_question.prompt), now, caps, "question")?;
    }

    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
}

fn dynamic_handover_trigger(lowered: &str) -> bool {
    const HESITATION: &[&str] = &["not sure", "i don't know", "maybe"];
    const PRICE_NEGOTIATION: &[&str] = &["can you do it cheaper", "discount", "lower price"];
    const AVAILABILITY_PROBING: &[&str] = &["when are you free", "what's your availability"];
    contains_any(lowered, HESITATION)
        || contains_any(lowered, PRICE_NEGOTIATION)
        || contains_any(lowered, AVAILABILITY_PROBING)
}

fn handover(
    conn: &mut PgConnection,
    lead: &Lead,
    now: OffsetDateTime,
    caps: &Capabilities,
    reason: &str,
) -> Result<OrchestratorOutcome> {
    status_machine::transition(conn, lead.id, Status::Qualifying, Status::NeedsArtistReply, Some(reason))?;
    send(conn, lead, "handover.notice", None, now, caps, "handover")?;
    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
}

/// `complete_qualification`, per §4.7.
fn complete_qualification(
    conn: &mut PgConnection,
    lead: &Lead,
    now: OffsetDateTime,
    caps: &Capabilities,
) -> Result<OrchestratorOutcome> {
    let answers = LeadAnswer::for_lead(conn, lead.id)?;
    let latest = LeadAnswer::latest_by_key(&answers);

    if latest.get("coverup").map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false) {
        status_machine::transition(conn, lead.id, Status::Qualifying, Status::NeedsArtistReply, Some("coverup=yes"))?;
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: false });
    }

    let dims = latest
        .get("dimensions")
        .and_then(|s| parse::parse_dimensions(s))
        .unwrap_or(parse::DimensionsCm { width_cm: 10.0, height_cm: 10.0 });
    let complexity_level: u8 = latest
        .get("complexity")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    let coverup = latest.get("coverup").map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false);
    let placement = latest.get("placement").cloned();

    let estimation_input = EstimationInput {
        width_cm: dims.width_cm,
        height_cm: dims.height_cm,
        coverup,
        complexity_level,
        placement,
    };
    let category = estimation::estimate_category(&estimation_input);
    let estimated_days = estimation::estimate_days(&estimation_input, category);
    let deposit_pence = estimation::estimate_deposit_pence(category, estimated_days);
    Lead::set_estimation(conn, lead.id, category, estimated_days, deposit_pence)?;

    let country = latest
        .get("location_city")
        .and_then(|s| parse::parse_location(s))
        .map(|loc| loc.country)
        .unwrap_or_else(|| "United Kingdom".to_string());
    let region_bucket = region::region_for_country(&country);
    let min_budget = region::min_budget_pence(region_bucket);

    let budget_pence = latest
        .get("budget")
        .and_then(|s| parse::parse_budget_pence(s))
        .unwrap_or(0);
    let below_min = budget_pence < min_budget;
    Lead::set_region(conn, lead.id, region_bucket, min_budget, below_min)?;

    if below_min {
        status_machine::transition(
            conn,
            lead.id,
            Status::Qualifying,
            Status::NeedsFollowUp,
            Some("below_min_budget"),
        )?;
        caps.renderer.render("operator.below_min_budget", lead.id, &json!({}));
        return Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: false });
    }

    // Tour-city matching beyond a caller-supplied slot list is out of scope (§1 Non-goals); the
    // core always proceeds to PENDING_APPROVAL here and leaves TOUR_CONVERSION_OFFERED /
    // WAITLISTED routing to the operator surface.
    status_machine::transition(conn, lead.id, Status::Qualifying, Status::PendingApproval, None)?;
    send(conn, lead, "qualifying.complete", None, now, caps, "complete")?;

    Ok(OrchestratorOutcome::Handled { lead_id: lead.id, outbound_sent: true })
}

