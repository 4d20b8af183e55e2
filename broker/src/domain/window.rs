use crate::db::enums::Status;
use crate::db::system_events;
use anyhow::Result;
use diesel::PgConnection;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;

const WINDOW: Duration = Duration::hours(24);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowDecision {
    /// Free-form send permitted.
    Open,
    /// Window closed but a registered template was supplied.
    ClosedTemplateUsed { template_name: String },
    /// Window closed and no template was supplied; nothing is sent.
    BlockedNoTemplate,
    /// The lead has opted out; nothing is sent regardless of window state.
    OptedOut,
}

/// The Window Arbiter (C4): given `last_client_message_at`, decides free-form vs. template vs.
/// blocked. This is the single choke point the rest of the system routes outbound decisions
/// through (§9 "free-form text vs. templates").
pub fn decide(
    status: Status,
    last_client_message_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    template_name: Option<&str>,
) -> WindowDecision {
    if status == Status::Optout {
        return WindowDecision::OptedOut;
    }

    let is_open = match last_client_message_at {
        None => true,
        Some(last) => (now - last) < WINDOW,
    };

    if is_open {
        return WindowDecision::Open;
    }

    match template_name {
        Some(name) => WindowDecision::ClosedTemplateUsed {
            template_name: name.to_string(),
        },
        None => WindowDecision::BlockedNoTemplate,
    }
}

/// Records the SystemEvent side-effects the arbiter owes per §4.4 and returns the decision
/// unchanged, so callers can `let decision = window::decide_and_record(...)?;`.
pub fn decide_and_record(
    conn: &mut PgConnection,
    lead_id: i32,
    status: Status,
    last_client_message_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    template_name: Option<&str>,
    intent: &str,
) -> Result<WindowDecision> {
    let decision = decide(status, last_client_message_at, now, template_name);
    match &decision {
        WindowDecision::ClosedTemplateUsed { template_name } => {
            system_events::record(
                conn,
                "info",
                "template.used",
                Some(lead_id),
                json!({ "template_name": template_name, "intent": intent }),
            )?;
        }
        WindowDecision::BlockedNoTemplate => {
            system_events::warn(
                conn,
                &format!("template_not_configured.{intent}"),
                Some(lead_id),
                json!({}),
            )?;
        }
        WindowDecision::OptedOut | WindowDecision::Open => {}
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optout_always_blocks_regardless_of_window() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(decide(Status::Optout, None, now, Some("anything")), WindowDecision::OptedOut);
        assert_eq!(decide(Status::Optout, Some(now), now, None), WindowDecision::OptedOut);
    }

    #[test]
    fn no_prior_message_is_open() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(decide(Status::Qualifying, None, now, None), WindowDecision::Open);
    }

    #[test]
    fn within_24h_is_open() {
        let now = OffsetDateTime::now_utc();
        let last = now - Duration::hours(23);
        assert_eq!(decide(Status::Qualifying, Some(last), now, None), WindowDecision::Open);
    }

    #[test]
    fn past_24h_without_template_is_blocked() {
        let now = OffsetDateTime::now_utc();
        let last = now - Duration::hours(25);
        assert_eq!(decide(Status::Qualifying, Some(last), now, None), WindowDecision::BlockedNoTemplate);
    }

    #[test]
    fn past_24h_with_template_uses_it() {
        let now = OffsetDateTime::now_utc();
        let last = now - Duration::hours(25);
        assert_eq!(
            decide(Status::Qualifying, Some(last), now, Some("reminder")),
            WindowDecision::ClosedTemplateUsed { template_name: "reminder".to_string() }
        );
    }
}
