use crate::db::processed_events::NewProcessedEvent;
use crate::db::processed_events::ProcessedEvent;
use crate::db::processed_events::RecordOutcome;
use diesel::PgConnection;
use diesel::QueryResult;

/// `check_and_record(provider, external_id, event_type, lead_id?) -> (is_duplicate, record)`.
///
/// Per §4.2 this performs an atomic insert and classifies unique-key conflicts as duplicates
/// rather than errors.
pub fn check_and_record(
    conn: &mut PgConnection,
    provider: &str,
    external_id: &str,
    event_type: &str,
    lead_id: Option<i32>,
) -> QueryResult<(bool, ProcessedEvent)> {
    let outcome = ProcessedEvent::try_record(
        conn,
        NewProcessedEvent {
            provider: provider.to_string(),
            external_id: external_id.to_string(),
            event_type: event_type.to_string(),
            lead_id,
        },
    )?;
    let is_duplicate = outcome.is_duplicate();
    Ok((is_duplicate, outcome.record().clone()))
}

/// Read-only pre-check used when the caller wants duplicate status without the insert
/// side-effect (e.g. the payment correlator's step 4 in §4.8).
pub fn check_only(
    conn: &mut PgConnection,
    provider: &str,
    external_id: &str,
) -> QueryResult<bool> {
    Ok(ProcessedEvent::find(conn, provider, external_id)?.is_some())
}
