use crate::schema::system_events;
use diesel::prelude::*;
use serde_json::json;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = system_events)]
pub struct SystemEvent {
    pub id: i32,
    pub level: String,
    pub event_type: String,
    pub lead_id: Option<i32>,
    pub payload_json: Value,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = system_events)]
struct NewSystemEvent {
    level: String,
    event_type: String,
    lead_id: Option<i32>,
    payload_json: Value,
}

/// The one helper through which `SystemEvent` rows are created, per §3 ("created exclusively
/// through one helper to guarantee shape").
pub fn record(
    conn: &mut PgConnection,
    level: &str,
    event_type: &str,
    lead_id: Option<i32>,
    payload: Value,
) -> QueryResult<SystemEvent> {
    diesel::insert_into(system_events::table)
        .values(&NewSystemEvent {
            level: level.to_string(),
            event_type: event_type.to_string(),
            lead_id,
            payload_json: payload,
        })
        .get_result(conn)
}

pub fn info(conn: &mut PgConnection, event_type: &str, lead_id: Option<i32>) -> QueryResult<SystemEvent> {
    record(conn, "info", event_type, lead_id, json!({}))
}

pub fn warn(
    conn: &mut PgConnection,
    event_type: &str,
    lead_id: Option<i32>,
    payload: Value,
) -> QueryResult<SystemEvent> {
    record(conn, "warn", event_type, lead_id, payload)
}
