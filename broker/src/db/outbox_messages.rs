use crate::db::enums::OutboxStatus;
use crate::schema::outbox_messages;
use diesel::prelude::*;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = outbox_messages)]
pub struct OutboxMessage {
    pub id: i32,
    pub lead_id: Option<i32>,
    pub channel: String,
    pub payload: Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = outbox_messages)]
pub struct NewOutboxMessage {
    pub lead_id: Option<i32>,
    pub channel: String,
    pub payload: Value,
}

impl OutboxMessage {
    pub fn enqueue(
        conn: &mut PgConnection,
        new_message: NewOutboxMessage,
    ) -> QueryResult<OutboxMessage> {
        diesel::insert_into(outbox_messages::table)
            .values(&new_message)
            .get_result(conn)
    }

    pub fn mark_sent(conn: &mut PgConnection, id: i32) -> QueryResult<()> {
        diesel::update(outbox_messages::table)
            .filter(outbox_messages::id.eq(id))
            .set((
                outbox_messages::status.eq(OutboxStatus::Sent),
                outbox_messages::attempts.eq(outbox_messages::attempts + 1),
                outbox_messages::last_error.eq(None::<String>),
                outbox_messages::next_retry_at.eq(None::<OffsetDateTime>),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Backoff in minutes: `min(5 * 3^attempts, 1440)`, per §4.3 / §5.
    pub fn mark_failed(
        conn: &mut PgConnection,
        id: i32,
        attempts_before: i32,
        error: &str,
        now: OffsetDateTime,
    ) -> QueryResult<()> {
        let backoff_minutes = backoff_minutes(attempts_before);
        let next_retry_at = now + time::Duration::minutes(backoff_minutes);
        diesel::update(outbox_messages::table)
            .filter(outbox_messages::id.eq(id))
            .set((
                outbox_messages::status.eq(OutboxStatus::Failed),
                outbox_messages::attempts.eq(outbox_messages::attempts + 1),
                outbox_messages::last_error.eq(error),
                outbox_messages::next_retry_at.eq(next_retry_at),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn due_for_retry(
        conn: &mut PgConnection,
        now: OffsetDateTime,
        limit: i64,
    ) -> QueryResult<Vec<OutboxMessage>> {
        outbox_messages::table
            .filter(
                outbox_messages::status
                    .eq(OutboxStatus::Pending)
                    .or(outbox_messages::status.eq(OutboxStatus::Failed)),
            )
            .filter(
                outbox_messages::next_retry_at
                    .is_null()
                    .or(outbox_messages::next_retry_at.le(now)),
            )
            .order(outbox_messages::created_at.asc())
            .limit(limit)
            .load(conn)
    }
}

pub fn backoff_minutes(attempts: i32) -> i64 {
    let raw = 5i64.saturating_mul(3i64.saturating_pow(attempts.max(0) as u32));
    raw.min(1440)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_by_factor_of_three() {
        assert_eq!(backoff_minutes(0), 5);
        assert_eq!(backoff_minutes(1), 15);
        assert_eq!(backoff_minutes(2), 45);
    }

    #[test]
    fn backoff_caps_at_24_hours() {
        assert_eq!(backoff_minutes(10), 1440);
        assert_eq!(backoff_minutes(100), 1440);
    }
}
